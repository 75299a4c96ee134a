//! Which tracks are audible under the solo/mute flags.

use std::collections::HashSet;

use crate::{Track, TrackId};

/// Tracks that should sound right now.
///
/// If any track is soloed, exactly the soloed tracks play, including soloed
/// tracks that are also muted. Otherwise every unmuted track plays. Nothing is
/// cached; callers run this each time they start playback or a mixdown.
pub fn active_tracks(tracks: &[Track]) -> Vec<&Track> {
    let soloed: Vec<&Track> = tracks.iter().filter(|track| track.solo).collect();
    if !soloed.is_empty() {
        return soloed;
    }
    tracks.iter().filter(|track| !track.mute).collect()
}

pub fn active_track_ids(tracks: &[Track]) -> HashSet<TrackId> {
    active_tracks(tracks).into_iter().map(|track| track.id).collect()
}
