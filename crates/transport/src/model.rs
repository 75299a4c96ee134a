use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AudioBuffer;

/// Volume a freshly captured track starts at.
pub const DEFAULT_TRACK_VOLUME: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SongId(pub Uuid);

impl SongId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SongId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SongId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub Uuid);

impl TrackId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TrackId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Source instrument of a track. Selects the tone-shaping profile applied at capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Vocal,
    Guitar,
    Bass,
    Drums,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Vocal, Role::Guitar, Role::Bass, Role::Drums];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Vocal => "vocal",
            Role::Guitar => "guitar",
            Role::Bass => "bass",
            Role::Drums => "drums",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRoleError(pub String);

impl fmt::Display for ParseRoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown role '{}' (expected vocal, guitar, bass or drums)",
            self.0
        )
    }
}

impl std::error::Error for ParseRoleError {}

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == lower)
            .ok_or_else(|| ParseRoleError(s.to_string()))
    }
}

/// Three-band monitoring EQ, gains in dB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EqSettings {
    pub bass: f32,
    pub mids: f32,
    pub treble: f32,
}

impl EqSettings {
    pub fn new(bass: f32, mids: f32, treble: f32) -> Self {
        Self { bass, mids, treble }
    }

    pub fn is_flat(&self) -> bool {
        self.bass == 0.0 && self.mids == 0.0 && self.treble == 0.0
    }
}

/// Where an asset's encoded bytes live, relative to the project file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetRef(pub String);

impl AssetRef {
    /// Fresh reference under the project's asset directory.
    pub fn generate() -> Self {
        Self(format!("assets/{}.wav", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the reference is a relative path that stays below the project
    /// directory: no root, no drive prefix, no `..`.
    pub fn is_contained(&self) -> bool {
        !self.0.is_empty()
            && Path::new(&self.0)
                .components()
                .all(|part| matches!(part, Component::Normal(_) | Component::CurDir))
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decoded audio plus the encoded bytes it was produced from (or encoded to).
#[derive(Debug, Clone)]
pub struct AudioAsset {
    pub reference: AssetRef,
    pub pcm: AudioBuffer,
    pub encoded: Vec<u8>,
}

impl AudioAsset {
    pub fn new(reference: AssetRef, pcm: AudioBuffer, encoded: Vec<u8>) -> Self {
        Self {
            reference,
            pcm,
            encoded,
        }
    }
}

/// One recorded part and its mix parameters.
///
/// Mix values are not range-checked. The UI offers volume in `[0.0, 1.5]`,
/// pan in `[-1.0, 1.0]` and EQ in `[-20, 20]` dB, but anything else is stored
/// and handed to the processing chain as-is.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    pub role: Role,
    pub volume: f32,
    pub pan: f32,
    pub mute: bool,
    pub solo: bool,
    pub eq: EqSettings,
    pub compressor_on: bool,
    /// Tone-shaped capture; what playback and mixdown use.
    pub processed_audio: AudioAsset,
    /// Untouched capture, kept for re-processing.
    pub raw_audio: AudioAsset,
}

impl Track {
    pub fn new(
        name: impl Into<String>,
        role: Role,
        processed_audio: AudioAsset,
        raw_audio: AudioAsset,
    ) -> Self {
        Self {
            id: TrackId::new(),
            name: name.into(),
            role,
            volume: DEFAULT_TRACK_VOLUME,
            pan: 0.0,
            mute: false,
            solo: false,
            eq: EqSettings::default(),
            compressor_on: false,
            processed_audio,
            raw_audio,
        }
    }
}

/// A song: the ordered tracks plus collaborators.
///
/// Every mutation goes through a method here so `updated_at` always moves.
#[derive(Debug, Clone)]
pub struct Song {
    id: SongId,
    title: String,
    tracks: Vec<Track>,
    invited: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Song {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: SongId::new(),
            title: title.into(),
            tracks: Vec::new(),
            invited: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a song from stored parts without touching its timestamps.
    pub fn restore(
        id: SongId,
        title: String,
        tracks: Vec<Track>,
        invited: Vec<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title,
            tracks,
            invited,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> SongId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|track| track.id == id)
    }

    pub fn invited(&self) -> &[String] {
        &self.invited
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now().max(self.updated_at);
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.touch();
    }

    pub fn invite(&mut self, handle: impl Into<String>) {
        self.invited.push(handle.into());
        self.touch();
    }

    /// Append a finished track. Fails if the id is already taken.
    pub fn push_track(&mut self, track: Track) -> Result<(), Track> {
        if self.track(track.id).is_some() {
            return Err(track);
        }
        self.tracks.push(track);
        self.touch();
        Ok(())
    }

    /// Apply `edit` to one track and refresh `updated_at`. Edits never touch
    /// a track's id or assets.
    ///
    /// Returns `None` (and leaves the song untouched) if no track has `id`.
    fn update_track<R>(&mut self, id: TrackId, edit: impl FnOnce(&mut Track) -> R) -> Option<R> {
        let track = self.tracks.iter_mut().find(|track| track.id == id)?;
        let result = edit(track);
        self.touch();
        Some(result)
    }

    pub fn set_volume(&mut self, id: TrackId, volume: f32) -> Option<()> {
        self.update_track(id, |track| track.volume = volume)
    }

    pub fn set_pan(&mut self, id: TrackId, pan: f32) -> Option<()> {
        self.update_track(id, |track| track.pan = pan)
    }

    pub fn set_eq(&mut self, id: TrackId, eq: EqSettings) -> Option<()> {
        self.update_track(id, |track| track.eq = eq)
    }

    pub fn set_compressor(&mut self, id: TrackId, on: bool) -> Option<()> {
        self.update_track(id, |track| track.compressor_on = on)
    }

    /// Flip mute, returning the new state.
    pub fn toggle_mute(&mut self, id: TrackId) -> Option<bool> {
        self.update_track(id, |track| {
            track.mute = !track.mute;
            track.mute
        })
    }

    /// Flip solo, returning the new state.
    pub fn toggle_solo(&mut self, id: TrackId) -> Option<bool> {
        self.update_track(id, |track| {
            track.solo = !track.solo;
            track.solo
        })
    }
}
