//! Offline mixdown of a song's audible tracks into one stereo buffer.

use rayon::prelude::*;
use singsong_dsp::PlaybackChain;
use singsong_transport::{
    AudioBuffer, Song, Track, TrackId, active_track_ids, resample_audio, resampled_frames,
};

#[derive(Debug, thiserror::Error)]
pub enum MixdownError {
    #[error("cannot mix down a song with no tracks")]
    EmptyMix,

    #[error("failed to decode track '{name}': {source}")]
    Decode {
        track: TrackId,
        name: String,
        source: anyhow::Error,
    },

    #[error("failed to resample track '{name}': {source}")]
    Resample {
        track: TrackId,
        name: String,
        source: anyhow::Error,
    },
}

/// Mix down every audible track of `song`.
pub fn render_mixdown(song: &Song) -> Result<AudioBuffer, MixdownError> {
    render_tracks(song.tracks())
}

/// Mix down `tracks` into a stereo buffer.
///
/// - Every track's processed asset is decoded, audible or not.
/// - Output rate is the first non-empty track's rate; other rates are converted.
/// - Output length is the longest track, counting silent ones; shorter tracks
///   are zero padded and everything starts at frame 0.
/// - Audible tracks go through `gain → pan` only.
///
/// The result is identical across runs for identical input.
pub fn render_tracks(tracks: &[Track]) -> Result<AudioBuffer, MixdownError> {
    if tracks.is_empty() {
        return Err(MixdownError::EmptyMix);
    }

    // Collecting an indexed parallel iterator keeps track order
    let decoded: Vec<AudioBuffer> = tracks
        .par_iter()
        .map(decode_processed)
        .collect::<Result<_, _>>()?;

    let active = active_track_ids(tracks);
    let sample_rate = decoded
        .iter()
        .find(|audio| !audio.is_empty())
        .unwrap_or(&decoded[0])
        .sample_rate;
    let total_frames = decoded
        .iter()
        .map(|audio| resampled_frames(audio.frames(), audio.sample_rate, sample_rate))
        .max()
        .unwrap_or(0);

    let mut samples = vec![0.0f32; total_frames * 2];

    for (track, audio) in tracks.iter().zip(decoded) {
        if !active.contains(&track.id) || audio.is_empty() {
            continue;
        }

        let audio = if audio.sample_rate != sample_rate {
            resample_audio(&audio, sample_rate).map_err(|source| MixdownError::Resample {
                track: track.id,
                name: track.name.clone(),
                source,
            })?
        } else {
            audio
        };

        let mut chain = PlaybackChain::for_mixdown(track, audio.channels);
        let frames = audio.frames().min(total_frames);
        for index in 0..frames {
            let [left, right] = chain.process_frame(audio.frame(index));
            samples[index * 2] += left;
            samples[index * 2 + 1] += right;
        }
    }

    log::info!(
        "mixed {} of {} tracks into {} frames at {} Hz",
        active.len(),
        tracks.len(),
        total_frames,
        sample_rate
    );

    Ok(AudioBuffer::new(samples, sample_rate, 2))
}

fn decode_processed(track: &Track) -> Result<AudioBuffer, MixdownError> {
    let asset = &track.processed_audio;
    if asset.encoded.is_empty() {
        return Ok(asset.pcm.clone());
    }

    match singsong_decode::decode_bytes(&asset.encoded, Some("wav")) {
        Ok(audio) => Ok(audio),
        Err(err) if asset.pcm.is_empty() => {
            log::warn!(
                "track '{}' has an undecodable zero-length asset, mixing as silence: {err}",
                track.name
            );
            Ok(AudioBuffer::new(Vec::new(), asset.pcm.sample_rate, asset.pcm.channels))
        }
        Err(source) => Err(MixdownError::Decode {
            track: track.id,
            name: track.name.clone(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode_wav;
    use singsong_transport::{AssetRef, AudioAsset, Role};

    fn asset(pcm: AudioBuffer) -> AudioAsset {
        let encoded = encode_wav(&pcm);
        AudioAsset::new(AssetRef::generate(), pcm, encoded)
    }

    fn track(name: &str, pcm: AudioBuffer) -> Track {
        let mut track = Track::new(name, Role::Vocal, asset(pcm.clone()), asset(pcm));
        track.volume = 1.0;
        track
    }

    fn ramp(frames: usize, sample_rate: u32) -> AudioBuffer {
        let samples = (0..frames).map(|i| (i as f32 / frames as f32) - 0.5).collect();
        AudioBuffer::new(samples, sample_rate, 1)
    }

    #[test]
    fn test_empty_song_is_rejected() {
        assert!(matches!(render_tracks(&[]), Err(MixdownError::EmptyMix)));
        assert!(matches!(
            render_mixdown(&Song::new("Nothing yet")),
            Err(MixdownError::EmptyMix)
        ));
    }

    #[test]
    fn test_soloed_muted_track_is_the_only_one_heard() {
        let mut a = track("A", ramp(64, 44100));
        a.pan = 0.0;
        let mut b = track("B", ramp(32, 44100));
        b.volume = 0.5;
        b.pan = -1.0;
        b.solo = true;
        b.mute = true;

        let source = b.processed_audio.pcm.clone();
        let mix = render_tracks(&[a, b]).expect("mix");

        assert_eq!(mix.channels, 2);
        assert_eq!(mix.frames(), 64);
        for frame in 0..64 {
            let expected = if frame < 32 { source.samples[frame] * 0.5 } else { 0.0 };
            let left = mix.samples[frame * 2];
            let right = mix.samples[frame * 2 + 1];
            assert!((left - expected).abs() <= 1.0 / 32768.0, "frame {frame}");
            assert_eq!(right, 0.0, "frame {frame}");
        }
    }

    #[test]
    fn test_length_counts_inactive_tracks() {
        let short = track("short", ramp(10, 44100));
        let mut long = track("long", ramp(500, 44100));
        long.mute = true;

        let mix = render_tracks(&[short, long]).expect("mix");
        assert_eq!(mix.frames(), 500);
        assert!(mix.samples[20..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_mixdown_is_deterministic() {
        let mut a = track("a", ramp(300, 48000));
        a.pan = 0.3;
        let mut b = track("b", AudioBuffer::new(vec![0.25; 400], 48000, 2));
        b.volume = 1.3;
        b.pan = -0.6;

        let tracks = [a, b];
        let first = render_tracks(&tracks).expect("mix");
        let second = render_tracks(&tracks).expect("mix");
        assert_eq!(crate::encode_wav(&first), crate::encode_wav(&second));
        assert_eq!(first.samples, second.samples);
    }

    #[test]
    fn test_output_rate_follows_first_track() {
        let a = track("a", ramp(4410, 22050));
        let b = track("b", ramp(4410, 44100));

        let mix = render_tracks(&[a, b]).expect("mix");
        assert_eq!(mix.sample_rate, 22050);
        assert_eq!(mix.frames(), 4410);
    }

    #[test]
    fn test_silent_placeholder_does_not_pick_the_rate() {
        let offline = track("offline", AudioBuffer::new(Vec::new(), 8000, 1));
        let live = track("live", ramp(100, 48000));

        let mix = render_tracks(&[offline, live]).expect("mix");
        assert_eq!(mix.sample_rate, 48000);
        assert_eq!(mix.frames(), 100);
    }

    #[test]
    fn test_zero_length_track_mixes_as_silence() {
        let empty = track("empty", AudioBuffer::new(Vec::new(), 44100, 1));
        let tone = track("tone", AudioBuffer::new(vec![0.5; 16], 44100, 1));

        let mix = render_tracks(&[empty, tone]).expect("mix");
        assert_eq!(mix.frames(), 16);
        assert!(mix.samples.iter().any(|s| *s != 0.0));
    }

    #[test]
    fn test_corrupt_asset_fails_the_mixdown() {
        let mut broken = track("broken", ramp(16, 44100));
        broken.processed_audio.encoded = b"RIFF-but-not-really".to_vec();

        let err = render_tracks(&[broken]).unwrap_err();
        assert!(matches!(err, MixdownError::Decode { .. }));
        assert!(err.to_string().contains("broken"));
    }
}
