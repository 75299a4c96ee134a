//! Per-track processing chains.
//!
//! Monitoring playback runs the full chain:
//!
//! ```text
//! source → low shelf (200 Hz) → peaking (1 kHz, Q 1) → high shelf (3.5 kHz)
//!        → [compressor, only when enabled] → gain → pan → output
//! ```
//!
//! Mixdown only runs `gain → pan`; EQ and compression were baked in when the
//! track was captured. A chain is built per play and thrown away afterwards.

use singsong_transport::Track;

use crate::{Biquad, ChannelFilter, Compressor, StereoPanner};

pub const EQ_BASS_HZ: f64 = 200.0;
pub const EQ_MIDS_HZ: f64 = 1000.0;
pub const EQ_MIDS_Q: f64 = 1.0;
pub const EQ_TREBLE_HZ: f64 = 3500.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    LowShelf,
    Peaking,
    HighShelf,
    Compressor,
    Gain,
    Pan,
}

#[derive(Debug, Clone)]
enum Stage {
    Filter(StageKind, ChannelFilter),
    Compressor(Compressor),
    Gain(f64),
}

#[derive(Debug, Clone)]
pub struct PlaybackChain {
    stages: Vec<Stage>,
    panner: StereoPanner,
    scratch: Vec<f64>,
}

impl PlaybackChain {
    fn with_stages(stages: Vec<Stage>, pan: f32, channels: u16) -> Self {
        let channels = channels.max(1) as usize;
        Self {
            stages,
            panner: StereoPanner::new(pan as f64),
            scratch: vec![0.0; channels],
        }
    }

    /// Full monitoring chain for `track`, for input with `channels` channels.
    pub fn for_track(track: &Track, channels: u16, sample_rate: u32) -> Self {
        let sr = sample_rate as f64;
        let width = channels.max(1) as usize;

        let mut stages = vec![
            Stage::Filter(
                StageKind::LowShelf,
                ChannelFilter::new(Biquad::low_shelf(EQ_BASS_HZ, track.eq.bass as f64, sr), width),
            ),
            Stage::Filter(
                StageKind::Peaking,
                ChannelFilter::new(
                    Biquad::peaking(EQ_MIDS_HZ, EQ_MIDS_Q, track.eq.mids as f64, sr),
                    width,
                ),
            ),
            Stage::Filter(
                StageKind::HighShelf,
                ChannelFilter::new(
                    Biquad::high_shelf(EQ_TREBLE_HZ, track.eq.treble as f64, sr),
                    width,
                ),
            ),
        ];
        if track.compressor_on {
            stages.push(Stage::Compressor(Compressor::new(sr)));
        }
        stages.push(Stage::Gain(track.volume as f64));

        Self::with_stages(stages, track.pan, channels)
    }

    /// Mixdown chain for `track`: gain then pan.
    pub fn for_mixdown(track: &Track, channels: u16) -> Self {
        Self::with_stages(vec![Stage::Gain(track.volume as f64)], track.pan, channels)
    }

    /// Stage order from source to output.
    pub fn topology(&self) -> Vec<StageKind> {
        let mut kinds: Vec<StageKind> = self
            .stages
            .iter()
            .map(|stage| match stage {
                Stage::Filter(kind, _) => *kind,
                Stage::Compressor(_) => StageKind::Compressor,
                Stage::Gain(_) => StageKind::Gain,
            })
            .collect();
        kinds.push(StageKind::Pan);
        kinds
    }

    /// Run one interleaved input frame through the chain into a stereo frame.
    #[inline]
    pub fn process_frame(&mut self, input: &[f32]) -> [f32; 2] {
        for (slot, sample) in self.scratch.iter_mut().zip(input.iter()) {
            *slot = *sample as f64;
        }

        for stage in &mut self.stages {
            match stage {
                Stage::Filter(_, filter) => filter.process_frame(&mut self.scratch),
                Stage::Compressor(compressor) => compressor.process_frame(&mut self.scratch),
                Stage::Gain(gain) => {
                    for sample in self.scratch.iter_mut() {
                        *sample *= *gain;
                    }
                }
            }
        }

        let [left, right] = self.panner.process(&self.scratch);
        [left as f32, right as f32]
    }
}
