//! Sound sources the output callback pulls from.

use std::f64::consts::TAU;

use singsong_dsp::PlaybackChain;
use singsong_transport::{AudioBuffer, Track, resample_audio};

/// Something the output mixes in until it runs dry.
pub trait Voice: Send {
    /// Add the next `out.len() / channels` frames into `out`.
    ///
    /// Returns `false` once the voice has nothing left; it is then dropped.
    fn render(&mut self, out: &mut [f32], channels: usize) -> bool;
}

#[inline]
fn mix_stereo(frame: &mut [f32], left: f32, right: f32) {
    match frame {
        [] => {}
        [mono] => *mono += (left + right) * 0.5,
        [l, r, ..] => {
            *l += left;
            *r += right;
        }
    }
}

/// One track played through its monitoring chain.
pub struct ChainVoice {
    chain: PlaybackChain,
    audio: AudioBuffer,
    position: usize,
}

impl ChainVoice {
    pub fn new(chain: PlaybackChain, audio: AudioBuffer) -> Self {
        Self {
            chain,
            audio,
            position: 0,
        }
    }

    /// Build a fresh chain for `track`, converting its processed audio to
    /// `sample_rate` first when needed.
    pub fn for_track(track: &Track, sample_rate: u32) -> anyhow::Result<Self> {
        let audio = resample_audio(&track.processed_audio.pcm, sample_rate)?;
        let chain = PlaybackChain::for_track(track, audio.channels, sample_rate);
        Ok(Self::new(chain, audio))
    }

    pub fn remaining_frames(&self) -> usize {
        self.audio.frames().saturating_sub(self.position)
    }
}

impl Voice for ChainVoice {
    fn render(&mut self, out: &mut [f32], channels: usize) -> bool {
        for frame in out.chunks_mut(channels.max(1)) {
            if self.position >= self.audio.frames() {
                return false;
            }
            let [left, right] = self.chain.process_frame(self.audio.frame(self.position));
            mix_stereo(frame, left, right);
            self.position += 1;
        }
        self.position < self.audio.frames()
    }
}

/// A short sine burst at constant gain, used for metronome clicks.
#[derive(Debug, Clone)]
pub struct ToneBurst {
    phase: f64,
    step: f64,
    gain: f32,
    remaining: usize,
}

impl ToneBurst {
    pub fn new(frequency: f64, duration_secs: f64, gain: f32, sample_rate: u32) -> Self {
        let sr = sample_rate.max(1) as f64;
        Self {
            phase: 0.0,
            step: TAU * frequency / sr,
            gain,
            remaining: (duration_secs.max(0.0) * sr).round() as usize,
        }
    }

    pub fn remaining_frames(&self) -> usize {
        self.remaining
    }
}

impl Voice for ToneBurst {
    fn render(&mut self, out: &mut [f32], channels: usize) -> bool {
        for frame in out.chunks_mut(channels.max(1)) {
            if self.remaining == 0 {
                return false;
            }
            let value = (self.phase.sin() as f32) * self.gain;
            for sample in frame.iter_mut() {
                *sample += value;
            }
            self.phase = (self.phase + self.step) % TAU;
            self.remaining -= 1;
        }
        self.remaining > 0
    }
}
