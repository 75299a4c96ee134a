//! Role-based tone shaping, run once when a capture is finalized.

use singsong_dsp::{Biquad, ChannelFilter, Compressor, DEFAULT_FREQUENCY, DEFAULT_Q};
use singsong_transport::{AudioBuffer, Role};

/// Compressor settings applied to every role.
pub const SHAPE_THRESHOLD_DB: f64 = -24.0;
pub const SHAPE_RATIO: f64 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub frequency: f64,
    pub gain_db: f64,
}

impl Band {
    const fn new(frequency: f64, gain_db: f64) -> Self {
        Self { frequency, gain_db }
    }

    const fn flat() -> Self {
        Self::new(DEFAULT_FREQUENCY, 0.0)
    }
}

/// Fixed EQ for one role. Bands a role leaves unset stay at 350 Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneProfile {
    pub low_shelf: Band,
    pub peak: Band,
    pub high_shelf: Band,
}

impl ToneProfile {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Bass => Self {
                low_shelf: Band::new(180.0, 12.0),
                peak: Band::new(800.0, -4.0),
                high_shelf: Band::new(DEFAULT_FREQUENCY, -8.0),
            },
            Role::Drums => Self {
                low_shelf: Band::new(DEFAULT_FREQUENCY, 5.0),
                peak: Band::new(2200.0, 7.0),
                high_shelf: Band::new(DEFAULT_FREQUENCY, 4.0),
            },
            Role::Guitar => Self {
                low_shelf: Band::new(DEFAULT_FREQUENCY, 2.0),
                peak: Band::new(1500.0, 8.0),
                high_shelf: Band::new(DEFAULT_FREQUENCY, 3.0),
            },
            Role::Vocal => Self {
                low_shelf: Band::flat(),
                peak: Band::flat(),
                high_shelf: Band::flat(),
            },
        }
    }

    fn filters(&self, sample_rate: f64, channels: usize) -> [ChannelFilter; 3] {
        [
            ChannelFilter::new(
                Biquad::low_shelf(self.low_shelf.frequency, self.low_shelf.gain_db, sample_rate),
                channels,
            ),
            ChannelFilter::new(
                Biquad::peaking(self.peak.frequency, DEFAULT_Q, self.peak.gain_db, sample_rate),
                channels,
            ),
            ChannelFilter::new(
                Biquad::high_shelf(self.high_shelf.frequency, self.high_shelf.gain_db, sample_rate),
                channels,
            ),
        ]
    }
}

/// Shape a raw capture for its role: low shelf, peaking, high shelf, then a
/// -24 dB / 6:1 compressor with its automatic makeup gain.
///
/// Rendering is offline and sequential, so identical input and role always
/// produce bit-identical output. Length, rate and channel count are preserved.
pub fn shape(raw: &AudioBuffer, role: Role) -> AudioBuffer {
    let channels = raw.channels as usize;
    let sample_rate = raw.sample_rate as f64;
    let mut filters = ToneProfile::for_role(role).filters(sample_rate, channels);
    let mut compressor = Compressor::with_params(sample_rate, SHAPE_THRESHOLD_DB, SHAPE_RATIO);

    let mut frame = vec![0.0f64; channels];
    let mut samples = Vec::with_capacity(raw.samples.len());

    for index in 0..raw.frames() {
        for (slot, sample) in frame.iter_mut().zip(raw.frame(index)) {
            *slot = *sample as f64;
        }
        for filter in &mut filters {
            filter.process_frame(&mut frame);
        }
        compressor.process_frame(&mut frame);
        samples.extend(frame.iter().map(|s| *s as f32));
    }

    log::debug!(
        "shaped {} frames for {} (peak {:.3} -> {:.3})",
        raw.frames(),
        role,
        raw.peak(),
        samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
    );

    AudioBuffer::new(samples, raw.sample_rate, raw.channels)
}
