//! Feed-forward dynamics compressor shaped after WebAudio's `DynamicsCompressorNode`.
//!
//! Detection is linked across channels: the loudest channel of a frame drives
//! one gain value that is applied to every channel, so the stereo image holds.
//!
//! Like the browser node, the output gets automatic makeup gain: the curve's
//! reduction at 0 dBFS, inverted and raised to the power 0.6.

use crate::db_to_gain;

pub const DEFAULT_THRESHOLD_DB: f64 = -24.0;
pub const DEFAULT_KNEE_DB: f64 = 30.0;
pub const DEFAULT_RATIO: f64 = 12.0;
pub const DEFAULT_ATTACK_SECS: f64 = 0.003;
pub const DEFAULT_RELEASE_SECS: f64 = 0.25;

/// Exponent applied to the full-range makeup gain.
const MAKEUP_EXPONENT: f64 = 0.6;

#[derive(Debug, Clone)]
pub struct Compressor {
    /// Threshold in dB.
    pub threshold: f64,
    /// Knee width in dB (0 = hard knee).
    pub knee: f64,
    /// Compression ratio, e.g. 6.0 for 6:1.
    pub ratio: f64,
    pub attack: f64,
    pub release: f64,

    attack_coef: f64,
    release_coef: f64,
    envelope: f64,
}

impl Compressor {
    /// WebAudio defaults: -24 dB threshold, 30 dB knee, 12:1.
    pub fn new(sample_rate: f64) -> Self {
        Self::with_params(sample_rate, DEFAULT_THRESHOLD_DB, DEFAULT_RATIO)
    }

    pub fn with_params(sample_rate: f64, threshold: f64, ratio: f64) -> Self {
        Self {
            threshold: threshold.clamp(-100.0, 0.0),
            knee: DEFAULT_KNEE_DB,
            ratio: ratio.clamp(1.0, 20.0),
            attack: DEFAULT_ATTACK_SECS,
            release: DEFAULT_RELEASE_SECS,
            attack_coef: (-1.0 / (DEFAULT_ATTACK_SECS * sample_rate)).exp(),
            release_coef: (-1.0 / (DEFAULT_RELEASE_SECS * sample_rate)).exp(),
            envelope: 0.0,
        }
    }

    #[inline]
    fn linear_to_db(linear: f64) -> f64 {
        if linear <= 0.0 {
            -120.0
        } else {
            20.0 * linear.log10()
        }
    }

    /// Gain change in dB (zero or negative) for an input level in dB.
    #[inline]
    pub fn compute_gain(&self, input_db: f64) -> f64 {
        let slope = 1.0 - 1.0 / self.ratio;

        if self.knee <= 0.0 {
            if input_db <= self.threshold {
                0.0
            } else {
                (self.threshold - input_db) * slope
            }
        } else {
            let half_knee = self.knee / 2.0;
            let knee_start = self.threshold - half_knee;
            let knee_end = self.threshold + half_knee;

            if input_db <= knee_start {
                0.0
            } else if input_db >= knee_end {
                (self.threshold - input_db) * slope
            } else {
                let x = input_db - knee_start;
                -slope * x * x / (2.0 * self.knee)
            }
        }
    }

    /// Makeup gain in dB added after the curve.
    #[inline]
    pub fn makeup_db(&self) -> f64 {
        -self.compute_gain(0.0) * MAKEUP_EXPONENT
    }

    /// Compress one interleaved frame in place.
    #[inline]
    pub fn process_frame(&mut self, frame: &mut [f64]) {
        let level = frame.iter().fold(0.0_f64, |peak, s| peak.max(s.abs()));

        let coef = if level > self.envelope {
            self.attack_coef
        } else {
            self.release_coef
        };
        self.envelope = coef * self.envelope + (1.0 - coef) * level;

        let reduction = self.compute_gain(Self::linear_to_db(self.envelope));
        let gain = db_to_gain(reduction + self.makeup_db());
        for sample in frame.iter_mut() {
            *sample *= gain;
        }
    }
}
