use std::collections::VecDeque;

use singsong_transport::WaveformData;

/// Buckets in the live waveform.
pub const METER_BUCKETS: usize = 64;

/// Snapshot of the most recent capture window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeterReading {
    /// Largest absolute sample in the window, `0.0..=1.0` for sane input.
    pub peak: f32,
    pub waveform: WaveformData,
}

/// Keeps the latest `window_frames` frames of a capture for level display.
#[derive(Debug, Clone)]
pub struct LevelMeter {
    window: VecDeque<f32>,
    capacity: usize,
    channels: u16,
    samples_per_bucket: usize,
}

impl LevelMeter {
    pub fn new(channels: u16, window_frames: usize) -> Self {
        let channels = channels.max(1);
        let window_frames = window_frames.max(1);
        let capacity = window_frames * channels as usize;
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            channels,
            samples_per_bucket: window_frames.div_ceil(METER_BUCKETS),
        }
    }

    /// Append interleaved samples, discarding the oldest beyond the window.
    pub fn push(&mut self, samples: &[f32]) {
        let fresh = &samples[samples.len().saturating_sub(self.capacity)..];
        let overflow = (self.window.len() + fresh.len()).saturating_sub(self.capacity);
        self.window.drain(..overflow);
        self.window.extend(fresh);
    }

    pub fn reading(&mut self) -> MeterReading {
        let samples = self.window.make_contiguous();
        MeterReading {
            peak: samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs())),
            waveform: WaveformData::from_interleaved(samples, self.channels, self.samples_per_bucket),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_keeps_latest_frames() {
        let mut meter = LevelMeter::new(2, 4);
        meter.push(&[0.9, 0.9, 0.1, 0.1]);
        meter.push(&[0.2, 0.2, 0.2, 0.2, 0.3, 0.3, 0.3, 0.3]);

        let reading = meter.reading();
        assert!((reading.peak - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_oversized_push() {
        let mut meter = LevelMeter::new(1, 3);
        meter.push(&[1.0, -0.5, 0.25, 0.5]);
        assert_eq!(meter.reading().peak, 0.5);
    }

    #[test]
    fn test_waveform_shape() {
        let mut meter = LevelMeter::new(1, 2048);
        let samples: Vec<f32> = (0..2048).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        meter.push(&samples);

        let reading = meter.reading();
        assert_eq!(reading.waveform.peaks.len(), METER_BUCKETS);
        assert!(reading.waveform.peaks.iter().all(|&(lo, hi)| lo == -0.5 && hi == 0.5));
    }

    #[test]
    fn test_empty_meter_is_silent() {
        let reading = LevelMeter::new(2, 16).reading();
        assert_eq!(reading.peak, 0.0);
        assert!(reading.waveform.peaks.is_empty());
    }
}
