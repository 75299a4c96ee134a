//! Biquad filter with WebAudio `BiquadFilterNode` coefficients.

use std::f64::consts::{PI, SQRT_2};

/// Frequency a band sits at when nothing sets it (WebAudio default).
pub const DEFAULT_FREQUENCY: f64 = 350.0;
/// Q a band uses when nothing sets it (WebAudio default).
pub const DEFAULT_Q: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    LowShelf,
    Peaking,
    HighShelf,
}

/// A second-order IIR filter, Direct Form II Transposed.
///
/// Coefficients follow the Audio EQ Cookbook as used by WebAudio: shelves use a
/// slope of 1 and ignore `q`, peaking uses `q` for bandwidth.
#[derive(Debug, Clone)]
pub struct Biquad {
    filter_type: FilterType,
    frequency: f64,
    q: f64,
    gain_db: f64,

    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    z1: f64,
    z2: f64,
}

impl Biquad {
    pub fn new(filter_type: FilterType, frequency: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let mut filter = Self {
            filter_type,
            frequency,
            q,
            gain_db,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
        };
        filter.update_coefficients(sample_rate);
        filter
    }

    pub fn low_shelf(frequency: f64, gain_db: f64, sample_rate: f64) -> Self {
        Self::new(FilterType::LowShelf, frequency, DEFAULT_Q, gain_db, sample_rate)
    }

    pub fn peaking(frequency: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        Self::new(FilterType::Peaking, frequency, q, gain_db, sample_rate)
    }

    pub fn high_shelf(frequency: f64, gain_db: f64, sample_rate: f64) -> Self {
        Self::new(FilterType::HighShelf, frequency, DEFAULT_Q, gain_db, sample_rate)
    }

    fn update_coefficients(&mut self, sample_rate: f64) {
        let nyquist = sample_rate / 2.0;
        let frequency = self.frequency.clamp(0.0, nyquist);
        let w0 = 2.0 * PI * frequency / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let a = 10.0_f64.powf(self.gain_db / 40.0);

        let (b0, b1, b2, a0, a1, a2) = match self.filter_type {
            FilterType::LowShelf => {
                let alpha = sin_w0 / 2.0 * SQRT_2;
                let k = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 + k),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 - k),
                    (a + 1.0) + (a - 1.0) * cos_w0 + k,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                    (a + 1.0) + (a - 1.0) * cos_w0 - k,
                )
            }
            FilterType::HighShelf => {
                let alpha = sin_w0 / 2.0 * SQRT_2;
                let k = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 + k),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 - k),
                    (a + 1.0) - (a - 1.0) * cos_w0 + k,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                    (a + 1.0) - (a - 1.0) * cos_w0 - k,
                )
            }
            FilterType::Peaking => {
                let q = if self.q > 0.0 { self.q } else { DEFAULT_Q };
                let alpha = sin_w0 / (2.0 * q);
                (
                    1.0 + alpha * a,
                    -2.0 * cos_w0,
                    1.0 - alpha * a,
                    1.0 + alpha / a,
                    -2.0 * cos_w0,
                    1.0 - alpha / a,
                )
            }
        };

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }
}

/// The same filter run independently on each channel of interleaved audio.
#[derive(Debug, Clone)]
pub struct ChannelFilter {
    filters: Vec<Biquad>,
}

impl ChannelFilter {
    pub fn new(prototype: Biquad, channels: usize) -> Self {
        Self {
            filters: vec![prototype; channels.max(1)],
        }
    }

    /// Filter one interleaved frame in place.
    #[inline]
    pub fn process_frame(&mut self, frame: &mut [f64]) {
        for (sample, filter) in frame.iter_mut().zip(self.filters.iter_mut()) {
            *sample = filter.process(*sample);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 44100.0;

    /// Magnitude response in dB at `frequency`.
    fn response_db(filter: &Biquad, frequency: f64) -> f64 {
        let w = 2.0 * PI * frequency / SR;
        let (cos1, sin1) = (w.cos(), w.sin());
        let (cos2, sin2) = ((2.0 * w).cos(), (2.0 * w).sin());

        let num_re = filter.b0 + filter.b1 * cos1 + filter.b2 * cos2;
        let num_im = -(filter.b1 * sin1 + filter.b2 * sin2);
        let den_re = 1.0 + filter.a1 * cos1 + filter.a2 * cos2;
        let den_im = -(filter.a1 * sin1 + filter.a2 * sin2);

        let magnitude = ((num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im)).sqrt();
        20.0 * magnitude.log10()
    }

    fn settle(filter: &mut Biquad, input: f64) -> f64 {
        let mut output = 0.0;
        for _ in 0..4000 {
            output = filter.process(input);
        }
        output
    }

    fn sine_amplitude(filter: &mut Biquad, frequency: f64) -> f64 {
        let mut max_out = 0.0_f64;
        for i in 0..8820 {
            let t = i as f64 / SR;
            let out = filter.process((2.0 * PI * frequency * t).sin());
            if i > 4410 {
                max_out = max_out.max(out.abs());
            }
        }
        max_out
    }

    #[test]
    fn test_zero_gain_bands_are_transparent() {
        for filter_type in [FilterType::LowShelf, FilterType::Peaking, FilterType::HighShelf] {
            let mut filter = Biquad::new(filter_type, DEFAULT_FREQUENCY, DEFAULT_Q, 0.0, SR);
            for i in 0..64 {
                let input = ((i * 7) % 13) as f64 / 13.0 - 0.5;
                assert!((filter.process(input) - input).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_low_shelf_boosts_dc() {
        let mut filter = Biquad::low_shelf(200.0, 12.0, SR);
        let expected = 10.0_f64.powf(12.0 / 20.0);
        assert!((settle(&mut filter, 1.0) - expected).abs() < 1e-3);
    }

    #[test]
    fn test_high_shelf_leaves_dc_alone() {
        let mut filter = Biquad::high_shelf(3500.0, -8.0, SR);
        assert!((settle(&mut filter, 1.0) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_high_shelf_cuts_high_frequencies() {
        let mut filter = Biquad::high_shelf(350.0, -8.0, SR);
        let amplitude = sine_amplitude(&mut filter, 8000.0);
        let expected = 10.0_f64.powf(-8.0 / 20.0);
        assert!((amplitude - expected).abs() < 0.02, "got {amplitude}");
    }

    #[test]
    fn test_peaking_hits_its_gain_at_center() {
        let filter = Biquad::peaking(1000.0, 1.0, 6.0, SR);
        assert!((response_db(&filter, 1000.0) - 6.0).abs() < 1e-6);
        assert!(response_db(&filter, 50.0).abs() < 0.5);
    }

    #[test]
    fn test_channel_filter_keeps_channels_independent() {
        let mut filter = ChannelFilter::new(Biquad::low_shelf(200.0, 6.0, SR), 2);
        let mut frame = [1.0, 0.0];
        for _ in 0..2000 {
            frame = [1.0, 0.0];
            filter.process_frame(&mut frame);
        }
        assert!(frame[0] > 1.5);
        assert_eq!(frame[1], 0.0);
    }
}
