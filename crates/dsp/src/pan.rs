//! Equal-power stereo panner with the WebAudio `StereoPannerNode` law.

use std::f64::consts::FRAC_PI_2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoPanner {
    pan: f64,
}

impl StereoPanner {
    /// The panner works on `[-1, 1]`; positions outside are pinned to the
    /// nearest end, the same as the browser's pan parameter.
    pub fn new(pan: f64) -> Self {
        Self {
            pan: pan.clamp(-1.0, 1.0),
        }
    }

    pub fn pan(&self) -> f64 {
        self.pan
    }

    /// Pan one input frame (mono, or stereo using the first two channels) into
    /// a stereo frame.
    #[inline]
    pub fn process(&self, input: &[f64]) -> [f64; 2] {
        match input {
            [] => [0.0, 0.0],
            [mono] => {
                let x = (self.pan + 1.0) / 2.0;
                let (gain_l, gain_r) = ((x * FRAC_PI_2).cos(), (x * FRAC_PI_2).sin());
                [mono * gain_l, mono * gain_r]
            }
            [left, right, ..] => {
                if self.pan <= 0.0 {
                    let x = self.pan + 1.0;
                    let (gain_l, gain_r) = ((x * FRAC_PI_2).cos(), (x * FRAC_PI_2).sin());
                    [left + right * gain_l, right * gain_r]
                } else {
                    let x = self.pan;
                    let (gain_l, gain_r) = ((x * FRAC_PI_2).cos(), (x * FRAC_PI_2).sin());
                    [left * gain_l, right + left * gain_r]
                }
            }
        }
    }
}
