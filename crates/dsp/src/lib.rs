//! Filters, dynamics and panning shared by capture shaping, live playback and mixdown.

mod biquad;
mod chain;
mod compressor;
mod pan;

pub use biquad::{Biquad, ChannelFilter, DEFAULT_FREQUENCY, DEFAULT_Q, FilterType};
pub use chain::{EQ_BASS_HZ, EQ_MIDS_HZ, EQ_MIDS_Q, EQ_TREBLE_HZ, PlaybackChain, StageKind};
pub use compressor::Compressor;
pub use pan::StereoPanner;

/// Convert decibels to a linear amplitude factor.
#[inline]
pub fn db_to_gain(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}
