mod mixdown;
mod tone;
mod wav;

pub use mixdown::{MixdownError, render_mixdown, render_tracks};
pub use tone::{Band, SHAPE_RATIO, SHAPE_THRESHOLD_DB, ToneProfile, shape};
pub use wav::{WAV_HEADER_LEN, encode_wav, encode_wav_float, encoded_len, sample_to_i16};
