//! Real-time audio plumbing: the shared output endpoint, live capture devices,
//! level metering and the metronome.

mod capture;
mod meter;
mod metronome;
mod output;
mod stream;
mod voice;

pub use capture::{CaptureDevice, CaptureError, CaptureStream, CpalCapture, MemoryCapture};
pub use meter::{LevelMeter, METER_BUCKETS, MeterReading};
pub use metronome::{ClickSettings, Metronome, MetronomeState};
pub use output::{CpalOutput, MAX_VOICES, OfflineOutput, OutputEndpoint};
pub use voice::{ChainVoice, ToneBurst, Voice};
