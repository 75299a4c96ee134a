//! The engine context the presentation layer talks to.
//!
//! A [`Session`] owns the songs, the output endpoint, the capture device and
//! the metronome. Long-running work (finalizing a take, mixdown, project IO)
//! runs on tokio's blocking pool and is awaited by the caller.

mod capture;
mod config;
mod error;
mod export;
mod session;

pub use capture::CaptureSession;
pub use config::EngineConfig;
pub use error::EngineError;
pub use export::{Export, ExportKind, UnknownExportKind, export_file_name};
pub use session::{LoadedSong, Session, SongSummary};

pub use singsong_engine::{MeterReading, MetronomeState};
pub use singsong_project::{OfflineTrack, ProjectMetadata, load_project_metadata};
pub use singsong_transport::{
    AudioBuffer, EqSettings, Role, Song, SongId, Track, TrackId, WaveformData,
};
