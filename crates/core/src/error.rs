use singsong_engine::CaptureError;
use singsong_project::ProjectError;
use singsong_render::MixdownError;
use singsong_transport::{SongId, TrackId};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("capture device unavailable: {0}")]
    DeviceAcquisition(#[from] CaptureError),

    #[error("failed to decode audio: {0}")]
    Decode(#[source] anyhow::Error),

    #[error("song has no tracks to mix")]
    EmptyMix,

    #[error("mixdown failed: {0}")]
    Render(#[source] MixdownError),

    #[error("no song with id {0}")]
    SongNotFound(SongId),

    #[error("no track with id {0}")]
    TrackNotFound(TrackId),

    #[error("failed to encode audio: {0}")]
    Encode(#[source] anyhow::Error),

    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error("audio output failed: {0}")]
    Output(#[source] anyhow::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<MixdownError> for EngineError {
    fn from(err: MixdownError) -> Self {
        match err {
            MixdownError::EmptyMix => EngineError::EmptyMix,
            other => EngineError::Render(other),
        }
    }
}
