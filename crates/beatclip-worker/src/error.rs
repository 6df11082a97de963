//! Worker error types.

use thiserror::Error;

use beatclip_media::{MediaError, RenderError};

use crate::checkpoint::CheckpointError;
use crate::planner::PlanError;
use crate::source_pool::PoolError;
use crate::timeline::TimelineError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Input error: {0}")]
    InputFailed(String),

    #[error("Render capability unavailable: {0}")]
    Unavailable(String),

    #[error("Assembly failed: {0}")]
    AssemblyFailed(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Timeline error: {0}")]
    Timeline(#[from] TimelineError),

    #[error("Source pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn input_failed(msg: impl Into<String>) -> Self {
        Self::InputFailed(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn assembly_failed(msg: impl Into<String>) -> Self {
        Self::AssemblyFailed(msg.into())
    }

    /// Check if the error was raised before any rendering started and
    /// points at bad inputs or settings.
    pub fn is_configuration(&self) -> bool {
        match self {
            WorkerError::ConfigError(_)
            | WorkerError::Plan(_)
            | WorkerError::Timeline(_)
            | WorkerError::Pool(_) => true,
            WorkerError::Checkpoint(e) => e.is_mismatch(),
            _ => false,
        }
    }

    /// Check if the run stopped because of an external stop signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerError::Cancelled)
    }
}

impl From<RenderError> for WorkerError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Cancelled => WorkerError::Cancelled,
            other => WorkerError::Unavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        assert!(WorkerError::config_error("both inputs").is_configuration());
        assert!(WorkerError::from(TimelineError::EmptyTimeline).is_configuration());
        assert!(WorkerError::from(PoolError::PoolExhausted).is_configuration());
        assert!(!WorkerError::unavailable("ffmpeg").is_configuration());
    }

    #[test]
    fn test_render_error_conversion() {
        assert!(WorkerError::from(RenderError::Cancelled).is_cancelled());
        let err = WorkerError::from(RenderError::Unavailable("ffmpeg not found".into()));
        assert!(matches!(err, WorkerError::Unavailable(_)));
    }
}
