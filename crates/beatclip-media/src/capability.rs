//! Rendering and assembly capabilities consumed by the orchestrator.
//!
//! The worker only talks to these traits; the FFmpeg adapters in
//! [`crate::renderer`] and [`crate::concat`] are the production
//! implementations, and tests substitute in-memory fakes.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

use beatclip_models::CaptionMode;

use crate::error::{MediaError, MediaResult};

/// Caption to burn into a rendered second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlay {
    pub text: String,
    pub mode: CaptionMode,
}

/// Request to render one second of output from a source clip.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub second_index: usize,
    pub source: PathBuf,
    /// Sub-clip start offset in seconds
    pub offset: f64,
    /// Playback speed multiplier
    pub speed: f64,
    pub overlay: Option<Overlay>,
    /// Where the one-second artifact must be written
    pub output: PathBuf,
}

impl RenderRequest {
    /// Same request with the caption removed.
    pub fn without_overlay(&self) -> Self {
        Self {
            overlay: None,
            ..self.clone()
        }
    }
}

/// Failure classes of the render capability.
///
/// Each class maps to exactly one recovery action in the runner.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    /// The source clip could not be decoded; blacklist and reselect
    #[error("source unreadable: {0}")]
    SourceUnreadable(String),

    /// Only the caption failed; render again without it
    #[error("overlay failed: {0}")]
    OverlayFailed(String),

    /// The renderer itself is broken; stop the run
    #[error("render capability unavailable: {0}")]
    Unavailable(String),

    /// Stopped by the cancellation signal; nothing was written
    #[error("render cancelled")]
    Cancelled,
}

impl RenderError {
    /// Classify a media error raised while rendering.
    ///
    /// `with_overlay` tells whether a caption was part of the failed command;
    /// only then can a drawtext/font failure be blamed on the overlay.
    pub fn classify(err: MediaError, with_overlay: bool) -> Self {
        match err {
            ref e if e.is_tool_missing() => RenderError::Unavailable(e.to_string()),
            MediaError::Cancelled => RenderError::Cancelled,
            MediaError::Io(_) | MediaError::Internal(_) | MediaError::EmptyConcat => {
                RenderError::Unavailable(err.to_string())
            }
            ref e if with_overlay && e.stderr().is_some_and(mentions_overlay) => {
                RenderError::OverlayFailed(summarize(e))
            }
            e => RenderError::SourceUnreadable(summarize(&e)),
        }
    }

    pub fn is_source_failure(&self) -> bool {
        matches!(self, RenderError::SourceUnreadable(_))
    }
}

fn mentions_overlay(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    stderr.contains("drawtext") || stderr.contains("font")
}

/// Error message plus the last stderr line, if any.
fn summarize(err: &MediaError) -> String {
    match err.stderr().and_then(|s| s.lines().last()) {
        Some(line) => format!("{}: {}", err, line.trim()),
        None => err.to_string(),
    }
}

/// Renders one second of output.
#[async_trait]
pub trait SecondRenderer: Send + Sync {
    /// Duration of a source clip in seconds.
    async fn probe_duration(&self, source: &Path) -> Result<f64, RenderError>;

    /// Render `request` and return the artifact path.
    async fn render(&self, request: &RenderRequest) -> Result<PathBuf, RenderError>;

    /// Render the neutral fallback frame for a second.
    async fn render_fallback(&self, second_index: usize, output: &Path) -> Result<PathBuf, RenderError>;
}

/// Joins clips losslessly, in order.
#[async_trait]
pub trait Concatenator: Send + Sync {
    async fn join(&self, clips: &[PathBuf], output: &Path) -> MediaResult<()>;
}

/// Muxes an audio track onto a video, trimmed to `duration` seconds.
#[async_trait]
pub trait AudioAttacher: Send + Sync {
    async fn attach(&self, video: &Path, audio: &Path, duration: f64, output: &Path) -> MediaResult<()>;
}
