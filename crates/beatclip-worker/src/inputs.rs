//! Upstream analysis inputs: tempo windows, word timestamps, keyword segments.
//!
//! Estimation and transcription run elsewhere; the run consumes their
//! finished output through these traits. The JSON readers accept the files
//! those tools write.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::info;

use beatclip_models::{KeywordSegment, TempoWindow, WordTimestamp};

use crate::error::{WorkerError, WorkerResult};

/// Produces tempo windows for an audio track.
#[async_trait]
pub trait TempoEstimator: Send + Sync {
    async fn estimate(&self, audio: &Path) -> WorkerResult<Vec<TempoWindow>>;
}

/// Produces word-level timestamps for an audio track.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> WorkerResult<Vec<WordTimestamp>>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TempoFile {
    Wrapped { windows: Vec<TempoWindow> },
    Bare(Vec<TempoWindow>),
}

#[derive(Deserialize)]
struct LyricsFile {
    words: Vec<WordTimestamp>,
}

#[derive(Deserialize)]
struct SegmentsFile {
    segments: Vec<KeywordSegment>,
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> WorkerResult<T> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| WorkerError::input_failed(format!("read {}: {}", path.display(), e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| WorkerError::input_failed(format!("parse {}: {}", path.display(), e)))
}

/// Tempo windows from `{"windows": [...]}` or a bare array.
pub async fn load_tempo_windows(path: &Path) -> WorkerResult<Vec<TempoWindow>> {
    let windows = match read_json::<TempoFile>(path).await? {
        TempoFile::Wrapped { windows } | TempoFile::Bare(windows) => windows,
    };
    info!(path = %path.display(), windows = windows.len(), "Loaded tempo windows");
    Ok(windows)
}

/// Word timestamps from `{"words": [{"word", "start", "end"}]}`.
pub async fn load_words(path: &Path) -> WorkerResult<Vec<WordTimestamp>> {
    let file: LyricsFile = read_json(path).await?;
    info!(path = %path.display(), words = file.words.len(), "Loaded word timestamps");
    Ok(file.words)
}

/// Keyword segments from `{"segments": [{"id", "start", "end", "gif_query"}]}`.
pub async fn load_segments(path: &Path) -> WorkerResult<Vec<KeywordSegment>> {
    let file: SegmentsFile = read_json(path).await?;
    info!(path = %path.display(), segments = file.segments.len(), "Loaded keyword segments");
    Ok(file.segments)
}

/// Reads tempo windows from a JSON sidecar written by the estimator.
#[derive(Debug, Clone, Default)]
pub struct JsonTempoEstimator {
    /// Explicit sidecar; defaults to `<audio>.tempo.json`
    path: Option<PathBuf>,
}

impl JsonTempoEstimator {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

#[async_trait]
impl TempoEstimator for JsonTempoEstimator {
    async fn estimate(&self, audio: &Path) -> WorkerResult<Vec<TempoWindow>> {
        let path = self
            .path
            .clone()
            .unwrap_or_else(|| audio.with_extension("tempo.json"));
        load_tempo_windows(&path).await
    }
}

/// Reads a transcript from a lyrics JSON file.
#[derive(Debug, Clone)]
pub struct JsonTranscriber {
    path: PathBuf,
}

impl JsonTranscriber {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Transcriber for JsonTranscriber {
    async fn transcribe(&self, _audio: &Path) -> WorkerResult<Vec<WordTimestamp>> {
        load_words(&self.path).await
    }
}
