//! Run and worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use beatclip_models::CaptionMode;

use crate::error::{WorkerError, WorkerResult};

/// Inputs and knobs for a single render run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Audio track the output is synced to
    pub audio_path: PathBuf,
    /// Folder of `.mp4` bank clips
    pub clips_dir: PathBuf,
    /// Final assembled video
    pub output_path: PathBuf,
    /// Requested output duration in seconds
    pub duration_secs: f64,
    /// Selection seed; `None` adopts a checkpointed seed or draws one
    pub seed: Option<u64>,
    /// Tempo windows sidecar; defaults to `<audio>.tempo.json`
    pub tempo_path: Option<PathBuf>,
    /// Word timestamps for captions
    pub lyrics_path: Option<PathBuf>,
    /// Keyword segment plan
    pub segments_path: Option<PathBuf>,
    pub caption_mode: CaptionMode,
    /// Gap between words that closes a phrase
    pub phrase_gap_secs: f64,
    /// Karaoke line wrap width in characters
    pub karaoke_max_chars: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            audio_path: PathBuf::new(),
            clips_dir: PathBuf::from("clips"),
            output_path: PathBuf::from("output.mp4"),
            duration_secs: 30.0,
            seed: None,
            tempo_path: None,
            lyrics_path: None,
            segments_path: None,
            caption_mode: CaptionMode::Phrase,
            phrase_gap_secs: 0.5,
            karaoke_max_chars: 24,
        }
    }
}

impl RunConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            audio_path: std::env::var("BEATCLIP_AUDIO")
                .map(PathBuf::from)
                .unwrap_or(defaults.audio_path),
            clips_dir: std::env::var("BEATCLIP_CLIPS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.clips_dir),
            output_path: std::env::var("BEATCLIP_OUTPUT")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_path),
            duration_secs: std::env::var("BEATCLIP_DURATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.duration_secs),
            seed: std::env::var("BEATCLIP_SEED")
                .ok()
                .and_then(|s| s.parse().ok()),
            tempo_path: std::env::var("BEATCLIP_TEMPO").ok().map(PathBuf::from),
            lyrics_path: std::env::var("BEATCLIP_LYRICS").ok().map(PathBuf::from),
            segments_path: std::env::var("BEATCLIP_SEGMENTS").ok().map(PathBuf::from),
            caption_mode: std::env::var("BEATCLIP_CAPTION_MODE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.caption_mode),
            phrase_gap_secs: std::env::var("BEATCLIP_PHRASE_GAP_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.phrase_gap_secs),
            karaoke_max_chars: std::env::var("BEATCLIP_KARAOKE_MAX_CHARS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.karaoke_max_chars),
        }
    }

    /// Reject settings that can never produce a run.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.audio_path.as_os_str().is_empty() {
            return Err(WorkerError::config_error("audio path is not set"));
        }
        if self.output_path.file_stem().is_none() {
            return Err(WorkerError::config_error(format!(
                "output path {} has no file name",
                self.output_path.display()
            )));
        }
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(WorkerError::config_error(format!(
                "duration must be positive, got {}",
                self.duration_secs
            )));
        }
        if self.lyrics_path.is_some() && self.segments_path.is_some() {
            return Err(WorkerError::config_error(
                "word timestamps and a keyword segment plan are mutually exclusive",
            ));
        }
        if self.karaoke_max_chars == 0 {
            return Err(WorkerError::config_error("karaoke line width must be non-zero"));
        }
        Ok(())
    }

    /// Tempo sidecar to read for this run.
    pub fn tempo_source(&self) -> PathBuf {
        self.tempo_path
            .clone()
            .unwrap_or_else(|| self.audio_path.with_extension("tempo.json"))
    }
}

/// Execution settings shared by every run on this worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Seconds rendered concurrently
    pub max_parallel_renders: usize,
    /// Checkpoint records between fsyncs
    pub checkpoint_sync_interval: usize,
    /// Timeout for a single keyword fetch
    pub fetch_timeout: Duration,
    /// Source window read per second, used to bound the sub-clip offset
    pub clip_window_secs: f64,
    /// Playback speed bounds
    pub speed_min: f64,
    pub speed_max: f64,
    /// Keep the checkpoint directory after a successful assembly
    pub retain_checkpoint: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_parallel_renders: 2,
            checkpoint_sync_interval: 50,
            fetch_timeout: Duration::from_secs(10),
            clip_window_secs: 1.2,
            speed_min: 0.5,
            speed_max: 2.0,
            retain_checkpoint: false,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_parallel_renders: std::env::var("BEATCLIP_MAX_PARALLEL_RENDERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_parallel_renders),
            checkpoint_sync_interval: std::env::var("BEATCLIP_CHECKPOINT_INTERVAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.checkpoint_sync_interval),
            fetch_timeout: Duration::from_secs(
                std::env::var("BEATCLIP_FETCH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            clip_window_secs: std::env::var("BEATCLIP_WINDOW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.clip_window_secs),
            speed_min: std::env::var("BEATCLIP_SPEED_MIN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.speed_min),
            speed_max: std::env::var("BEATCLIP_SPEED_MAX")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.speed_max),
            retain_checkpoint: std::env::var("BEATCLIP_RETAIN_CHECKPOINT")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.retain_checkpoint),
        }
    }

    pub fn validate(&self) -> WorkerResult<()> {
        if !(self.speed_min > 0.0 && self.speed_min <= self.speed_max) {
            return Err(WorkerError::config_error(format!(
                "invalid speed bounds [{}, {}]",
                self.speed_min, self.speed_max
            )));
        }
        if self.max_parallel_renders == 0 {
            return Err(WorkerError::config_error("max_parallel_renders must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_config() -> RunConfig {
        RunConfig {
            audio_path: PathBuf::from("/music/track.mp3"),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_parallel_renders, 2);
        assert_eq!(config.checkpoint_sync_interval, 50);
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
        assert!(config.validate().is_ok());
        assert!(run_config().validate().is_ok());
    }

    #[test]
    fn test_both_overlay_inputs_rejected() {
        let config = RunConfig {
            lyrics_path: Some(PathBuf::from("lyrics.json")),
            segments_path: Some(PathBuf::from("segments.json")),
            ..run_config()
        };
        let err = config.validate().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_missing_audio_rejected() {
        assert!(RunConfig::default().validate().is_err());
    }

    #[test]
    fn test_non_positive_duration_rejected() {
        let config = RunConfig {
            duration_secs: 0.0,
            ..run_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tempo_source_defaults_next_to_audio() {
        assert_eq!(
            run_config().tempo_source(),
            PathBuf::from("/music/track.tempo.json")
        );
    }

    #[test]
    fn test_invalid_speed_bounds() {
        let config = WorkerConfig {
            speed_min: 3.0,
            speed_max: 2.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
