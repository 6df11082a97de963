#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for one-second clip rendering and assembly.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2`
//! - Cancellation and timeouts via tokio
//! - The render / concat / audio capabilities the orchestrator consumes,
//!   with FFmpeg-backed implementations

pub mod capability;
pub mod command;
pub mod concat;
pub mod error;
pub mod filters;
pub mod fs_utils;
pub mod probe;
pub mod progress;
pub mod renderer;

pub use capability::{AudioAttacher, Concatenator, Overlay, RenderError, RenderRequest, SecondRenderer};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use concat::{FfmpegAudioAttacher, FfmpegConcatenator};
pub use error::{MediaError, MediaResult};
pub use probe::{probe_media, probe_video, MediaInfo, VideoStreamInfo};
pub use progress::FfmpegProgress;
pub use renderer::{FfmpegSecondRenderer, RenderSettings};
