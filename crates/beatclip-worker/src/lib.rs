//! Tempo-synced render pipeline orchestrator.
//!
//! This crate provides:
//! - Timeline construction from tempo windows
//! - Source pool with a run-scoped blacklist
//! - Caption and keyword planning
//! - Checkpointed, resumable per-second rendering
//! - Final assembly through the media capabilities

pub mod assembler;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod events;
pub mod inputs;
pub mod logging;
pub mod metrics;
pub mod planner;
pub mod render_job;
pub mod runner;
pub mod source_pool;
pub mod timeline;

pub use assembler::Assembler;
pub use checkpoint::{checkpoint_dir, CheckpointError, CheckpointStore, RunIdentity};
pub use config::{RunConfig, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use events::{EventSender, RunEvent};
pub use inputs::{JsonTempoEstimator, JsonTranscriber, TempoEstimator, Transcriber};
pub use logging::RunLogger;
pub use planner::{CaptionPlan, PlanError, PlannerSettings};
pub use render_job::{JobSettings, RenderContext, RenderJob, SecondOutcome};
pub use runner::{Capabilities, JobRunner};
pub use source_pool::{PoolError, SourcePool};
pub use timeline::{build_timeline, DurationClamped, TimelineBuild, TimelineError};
