//! Shared data models for the BeatClip render pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Tempo windows and the per-second tempo timeline
//! - Clip sources from the local bank
//! - Word timestamps, keyword segments and per-second plan entries
//! - Per-second render results and the run outcome

pub mod caption;
pub mod render;
pub mod run;
pub mod source;
pub mod tempo;
pub mod timestamp;

// Re-export common types
pub use caption::{CaptionMode, KeywordSegment, PlanEntry, PlanKind, WordTimestamp};
pub use render::{RenderResult, RenderStatus, SourceChoice};
pub use run::{RunId, RunOutcome, RunState};
pub use source::{SourceEntry, SourceId};
pub use tempo::{TempoPoint, TempoTimeline, TempoWindow};
