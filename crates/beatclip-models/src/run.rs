//! Run identity, lifecycle states and outcome.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Unique identifier for a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new random run ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Runner lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Building timeline, pool and plan
    #[default]
    Init,
    /// Reading the checkpoint
    Resuming,
    /// Rendering seconds
    Running,
    /// Joining clips and attaching audio
    Assembling,
    /// Output written
    Done,
    /// Stopped; checkpoint retained
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Init => "init",
            RunState::Resuming => "resuming",
            RunState::Running => "running",
            RunState::Assembling => "assembling",
            RunState::Done => "done",
            RunState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Init, Resuming) | (Resuming, Running) | (Running, Assembling) | (Assembling, Done) => {
                true
            }
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final result of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Full requested duration rendered and assembled
    Completed { output_path: PathBuf },
    /// Run stopped; the checkpoint is retained for resume
    Failed { reason: String },
    /// Output assembled, but shorter than requested because the audio ran out
    Clamped {
        output_path: PathBuf,
        actual_duration: f64,
    },
}

impl RunOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        RunOutcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, RunOutcome::Failed { .. })
    }

    pub fn output_path(&self) -> Option<&Path> {
        match self {
            RunOutcome::Completed { output_path } | RunOutcome::Clamped { output_path, .. } => {
                Some(output_path)
            }
            RunOutcome::Failed { .. } => None,
        }
    }
}
