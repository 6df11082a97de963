//! Per-second render results.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::SourceId;

/// Where the pixels for a second came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceChoice {
    /// A clip from the local bank
    Bank {
        id: SourceId,
        path: PathBuf,
        /// Sub-clip start offset in seconds
        offset: f64,
    },
    /// Media fetched for a keyword query
    Keyword {
        query: String,
        path: PathBuf,
        offset: f64,
    },
    /// Neutral fallback frame
    Fallback,
}

impl SourceChoice {
    pub fn label(&self) -> String {
        match self {
            SourceChoice::Bank { id, .. } => id.to_string(),
            SourceChoice::Keyword { query, .. } => format!("keyword:{}", query),
            SourceChoice::Fallback => "fallback".to_string(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, SourceChoice::Fallback)
    }
}

/// Outcome status of a second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStatus {
    /// Rendered from a real source
    Ok,
    /// Source failures exhausted; fallback frame substituted
    Failed,
    /// Already present in the checkpoint
    Skipped,
}

impl RenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStatus::Ok => "ok",
            RenderStatus::Failed => "failed",
            RenderStatus::Skipped => "skipped",
        }
    }
}

/// Result of producing one second of output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderResult {
    pub second_index: usize,
    pub artifact_path: PathBuf,
    pub status: RenderStatus,
    /// True when the planned caption could not be drawn
    #[serde(default)]
    pub overlay_dropped: bool,
    /// Source used for the artifact (absent for skipped seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceChoice>,
}

impl RenderResult {
    /// A second that was restored from the checkpoint.
    pub fn skipped(second_index: usize, artifact_path: PathBuf) -> Self {
        Self {
            second_index,
            artifact_path,
            status: RenderStatus::Skipped,
            overlay_dropped: false,
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_choice_label() {
        let bank = SourceChoice::Bank {
            id: SourceId::from("a.mp4"),
            path: PathBuf::from("/bank/a.mp4"),
            offset: 0.0,
        };
        assert_eq!(bank.label(), "a.mp4");
        assert_eq!(SourceChoice::Fallback.label(), "fallback");
        assert!(SourceChoice::Fallback.is_fallback());
    }

    #[test]
    fn test_skipped_result_serializes_status() {
        let result = RenderResult::skipped(4, PathBuf::from("clip_000004.mp4"));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "skipped");
        assert!(json.get("source").is_none());
    }
}
