//! Caption and keyword planning types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A transcribed word with its timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTimestamp {
    #[serde(alias = "text")]
    pub word: String,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
}

impl WordTimestamp {
    pub fn new(word: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            word: word.into(),
            start,
            end,
        }
    }
}

/// An explicit keyword segment from a segment plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordSegment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    /// Start time in seconds (inclusive)
    pub start: f64,
    /// End time in seconds (exclusive)
    pub end: f64,
    /// Image search query
    #[serde(alias = "gif_query")]
    pub query: String,
}

impl KeywordSegment {
    pub fn new(start: f64, end: f64, query: impl Into<String>) -> Self {
        Self {
            id: None,
            start,
            end,
            query: query.into(),
        }
    }
}

/// How word timestamps are turned into captions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptionMode {
    /// Last word of each phrase, shown in the second it ends
    #[default]
    Phrase,
    /// Every word intersecting a second, shown as one line
    Karaoke,
}

impl CaptionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptionMode::Phrase => "phrase",
            CaptionMode::Karaoke => "karaoke",
        }
    }
}

impl fmt::Display for CaptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CaptionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "phrase" | "lyrics" => Ok(CaptionMode::Phrase),
            "karaoke" => Ok(CaptionMode::Karaoke),
            other => Err(format!("unknown caption mode: {}", other)),
        }
    }
}

/// Kind of plan built for a run. At most one kind is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    Phrase,
    Karaoke,
    Keyword,
}

impl PlanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanKind::Phrase => "phrase",
            PlanKind::Karaoke => "karaoke",
            PlanKind::Keyword => "keyword",
        }
    }

    /// Whether entries of this kind are drawn as a text overlay.
    pub fn is_caption(&self) -> bool {
        matches!(self, PlanKind::Phrase | PlanKind::Karaoke)
    }
}

impl From<CaptionMode> for PlanKind {
    fn from(mode: CaptionMode) -> Self {
        match mode {
            CaptionMode::Phrase => PlanKind::Phrase,
            CaptionMode::Karaoke => PlanKind::Karaoke,
        }
    }
}

/// What to show or fetch for one second.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanEntry {
    Phrase { text: String },
    Karaoke { lines: Vec<String> },
    Keyword { query: String },
}

impl PlanEntry {
    pub fn kind(&self) -> PlanKind {
        match self {
            PlanEntry::Phrase { .. } => PlanKind::Phrase,
            PlanEntry::Karaoke { .. } => PlanKind::Karaoke,
            PlanEntry::Keyword { .. } => PlanKind::Keyword,
        }
    }

    /// Text to burn into the frame, for caption entries.
    pub fn overlay_text(&self) -> Option<String> {
        match self {
            PlanEntry::Phrase { text } => Some(text.clone()),
            PlanEntry::Karaoke { lines } => Some(lines.join("\n")),
            PlanEntry::Keyword { .. } => None,
        }
    }

    /// Search query, for keyword entries.
    pub fn keyword_query(&self) -> Option<&str> {
        match self {
            PlanEntry::Keyword { query } => Some(query),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_reads_gif_query() {
        let json = r#"{"id": 3, "start": 5.0, "end": 10.0, "gif_query": "sunset"}"#;
        let segment: KeywordSegment = serde_json::from_str(json).unwrap();
        assert_eq!(segment.query, "sunset");
        assert_eq!(segment.start, 5.0);
    }

    #[test]
    fn test_plan_entry_accessors() {
        let phrase = PlanEntry::Phrase {
            text: "world".to_string(),
        };
        assert_eq!(phrase.overlay_text().as_deref(), Some("world"));
        assert!(phrase.keyword_query().is_none());
        assert!(phrase.kind().is_caption());

        let keyword = PlanEntry::Keyword {
            query: "sunset".to_string(),
        };
        assert_eq!(keyword.keyword_query(), Some("sunset"));
        assert!(keyword.overlay_text().is_none());
        assert!(!keyword.kind().is_caption());
    }

    #[test]
    fn test_caption_mode_parse() {
        assert_eq!("Karaoke".parse::<CaptionMode>(), Ok(CaptionMode::Karaoke));
        assert_eq!("phrase".parse::<CaptionMode>(), Ok(CaptionMode::Phrase));
        assert!("subtitles".parse::<CaptionMode>().is_err());
    }
}
