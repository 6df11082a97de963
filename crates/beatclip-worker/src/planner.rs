//! Per-second caption and keyword plan.
//!
//! A run carries at most one overlay kind. The plan is resolved up front into
//! a dense second-indexed table so lookups during rendering are O(1).

use thiserror::Error;
use tracing::{debug, info};

use beatclip_models::timestamp::{second_midpoint, second_of};
use beatclip_models::{CaptionMode, KeywordSegment, PlanEntry, PlanKind, WordTimestamp};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlanError {
    #[error("word timestamps and a keyword segment plan are mutually exclusive")]
    BothInputs,

    #[error("segment {index} has start {start} >= end {end}")]
    InvalidSegment { index: usize, start: f64, end: f64 },

    #[error("segments overlap: [{first_start}, {first_end}) and [{second_start}, {second_end})")]
    OverlappingSegments {
        first_start: f64,
        first_end: f64,
        second_start: f64,
        second_end: f64,
    },
}

/// Tunables for caption construction.
#[derive(Debug, Clone, Copy)]
pub struct PlannerSettings {
    /// Gap between consecutive words that closes a phrase
    pub phrase_gap_secs: f64,
    /// Karaoke line wrap width in characters
    pub karaoke_max_chars: usize,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            phrase_gap_secs: 0.5,
            karaoke_max_chars: 24,
        }
    }
}

/// Word with trimmed text and a non-negative length.
#[derive(Debug, Clone)]
struct CleanWord {
    text: String,
    start: f64,
    end: f64,
}

fn clean_words(words: &[WordTimestamp]) -> Vec<CleanWord> {
    words
        .iter()
        .filter_map(|w| {
            let text = w.word.trim();
            if text.is_empty() || !w.start.is_finite() || w.start < 0.0 {
                return None;
            }
            let end = if w.end.is_finite() && w.end >= w.start {
                w.end
            } else {
                w.start
            };
            Some(CleanWord {
                text: text.to_string(),
                start: w.start,
                end,
            })
        })
        .collect()
}

fn ends_sentence(text: &str) -> bool {
    text.ends_with(['.', '!', '?'])
}

fn strip_trailing_punctuation(text: &str) -> &str {
    text.trim_end_matches(|c: char| !c.is_alphanumeric())
}

/// Second-indexed overlay plan.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionPlan {
    kind: Option<PlanKind>,
    entries: Vec<Option<PlanEntry>>,
}

impl CaptionPlan {
    /// A plan with no overlays.
    pub fn empty(total_seconds: usize) -> Self {
        Self {
            kind: None,
            entries: vec![None; total_seconds],
        }
    }

    /// Pick the construction path from whichever input was supplied.
    pub fn build(
        words: Option<&[WordTimestamp]>,
        segments: Option<&[KeywordSegment]>,
        mode: CaptionMode,
        total_seconds: usize,
        settings: PlannerSettings,
    ) -> Result<Self, PlanError> {
        match (words, segments) {
            (Some(_), Some(_)) => Err(PlanError::BothInputs),
            (Some(words), None) => Ok(match mode {
                CaptionMode::Phrase => {
                    Self::phrases(words, total_seconds, settings.phrase_gap_secs)
                }
                CaptionMode::Karaoke => {
                    Self::karaoke(words, total_seconds, settings.karaoke_max_chars)
                }
            }),
            (None, Some(segments)) => Self::keywords(segments, total_seconds),
            (None, None) => Ok(Self::empty(total_seconds)),
        }
    }

    /// One caption per phrase: the phrase's last word at the second its
    /// end timestamp falls in. Later phrases overwrite earlier ones.
    pub fn phrases(words: &[WordTimestamp], total_seconds: usize, gap_secs: f64) -> Self {
        let words = clean_words(words);
        let mut entries = vec![None; total_seconds];

        for (i, word) in words.iter().enumerate() {
            let closes_phrase = match words.get(i + 1) {
                Some(next) => ends_sentence(&word.text) || next.start - word.end > gap_secs,
                None => true,
            };
            if !closes_phrase {
                continue;
            }

            let text = strip_trailing_punctuation(&word.text);
            if text.is_empty() {
                continue;
            }
            match second_of(word.end).filter(|s| *s < total_seconds) {
                Some(second) => entries[second] = Some(PlanEntry::Phrase { text: text.to_string() }),
                None => debug!(word = %word.text, end = word.end, "Phrase ends past the timeline"),
            }
        }

        let plan = Self {
            kind: Some(PlanKind::Phrase),
            entries,
        };
        info!(captions = plan.assigned(), "Built phrase caption plan");
        plan
    }

    /// Every word overlapping a second, upper-cased and wrapped into lines.
    pub fn karaoke(words: &[WordTimestamp], total_seconds: usize, max_chars: usize) -> Self {
        let mut per_second: Vec<Vec<String>> = vec![Vec::new(); total_seconds];

        for word in clean_words(words) {
            let Some(first) = second_of(word.start).filter(|s| *s < total_seconds) else {
                continue;
            };
            let last = if word.end > word.start {
                (word.end.ceil() as usize).saturating_sub(1).max(first)
            } else {
                first
            }
            .min(total_seconds - 1);
            let text = word.text.to_uppercase();
            for slot in per_second.iter_mut().take(last + 1).skip(first) {
                slot.push(text.clone());
            }
        }

        let entries = per_second
            .into_iter()
            .map(|words| {
                if words.is_empty() {
                    None
                } else {
                    Some(PlanEntry::Karaoke {
                        lines: wrap_words(&words, max_chars),
                    })
                }
            })
            .collect();

        let plan = Self {
            kind: Some(PlanKind::Karaoke),
            entries,
        };
        info!(captions = plan.assigned(), "Built karaoke caption plan");
        plan
    }

    /// Keyword query for every second whose midpoint falls in a segment.
    pub fn keywords(segments: &[KeywordSegment], total_seconds: usize) -> Result<Self, PlanError> {
        let mut segments: Vec<&KeywordSegment> = segments.iter().collect();
        for (index, segment) in segments.iter().enumerate() {
            if !(segment.start.is_finite() && segment.end.is_finite()) || segment.start >= segment.end {
                return Err(PlanError::InvalidSegment {
                    index,
                    start: segment.start,
                    end: segment.end,
                });
            }
        }

        segments.sort_by(|a, b| a.start.total_cmp(&b.start));
        for pair in segments.windows(2) {
            if pair[0].end > pair[1].start {
                return Err(PlanError::OverlappingSegments {
                    first_start: pair[0].start,
                    first_end: pair[0].end,
                    second_start: pair[1].start,
                    second_end: pair[1].end,
                });
            }
        }

        let mut entries = vec![None; total_seconds];
        for segment in segments {
            let query = segment.query.trim();
            if query.is_empty() {
                debug!(start = segment.start, "Segment has no query, skipping");
                continue;
            }
            let first = (segment.start - 0.5).max(0.0).ceil() as usize;
            for (second, slot) in entries.iter_mut().enumerate().skip(first) {
                let midpoint = second_midpoint(second);
                if midpoint >= segment.end {
                    break;
                }
                if midpoint >= segment.start {
                    *slot = Some(PlanEntry::Keyword {
                        query: query.to_string(),
                    });
                }
            }
        }

        let plan = Self {
            kind: Some(PlanKind::Keyword),
            entries,
        };
        info!(keywords = plan.assigned(), "Built keyword plan");
        Ok(plan)
    }

    pub fn for_second(&self, second_index: usize) -> Option<&PlanEntry> {
        self.entries.get(second_index).and_then(|e| e.as_ref())
    }

    pub fn kind(&self) -> Option<PlanKind> {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Seconds that carry an entry.
    pub fn assigned(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }
}

/// Greedy line wrap; a word longer than the width gets a line of its own.
fn wrap_words(words: &[String], max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in words {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
