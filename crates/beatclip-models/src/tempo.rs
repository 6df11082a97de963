//! Tempo windows and the per-second tempo timeline.

use serde::{Deserialize, Serialize};

/// A region of the audio track with roughly constant tempo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoWindow {
    /// Window start in seconds
    pub start: f64,
    /// Window end in seconds (exclusive)
    pub end: f64,
    /// Estimated beats per minute
    #[serde(alias = "bpm")]
    pub tempo: f64,
}

impl TempoWindow {
    pub fn new(start: f64, end: f64, tempo: f64) -> Self {
        Self { start, end, tempo }
    }

    /// Length of the window in seconds (never negative).
    pub fn length(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Whether `time` falls inside `[start, end)`.
    pub fn covers(&self, time: f64) -> bool {
        self.start <= time && time < self.end
    }
}

/// Tempo value for one whole second of output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoPoint {
    pub second_index: usize,
    pub tempo: f64,
}

/// Per-second tempo sequence.
///
/// Indices are contiguous from 0 by construction; the timeline cannot be
/// modified once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoTimeline {
    points: Vec<TempoPoint>,
    base_tempo: f64,
}

impl TempoTimeline {
    /// Build a timeline from one tempo per second, in order.
    pub fn from_tempos(tempos: impl IntoIterator<Item = f64>, base_tempo: f64) -> Self {
        let points = tempos
            .into_iter()
            .enumerate()
            .map(|(second_index, tempo)| TempoPoint { second_index, tempo })
            .collect();
        Self { points, base_tempo }
    }

    /// Number of seconds in the timeline.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Reference tempo used for speed multipliers across the whole run.
    pub fn base_tempo(&self) -> f64 {
        self.base_tempo
    }

    /// Tempo for a second, if it is inside the timeline.
    pub fn tempo_at(&self, second_index: usize) -> Option<f64> {
        self.points.get(second_index).map(|p| p.tempo)
    }

    pub fn points(&self) -> &[TempoPoint] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &TempoPoint> {
        self.points.iter()
    }
}
