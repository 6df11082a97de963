//! Per-second tempo timeline construction.
//!
//! Tempo windows from the estimator are sampled at each output second's
//! midpoint. The run is never longer than the audio it is synced to.

use thiserror::Error;

use beatclip_models::timestamp::{second_midpoint, whole_seconds};
use beatclip_models::{TempoTimeline, TempoWindow};

/// Minimum weight a window contributes to the base tempo vote.
const MIN_WINDOW_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TimelineError {
    #[error("tempo estimate is empty or covers no output seconds")]
    EmptyTimeline,
}

/// The requested duration was longer than the audio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationClamped {
    pub requested: f64,
    pub actual: f64,
}

/// A built timeline plus the clamp signal, if any.
#[derive(Debug, Clone)]
pub struct TimelineBuild {
    pub timeline: TempoTimeline,
    /// Effective duration in seconds (`min(requested, audio)`)
    pub duration: f64,
    pub clamped: Option<DurationClamped>,
}

fn is_valid_tempo(tempo: f64) -> bool {
    tempo.is_finite() && tempo > 0.0
}

/// Length of the audio implied by the estimate (end of the last window).
pub fn audio_length(windows: &[TempoWindow]) -> f64 {
    windows
        .iter()
        .map(|w| w.end)
        .filter(|end| end.is_finite())
        .fold(0.0, f64::max)
}

/// Reference tempo for the run.
///
/// The tempo that covers the most total time wins; ties resolve to the
/// tempo that appears first.
pub fn base_tempo(windows: &[TempoWindow]) -> Option<f64> {
    let mut votes: Vec<(f64, f64)> = Vec::new();
    for window in windows.iter().filter(|w| is_valid_tempo(w.tempo)) {
        let weight = window.length().max(MIN_WINDOW_WEIGHT);
        match votes.iter_mut().find(|(tempo, _)| *tempo == window.tempo) {
            Some((_, total)) => *total += weight,
            None => votes.push((window.tempo, weight)),
        }
    }

    let mut best: Option<(f64, f64)> = None;
    for (tempo, weight) in votes {
        if best.map_or(true, |(_, w)| weight > w) {
            best = Some((tempo, weight));
        }
    }
    best.map(|(tempo, _)| tempo)
}

/// Tempo at time `t` over windows sorted by start.
///
/// Gaps take the preceding window; times before the first window take the
/// first one and times after the last take the last one.
fn tempo_at(sorted: &[TempoWindow], t: f64) -> Option<f64> {
    sorted
        .iter()
        .rev()
        .find(|w| w.start <= t)
        .or_else(|| sorted.first())
        .map(|w| w.tempo)
}

/// Build the per-second timeline for `requested` seconds of output.
///
/// `audio_duration` overrides the length implied by the estimate.
pub fn build_timeline(
    windows: &[TempoWindow],
    requested: f64,
    audio_duration: Option<f64>,
) -> Result<TimelineBuild, TimelineError> {
    if windows.is_empty() {
        return Err(TimelineError::EmptyTimeline);
    }
    let base = base_tempo(windows).ok_or(TimelineError::EmptyTimeline)?;

    let audio = audio_duration
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or_else(|| audio_length(windows));

    let requested = if requested.is_finite() { requested } else { 0.0 };
    let (duration, clamped) = if requested > audio {
        (
            audio,
            Some(DurationClamped {
                requested,
                actual: audio,
            }),
        )
    } else {
        (requested, None)
    };

    let total = whole_seconds(duration);
    if total == 0 {
        return Err(TimelineError::EmptyTimeline);
    }

    let mut sorted = windows.to_vec();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let tempos = (0..total).map(|i| {
        tempo_at(&sorted, second_midpoint(i))
            .filter(|t| is_valid_tempo(*t))
            .unwrap_or(base)
    });

    Ok(TimelineBuild {
        timeline: TempoTimeline::from_tempos(tempos, base),
        duration,
        clamped,
    })
}

/// Playback speed for a second: `local / base`, clamped to `[min, max]`.
pub fn speed_multiplier(local: f64, base: f64, min: f64, max: f64) -> f64 {
    if !is_valid_tempo(local) || !is_valid_tempo(base) {
        return 1.0_f64.clamp(min, max);
    }
    (local / base).clamp(min, max)
}
