//! Render run metrics.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use beatclip_models::RenderStatus;

/// Metric name constants for consistency.
pub mod names {
    /// Seconds committed to the checkpoint, by status.
    pub const SECONDS_RENDERED_TOTAL: &str = "beatclip_seconds_rendered_total";

    /// Sources removed from selection for the rest of a run.
    pub const SOURCES_BLACKLISTED_TOTAL: &str = "beatclip_sources_blacklisted_total";

    /// Seconds filled with the neutral fallback frame.
    pub const FALLBACK_FRAMES_TOTAL: &str = "beatclip_fallback_frames_total";

    /// Seconds rendered without their planned caption.
    pub const OVERLAYS_DROPPED_TOTAL: &str = "beatclip_overlays_dropped_total";

    /// Wall time spent producing one second.
    pub const SECOND_RENDER_SECONDS: &str = "beatclip_second_render_seconds";

    /// Finished runs, by outcome.
    pub const RUNS_TOTAL: &str = "beatclip_runs_total";
}

/// Install the Prometheus recorder; the handle renders the text exposition.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Record a committed second.
pub fn record_second(status: RenderStatus, elapsed_secs: f64) {
    counter!(
        names::SECONDS_RENDERED_TOTAL,
        "status" => status.as_str()
    )
    .increment(1);

    if status == RenderStatus::Failed {
        counter!(names::FALLBACK_FRAMES_TOTAL).increment(1);
    }

    if status != RenderStatus::Skipped {
        histogram!(names::SECOND_RENDER_SECONDS).record(elapsed_secs);
    }
}

pub fn record_blacklisted() {
    counter!(names::SOURCES_BLACKLISTED_TOTAL).increment(1);
}

pub fn record_overlay_dropped() {
    counter!(names::OVERLAYS_DROPPED_TOTAL).increment(1);
}

pub fn record_run(outcome: &'static str) {
    counter!(names::RUNS_TOTAL, "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::SECONDS_RENDERED_TOTAL.starts_with("beatclip_"));
        assert!(names::SOURCES_BLACKLISTED_TOTAL.contains("blacklisted"));
        assert!(names::FALLBACK_FRAMES_TOTAL.contains("fallback"));
        assert!(names::OVERLAYS_DROPPED_TOTAL.contains("overlays"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_second(RenderStatus::Ok, 0.4);
        record_second(RenderStatus::Failed, 0.1);
        record_blacklisted();
        record_overlay_dropped();
        record_run("completed");
    }
}
