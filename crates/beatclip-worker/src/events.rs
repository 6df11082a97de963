//! Structured run events.
//!
//! The runner reports state transitions and per-second outcomes through an
//! optional channel, decoupled from whatever consumes them.

use serde::Serialize;
use tokio::sync::mpsc;

use beatclip_models::{RenderResult, RunOutcome, RunState, SourceId};

/// Event emitted while a run progresses.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    StateChanged { from: RunState, to: RunState },

    /// Requested duration exceeded the audio
    DurationClamped { requested: f64, actual: f64 },

    /// Checkpoint consulted; rendering starts at `resume_index`
    Resumed { resume_index: usize, total: usize },

    /// A second was committed to the checkpoint
    SecondCompleted { result: RenderResult },

    SourceBlacklisted { second_index: usize, source: SourceId },

    Finished { outcome: RunOutcome },
}

/// Non-blocking event sender; events are dropped when the channel is full
/// or nobody is listening.
#[derive(Debug, Clone, Default)]
pub struct EventSender {
    tx: Option<mpsc::Sender<RunEvent>>,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<RunEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sender that discards everything.
    pub fn noop() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, event: RunEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(event);
        }
    }

    pub fn state_changed(&self, from: RunState, to: RunState) {
        self.send(RunEvent::StateChanged { from, to });
    }

    pub fn second_completed(&self, result: &RenderResult) {
        self.send(RunEvent::SecondCompleted {
            result: result.clone(),
        });
    }

    pub fn source_blacklisted(&self, second_index: usize, source: &SourceId) {
        self.send(RunEvent::SourceBlacklisted {
            second_index,
            source: source.clone(),
        });
    }
}

/// Create an event channel pair.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<RunEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender::new(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_event_channel() {
        let (sender, mut rx) = channel(8);

        sender.state_changed(RunState::Init, RunState::Resuming);
        sender.second_completed(&RenderResult::skipped(0, PathBuf::from("clip_000000.mp4")));

        assert_eq!(
            rx.recv().await.unwrap(),
            RunEvent::StateChanged {
                from: RunState::Init,
                to: RunState::Resuming
            }
        );
        assert!(matches!(
            rx.recv().await.unwrap(),
            RunEvent::SecondCompleted { result } if result.second_index == 0
        ));
    }

    #[test]
    fn test_noop_sender_discards() {
        let sender = EventSender::noop();
        sender.state_changed(RunState::Init, RunState::Failed);
    }

    #[test]
    fn test_full_channel_drops() {
        let (sender, mut rx) = channel(1);
        sender.state_changed(RunState::Init, RunState::Resuming);
        sender.state_changed(RunState::Resuming, RunState::Running);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_serializes_tagged() {
        let json = serde_json::to_value(RunEvent::DurationClamped {
            requested: 60.0,
            actual: 42.5,
        })
        .unwrap();
        assert_eq!(json["event"], "duration_clamped");
    }
}
