//! Step progress notifications
//!
//! Events are fire-and-forget notifications for live observers. They are not
//! a source of truth: the execution record is.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Default buffer size of [`EventBroadcaster`]
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepEventStatus {
    Started,
    Succeeded,
    Failed,
    Waiting,
    RunCompleted,
}

impl StepEventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Waiting => "waiting",
            Self::RunCompleted => "run_completed",
        }
    }
}

impl fmt::Display for StepEventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one step of one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEvent {
    pub execution_id: Uuid,
    pub step_index: usize,
    pub step_type: String,
    pub status: StepEventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepEvent {
    pub fn new(
        execution_id: Uuid,
        step_index: usize,
        step_type: impl Into<String>,
        status: StepEventStatus,
    ) -> Self {
        Self {
            execution_id,
            step_index,
            step_type: step_type.into(),
            status,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Receives step events; publishing never fails or blocks
pub trait EventSink: Send + Sync {
    fn publish(&self, event: StepEvent);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn publish(&self, _event: StepEvent) {}
}

/// Fans step events out to any number of subscribers
///
/// Events published with no subscribers are dropped. Slow subscribers see
/// `RecvError::Lagged` and lose the oldest events.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<StepEvent>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StepEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventSink for EventBroadcaster {
    fn publish(&self, event: StepEvent) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let broadcaster = EventBroadcaster::default();
        let mut first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();
        let event = StepEvent::new(Uuid::now_v7(), 0, "delay", StepEventStatus::Waiting);

        broadcaster.publish(event.clone());

        assert_eq!(first.recv().await.unwrap(), event);
        assert_eq!(second.recv().await.unwrap(), event);
    }

    #[test]
    fn test_publish_without_subscribers_is_dropped() {
        let broadcaster = EventBroadcaster::default();
        assert_eq!(broadcaster.subscriber_count(), 0);

        broadcaster.publish(StepEvent::new(
            Uuid::now_v7(),
            0,
            "branch",
            StepEventStatus::Started,
        ));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_oldest() {
        let broadcaster = EventBroadcaster::new(2);
        let mut receiver = broadcaster.subscribe();
        let execution_id = Uuid::now_v7();

        for index in 0..3 {
            broadcaster.publish(StepEvent::new(
                execution_id,
                index,
                "send_message",
                StepEventStatus::Succeeded,
            ));
        }

        assert!(matches!(receiver.recv().await, Err(RecvError::Lagged(1))));
        assert_eq!(receiver.recv().await.unwrap().step_index, 1);
    }

    #[test]
    fn test_event_serialization() {
        let event = StepEvent::new(Uuid::nil(), 2, "generate", StepEventStatus::Failed)
            .with_error("model unavailable");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "model unavailable");

        let completed = StepEvent::new(Uuid::nil(), 3, "", StepEventStatus::RunCompleted);
        let json = serde_json::to_value(&completed).unwrap();
        assert_eq!(json["status"], "run_completed");
        assert!(json.get("error").is_none());
    }
}
