use crate::task::TaskId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Broadcasts interpreter lifecycle events to any number of observers
#[derive(Debug, Clone)]
pub struct SagaMonitor {
    sender: broadcast::Sender<MonitorEvent>,
    correlation_id: Uuid,
}

/// Event that has been published
#[derive(Debug, Clone, Serialize)]
pub struct MonitorEvent {
    pub name: &'static str,
    pub task_id: Option<TaskId>,
    pub context: Value,
    pub correlation_id: Uuid,
    pub published_at: DateTime<Utc>,
}

impl SagaMonitor {
    /// Create a new monitor with the specified channel capacity
    pub fn new(capacity: usize, correlation_id: Uuid) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            correlation_id,
        }
    }

    /// Publish an event; having no subscribers is fine
    pub fn publish(&self, name: &'static str, task_id: Option<TaskId>, context: Value) {
        if self.sender.receiver_count() == 0 {
            return;
        }
        let event = MonitorEvent {
            name,
            task_id,
            context,
            correlation_id: self.correlation_id,
            published_at: Utc::now(),
        };
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
