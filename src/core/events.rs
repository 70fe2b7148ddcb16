use serde::Serialize;
use tokio::sync::broadcast;

use crate::core::collaboration::CollaborationEvent;
use crate::core::orchestrator::types::SystemState;

/// Notifications published by the orchestrator. Delivery is best effort:
/// with no subscribers, or a lagging one, events are dropped.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    CycleCompleted {
        cycle: u64,
        duration_ms: u64,
        state: Box<SystemState>,
    },
    CollaborationCompleted {
        collaboration: CollaborationEvent,
    },
    WorkerRestarted {
        worker_id: String,
        success: bool,
    },
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<OrchestratorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: OrchestratorEvent) {
        let _ = self.sender.send(event); // No receivers is fine
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
