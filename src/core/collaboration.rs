//! Brokered, asynchronous request/response between two workers.
//!
//! `initiate` records a pending event and enqueues its id; a dispatcher task
//! drains the queue and runs each exchange in order, so the initiator never
//! re-enters worker code on its own stack.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info, warn};

use crate::core::events::{EventBus, OrchestratorEvent};
use crate::core::ledger::BoundedLedger;
use crate::core::worker::{WorkerRegistry, WorkerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl CollaborationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CollaborationStatus::Pending => "pending",
            CollaborationStatus::InProgress => "in_progress",
            CollaborationStatus::Completed => "completed",
            CollaborationStatus::Failed => "failed",
        }
    }

    pub fn is_settled(self) -> bool {
        matches!(
            self,
            CollaborationStatus::Completed | CollaborationStatus::Failed
        )
    }
}

/// Forward-only lifecycle: pending → in_progress → completed | failed.
pub fn can_transition(from: CollaborationStatus, to: CollaborationStatus) -> bool {
    match from {
        CollaborationStatus::Pending => to == CollaborationStatus::InProgress,
        CollaborationStatus::InProgress => matches!(
            to,
            CollaborationStatus::Completed | CollaborationStatus::Failed
        ),
        CollaborationStatus::Completed | CollaborationStatus::Failed => false,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationEvent {
    pub id: String,
    pub source_worker_id: String,
    pub target_worker_id: String,
    pub query: String,
    pub status: CollaborationStatus,
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CollaborationEvent {
    fn new(source: &str, target: &str, query: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_worker_id: source.to_string(),
            target_worker_id: target.to_string(),
            query: query.to_string(),
            status: CollaborationStatus::Pending,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    fn transition(&mut self, to: CollaborationStatus) -> bool {
        if !can_transition(self.status, to) {
            warn!(
                "Collaboration [{}] refused transition {} -> {}",
                self.id,
                self.status.as_str(),
                to.as_str()
            );
            return false;
        }
        self.status = to;
        match to {
            CollaborationStatus::InProgress => self.started_at = Some(Utc::now()),
            CollaborationStatus::Completed | CollaborationStatus::Failed => {
                self.finished_at = Some(Utc::now())
            }
            CollaborationStatus::Pending => {}
        }
        true
    }
}

pub struct CollaborationBroker {
    registry: Arc<RwLock<WorkerRegistry>>,
    events: Mutex<BoundedLedger<CollaborationEvent>>,
    queue: mpsc::Sender<String>,
    receiver: Mutex<Option<mpsc::Receiver<String>>>,
    bus: EventBus,
}

impl CollaborationBroker {
    pub fn new(
        registry: Arc<RwLock<WorkerRegistry>>,
        bus: EventBus,
        capacity: usize,
        queue_capacity: usize,
    ) -> Self {
        let (queue, receiver) = mpsc::channel(queue_capacity.max(1));
        Self {
            registry,
            events: Mutex::new(BoundedLedger::new(capacity)),
            queue,
            receiver: Mutex::new(Some(receiver)),
            bus,
        }
    }

    /// Start the task that drains the queue. Only the first call spawns;
    /// later calls return false. The task ends once the broker is dropped.
    pub async fn spawn_dispatcher(self: &Arc<Self>) -> bool {
        let Some(mut rx) = self.receiver.lock().await.take() else {
            return false;
        };
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(id) = rx.recv().await {
                let Some(broker) = weak.upgrade() else {
                    break;
                };
                let runner = broker.clone();
                let task_id = id.clone();
                // Run each exchange in its own task so a panicking worker
                // cannot take the dispatcher down with it.
                if tokio::spawn(async move { runner.execute(&task_id).await })
                    .await
                    .is_err()
                {
                    broker
                        .settle(&id, Err("assistance task panicked".to_string()))
                        .await;
                }
            }
            debug!("Collaboration dispatcher stopped");
        });
        true
    }

    /// Record a pending collaboration and queue it. Never waits on the target.
    pub async fn initiate(&self, source: &str, target: &str, query: &str) -> String {
        let event = CollaborationEvent::new(source, target, query);
        let id = event.id.clone();
        self.events.lock().await.push(event);
        info!("Collaboration [{}] initiated: {} -> {}", id, source, target);

        if let Err(e) = self.queue.try_send(id.clone()) {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "collaboration queue full",
                mpsc::error::TrySendError::Closed(_) => "collaboration dispatcher closed",
            };
            warn!("Collaboration [{}] not queued: {}", id, reason);
            self.fail_unqueued(&id, reason).await;
        }
        id
    }

    /// Settle an event that never reached the dispatcher. It still passes
    /// through in_progress so every settled event carries a start time.
    async fn fail_unqueued(&self, id: &str, reason: &str) {
        {
            let mut events = self.events.lock().await;
            let Some(event) = events.iter_mut().find(|e| e.id == id) else {
                return;
            };
            if !event.transition(CollaborationStatus::InProgress) {
                return;
            }
        }
        self.settle(id, Err(reason.to_string())).await;
    }

    /// Run one pending collaboration to completion. Returns false if the id is
    /// unknown or the event was not pending.
    pub async fn execute(&self, id: &str) -> bool {
        let (source, target, query) = {
            let mut events = self.events.lock().await;
            let Some(event) = events.iter_mut().find(|e| e.id == id) else {
                warn!("Collaboration [{}] not found (evicted?)", id);
                return false;
            };
            if !event.transition(CollaborationStatus::InProgress) {
                return false;
            }
            (
                event.source_worker_id.clone(),
                event.target_worker_id.clone(),
                event.query.clone(),
            )
        };

        let worker = self
            .registry
            .read()
            .await
            .get(&target)
            .map(|entry| entry.worker.clone());

        let outcome = match worker {
            None => Err(format!("target worker '{}' not found", target)),
            Some(worker) => worker
                .provide_assistance(&source, &query)
                .await
                .map_err(|e| e.to_string()),
        };
        self.settle(id, outcome).await;
        true
    }

    async fn settle(&self, id: &str, outcome: Result<serde_json::Value, String>) {
        let settled = {
            let mut events = self.events.lock().await;
            let Some(event) = events.iter_mut().find(|e| e.id == id) else {
                return;
            };
            let (to, result) = match outcome {
                Ok(value) => (CollaborationStatus::Completed, value),
                Err(err) => (CollaborationStatus::Failed, serde_json::Value::String(err)),
            };
            if !event.transition(to) {
                return;
            }
            event.result = Some(result);
            event.clone()
        };

        info!(
            "Collaboration [{}] {}: {} -> {}",
            settled.id,
            settled.status.as_str(),
            settled.source_worker_id,
            settled.target_worker_id
        );
        self.bus.publish(OrchestratorEvent::CollaborationCompleted {
            collaboration: settled,
        });
    }

    /// Open collaborations driven by a successful result's confident insights.
    /// Each qualifying insight yields at most one collaboration, with the first
    /// registered candidate that is not the source.
    pub async fn consider_spontaneous(
        &self,
        source: &str,
        result: &WorkerResult,
        threshold: f64,
        routes: &BTreeMap<String, Vec<String>>,
    ) -> Vec<String> {
        if !result.success {
            return Vec::new();
        }

        let mut planned = Vec::new();
        {
            let registry = self.registry.read().await;
            for insight in result.insights.iter().filter(|i| i.confidence > threshold) {
                let Some(candidates) = routes.get(&insight.kind.to_ascii_lowercase()) else {
                    continue;
                };
                let target = candidates
                    .iter()
                    .filter(|c| c.as_str() != source)
                    .find(|c| registry.contains(c));
                if let Some(target) = target {
                    planned.push((target.clone(), insight.content.clone()));
                }
            }
        }

        let mut ids = Vec::with_capacity(planned.len());
        for (target, content) in planned {
            ids.push(self.initiate(source, &target, &content).await);
        }
        ids
    }

    pub async fn get(&self, id: &str) -> Option<CollaborationEvent> {
        self.events
            .lock()
            .await
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    pub async fn list(&self) -> Vec<CollaborationEvent> {
        self.events.lock().await.to_vec()
    }

    pub async fn set_capacity(&self, capacity: usize) {
        self.events.lock().await.set_capacity(capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::worker::{Worker, WorkerContext};
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Helper {
        id: &'static str,
        fail: bool,
    }

    #[async_trait]
    impl Worker for Helper {
        fn id(&self) -> &str {
            self.id
        }
        fn display_name(&self) -> &str {
            self.id
        }
        async fn execute(&self, _ctx: &WorkerContext) -> Result<WorkerResult> {
            Ok(WorkerResult::ok("ok"))
        }
        async fn provide_assistance(&self, from: &str, q: &str) -> Result<serde_json::Value> {
            if self.fail {
                return Err(anyhow!("cannot help"));
            }
            Ok(serde_json::json!({ "answered": from, "query": q }))
        }
    }

    async fn broker_with(workers: Vec<Helper>, queue: usize) -> Arc<CollaborationBroker> {
        let registry = Arc::new(RwLock::new(WorkerRegistry::new()));
        {
            let mut reg = registry.write().await;
            for w in workers {
                reg.register(Arc::new(w));
            }
        }
        Arc::new(CollaborationBroker::new(
            registry,
            EventBus::default(),
            10,
            queue,
        ))
    }

    async fn wait_settled(broker: &CollaborationBroker, id: &str) -> CollaborationEvent {
        for _ in 0..100 {
            if let Some(ev) = broker.get(id).await
                && ev.status.is_settled()
            {
                return ev;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("collaboration {} never settled", id);
    }

    #[test]
    fn transitions_only_move_forward() {
        use CollaborationStatus::*;
        assert!(can_transition(Pending, InProgress));
        assert!(can_transition(InProgress, Completed));
        assert!(can_transition(InProgress, Failed));
        assert!(!can_transition(Pending, Completed));
        assert!(!can_transition(Pending, Failed));
        assert!(!can_transition(Completed, InProgress));
        assert!(!can_transition(Failed, Pending));
        assert!(!can_transition(InProgress, Pending));
    }

    #[tokio::test]
    async fn execute_completes_with_target_answer() {
        let broker = broker_with(
            vec![
                Helper { id: "a", fail: false },
                Helper { id: "b", fail: false },
            ],
            8,
        )
        .await;
        let id = broker.initiate("a", "b", "what now?").await;
        assert_eq!(
            broker.get(&id).await.map(|e| e.status),
            Some(CollaborationStatus::Pending)
        );

        assert!(broker.execute(&id).await);
        let ev = broker.get(&id).await.unwrap();
        assert_eq!(ev.status, CollaborationStatus::Completed);
        assert!(ev.started_at.is_some());
        assert_eq!(ev.result.unwrap()["answered"], "a");

        assert!(!broker.execute(&id).await, "settled events do not rerun");
    }

    #[tokio::test]
    async fn missing_target_and_errors_fail_the_event() {
        let broker = broker_with(vec![Helper { id: "b", fail: true }], 8).await;

        let missing = broker.initiate("a", "ghost", "q").await;
        broker.execute(&missing).await;
        let ev = broker.get(&missing).await.unwrap();
        assert_eq!(ev.status, CollaborationStatus::Failed);
        assert!(ev.result.unwrap().as_str().unwrap().contains("ghost"));

        let erroring = broker.initiate("a", "b", "q").await;
        broker.execute(&erroring).await;
        let ev = broker.get(&erroring).await.unwrap();
        assert_eq!(ev.status, CollaborationStatus::Failed);
        assert_eq!(ev.result.unwrap(), serde_json::json!("cannot help"));
    }

    #[tokio::test]
    async fn dispatcher_drains_the_queue() {
        let broker = broker_with(
            vec![
                Helper { id: "a", fail: false },
                Helper { id: "b", fail: false },
            ],
            8,
        )
        .await;
        let mut rx = broker.bus.subscribe();
        assert!(broker.spawn_dispatcher().await);
        assert!(!broker.spawn_dispatcher().await);

        let id = broker.initiate("a", "b", "hello").await;
        let ev = wait_settled(&broker, &id).await;
        assert_eq!(ev.status, CollaborationStatus::Completed);

        match rx.recv().await.unwrap() {
            OrchestratorEvent::CollaborationCompleted { collaboration } => {
                assert_eq!(collaboration.id, id)
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn full_queue_fails_immediately() {
        let broker = broker_with(vec![Helper { id: "b", fail: false }], 1).await;
        let first = broker.initiate("a", "b", "one").await;
        let second = broker.initiate("a", "b", "two").await;
        assert_eq!(
            broker.get(&first).await.map(|e| e.status),
            Some(CollaborationStatus::Pending)
        );
        let ev = broker.get(&second).await.unwrap();
        assert_eq!(ev.status, CollaborationStatus::Failed);
        assert!(ev.started_at.is_some());
        assert!(ev.finished_at >= ev.started_at);
        assert_eq!(ev.result.unwrap(), serde_json::json!("collaboration queue full"));
    }

    #[tokio::test]
    async fn every_settled_event_was_started() {
        let broker = broker_with(
            vec![
                Helper { id: "a", fail: false },
                Helper { id: "b", fail: true },
            ],
            3,
        )
        .await;
        let ok = broker.initiate("b", "a", "fine").await;
        let erroring = broker.initiate("a", "b", "boom").await;
        let missing = broker.initiate("a", "ghost", "anyone?").await;
        let overflow = broker.initiate("a", "b", "no room").await;
        broker.execute(&ok).await;
        broker.execute(&erroring).await;
        broker.execute(&missing).await;

        let events = broker.list().await;
        assert_eq!(events.len(), 4);
        for ev in events {
            assert!(ev.status.is_settled(), "{} left {:?}", ev.query, ev.status);
            assert!(ev.started_at.is_some(), "{} skipped in_progress", ev.query);
        }
        assert_eq!(
            broker.get(&overflow).await.map(|e| e.status),
            Some(CollaborationStatus::Failed)
        );
    }

    #[tokio::test]
    async fn spontaneous_picks_first_registered_non_source_candidate() {
        let broker = broker_with(
            vec![
                Helper { id: "analyst", fail: false },
                Helper { id: "monitor", fail: false },
            ],
            8,
        )
        .await;
        let mut routes = BTreeMap::new();
        routes.insert(
            "opportunity".to_string(),
            vec!["analyst".to_string(), "monitor".to_string()],
        );
        routes.insert("risk".to_string(), vec!["ghost".to_string()]);

        let result = WorkerResult::ok("done")
            .with_insight("opportunity", "new grant", 0.9)
            .with_insight("opportunity", "weak lead", 0.2)
            .with_insight("risk", "nobody to ask", 0.95)
            .with_insight("unmapped", "ignored", 0.99);

        let ids = broker
            .consider_spontaneous("analyst", &result, 0.7, &routes)
            .await;
        assert_eq!(ids.len(), 1);
        let ev = broker.get(&ids[0]).await.unwrap();
        assert_eq!(ev.source_worker_id, "analyst");
        assert_eq!(ev.target_worker_id, "monitor");
        assert_eq!(ev.query, "new grant");

        let failed = WorkerResult::failed("nope").with_insight("opportunity", "x", 0.9);
        assert!(
            broker
                .consider_spontaneous("monitor", &failed, 0.7, &routes)
                .await
                .is_empty()
        );
    }
}
