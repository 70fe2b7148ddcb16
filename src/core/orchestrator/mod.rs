//! The long-lived orchestrator handle: worker registry, ledgers, cycle
//! history and the status surface consumed by the host application.
//!
//! Construct one [`Orchestrator`] per process and share it as an `Arc`.
//! Cycle execution lives in [`cycle`], restarts in [`restart`].

mod cycle;
mod restart;
pub mod types;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock, broadcast};
use tracing::{info, warn};

use crate::config::{ConfigPatch, OrchestratorConfig};
use crate::core::collaboration::{CollaborationBroker, CollaborationEvent};
use crate::core::events::{EventBus, OrchestratorEvent};
use crate::core::ledger::{BoundedLedger, Ledgers};
use crate::core::worker::{Worker, WorkerFactory, WorkerInfo, WorkerRegistry};

pub use restart::select_restarts;
pub use types::{CycleRecord, SystemState, SystemStatus, WorkerOutcome};

pub struct Orchestrator {
    config: RwLock<OrchestratorConfig>,
    registry: Arc<RwLock<WorkerRegistry>>,
    ledgers: Mutex<Ledgers>,
    history: Mutex<BoundedLedger<CycleRecord>>,
    broker: Arc<CollaborationBroker>,
    bus: EventBus,
    current_cycle: AtomicU64,
    running: AtomicBool,
    initialized: AtomicBool,
    status: Mutex<SystemStatus>,
    last_cycle_time: Mutex<Option<DateTime<Utc>>>,
    /// Serializes cycles so overlapping timer ticks never interleave.
    pub(crate) cycle_lock: Mutex<()>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        let bus = EventBus::default();
        let registry = Arc::new(RwLock::new(WorkerRegistry::new()));
        let broker = Arc::new(CollaborationBroker::new(
            registry.clone(),
            bus.clone(),
            config.ledger_capacity,
            config.collaboration_queue_capacity,
        ));
        Self {
            ledgers: Mutex::new(Ledgers::new(config.ledger_capacity)),
            history: Mutex::new(BoundedLedger::new(config.history_capacity)),
            config: RwLock::new(config),
            registry,
            broker,
            bus,
            current_cycle: AtomicU64::new(0),
            running: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            status: Mutex::new(SystemStatus::Initializing),
            last_cycle_time: Mutex::new(None),
            cycle_lock: Mutex::new(()),
        }
    }

    /// One-time setup that needs a runtime: starts the collaboration
    /// dispatcher and marks the system active. Cycles and explicit
    /// collaborations start the dispatcher on their own if this was skipped.
    /// Returns false if already initialized.
    pub async fn initialize(&self) -> bool {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.broker.spawn_dispatcher().await;
        *self.status.lock().await = SystemStatus::Active;
        info!(
            "Orchestrator initialized with {} worker(s)",
            self.registry.read().await.len()
        );
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    // --- Registry ---

    pub async fn register_worker(&self, worker: Arc<dyn Worker>) -> bool {
        self.registry.write().await.register(worker)
    }

    pub async fn register_worker_with_factory(
        &self,
        worker: Arc<dyn Worker>,
        factory: Arc<dyn WorkerFactory>,
    ) -> bool {
        self.registry
            .write()
            .await
            .register_with_factory(worker, factory)
    }

    pub async fn unregister_worker(&self, id: &str) -> bool {
        self.registry.write().await.unregister(id)
    }

    pub async fn worker(&self, id: &str) -> Option<WorkerInfo> {
        self.registry.read().await.get(id).map(|e| e.info())
    }

    /// Every registered worker, enabled or not.
    pub async fn active_agents(&self) -> Vec<WorkerInfo> {
        self.registry.read().await.infos()
    }

    // --- Status surface ---

    pub fn current_cycle(&self) -> u64 {
        self.current_cycle.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Flipped by the scheduler on start/stop.
    pub(crate) async fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
        let mut status = self.status.lock().await;
        if !running {
            *status = SystemStatus::Stopped;
        } else if *status == SystemStatus::Stopped || *status == SystemStatus::Initializing {
            *status = SystemStatus::Active;
        }
    }

    pub async fn system_state(&self) -> SystemState {
        let (alerts, opportunities, auto_improvements) = {
            let ledgers = self.ledgers.lock().await;
            (
                ledgers.alerts.to_vec(),
                ledgers.opportunities.to_vec(),
                ledgers.improvements.to_vec(),
            )
        };
        SystemState {
            status: *self.status.lock().await,
            alerts,
            opportunities,
            auto_improvements,
            current_cycle: self.current_cycle(),
            is_running: self.is_running(),
            last_cycle_time: *self.last_cycle_time.lock().await,
            agent_count: self.registry.read().await.len(),
        }
    }

    pub async fn cycle_history(&self) -> Vec<CycleRecord> {
        self.history.lock().await.to_vec()
    }

    pub async fn mark_improvement_processed(&self, id: &str) -> bool {
        self.ledgers.lock().await.mark_improvement_processed(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.bus.subscribe()
    }

    // --- Collaboration ---

    pub async fn initiate_collaboration(&self, source: &str, target: &str, query: &str) -> String {
        self.broker.spawn_dispatcher().await;
        self.broker.initiate(source, target, query).await
    }

    pub async fn collaboration(&self, id: &str) -> Option<CollaborationEvent> {
        self.broker.get(id).await
    }

    pub async fn collaborations(&self) -> Vec<CollaborationEvent> {
        self.broker.list().await
    }

    // --- Configuration ---

    pub async fn config(&self) -> OrchestratorConfig {
        self.config.read().await.clone()
    }

    /// Apply a partial update. Capacity changes resize the ledgers in place.
    /// `log_level` and `collaboration_queue_capacity` are fixed at startup and
    /// ignored here.
    pub async fn update_config(&self, mut patch: ConfigPatch) -> OrchestratorConfig {
        for field in patch.take_startup_only() {
            warn!("Config field '{}' only applies at startup; ignored", field);
        }
        let updated = {
            let mut config = self.config.write().await;
            config.apply(patch);
            config.clone()
        };
        self.ledgers
            .lock()
            .await
            .set_capacity(updated.ledger_capacity);
        self.history
            .lock()
            .await
            .set_capacity(updated.history_capacity);
        self.broker.set_capacity(updated.ledger_capacity).await;
        info!("Orchestrator config updated");
        updated
    }

    pub async fn export_config(&self) -> Result<String> {
        let config = self.config.read().await;
        serde_json::to_string_pretty(&*config).context("serializing orchestrator config")
    }

    /// Import a JSON document. Fields it omits keep their current values.
    pub async fn import_config(&self, json: &str) -> Result<OrchestratorConfig> {
        let patch: ConfigPatch =
            serde_json::from_str(json).context("parsing imported orchestrator config")?;
        Ok(self.update_config(patch).await)
    }
}

#[cfg(test)]
mod tests;
