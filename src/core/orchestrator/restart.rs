use std::sync::Arc;

use anyhow::{Result, anyhow};
use tracing::{error, info, warn};

use crate::config::RestartPolicy;
use crate::core::events::OrchestratorEvent;
use crate::core::ledger::{Alert, Severity};
use crate::core::worker::{RegisteredWorker, Worker, WorkerFactory, WorkerRegistry};

use super::Orchestrator;

/// Choose which faulted workers get restarted this cycle. `flagged` is in
/// settle order and may repeat ids.
pub fn select_restarts(
    policy: RestartPolicy,
    flagged: &[String],
    registry: &WorkerRegistry,
    cycle: u64,
) -> Vec<String> {
    let mut unique: Vec<String> = Vec::new();
    for id in flagged {
        if !unique.contains(id) {
            unique.push(id.clone());
        }
    }

    match policy {
        RestartPolicy::RestartAll => unique,
        RestartPolicy::OnePerCycle => unique.into_iter().take(1).collect(),
        RestartPolicy::Backoff { base_cycles } => unique
            .into_iter()
            .filter(|id| {
                let Some(entry) = registry.get(id) else {
                    return false;
                };
                let m = &entry.metrics;
                match (m.restart_count, m.last_restart_cycle) {
                    (0, _) | (_, None) => true,
                    (count, Some(last)) => {
                        let exp = (count - 1).min(32);
                        let window = base_cycles.saturating_mul(1u64 << exp);
                        cycle.saturating_sub(last) >= window
                    }
                }
            })
            .collect(),
    }
}

async fn build_replacement(
    id: &str,
    factory: Option<&Arc<dyn WorkerFactory>>,
) -> Result<Arc<dyn Worker>> {
    let factory = factory.ok_or_else(|| anyhow!("no factory registered for worker '{}'", id))?;
    let worker = factory.build().await?;
    if worker.id() != id {
        return Err(anyhow!(
            "factory for '{}' built a worker with id '{}'",
            id,
            worker.id()
        ));
    }
    worker.initialize().await?;
    Ok(worker)
}

impl Orchestrator {
    /// Replace a worker with a fresh instance, keeping its metrics history.
    /// Failures are reported as a critical alert, never as an error.
    pub async fn restart_worker(&self, id: &str) -> bool {
        self.restart_worker_at(id, self.current_cycle()).await
    }

    pub(crate) async fn restart_worker_at(&self, id: &str, cycle: u64) -> bool {
        // The old instance is only dereferenced; anything it still has in
        // flight runs to completion on its own.
        let (slot, previous) = {
            let mut registry = self.registry.write().await;
            let Some(slot) = registry.position(id) else {
                warn!("Restart requested for unknown worker [{}]", id);
                return false;
            };
            match registry.remove(id) {
                Some(previous) => (slot, previous),
                None => return false,
            }
        };

        match build_replacement(id, previous.factory.as_ref()).await {
            Ok(worker) => {
                let entry = RegisteredWorker {
                    worker,
                    factory: previous.factory.clone(),
                    metrics: previous.metrics.carried_forward(cycle),
                };
                if !self.registry.write().await.insert_at(slot, entry) {
                    warn!("Worker [{}] was re-registered during restart", id);
                }
                info!("Worker [{}] restarted", id);
                self.ledgers.lock().await.alerts.push(Alert::new(
                    Severity::Info,
                    id,
                    format!("Worker '{}' restarted", id),
                    false,
                ));
                self.bus.publish(OrchestratorEvent::WorkerRestarted {
                    worker_id: id.to_string(),
                    success: true,
                });
                true
            }
            Err(e) => {
                error!("Worker [{}] restart failed: {}", id, e);
                if !self.registry.write().await.insert_at(slot, previous) {
                    warn!("Worker [{}] was re-registered during restart", id);
                }
                self.ledgers.lock().await.alerts.push(Alert::new(
                    Severity::Critical,
                    id,
                    format!("Worker '{}' restart failed: {}", id, e),
                    false,
                ));
                self.bus.publish(OrchestratorEvent::WorkerRestarted {
                    worker_id: id.to_string(),
                    success: false,
                });
                false
            }
        }
    }
}
