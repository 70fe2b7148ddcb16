//! One round of concurrent worker execution.
//!
//! Every enabled worker is spawned at once (bounded by
//! `max_concurrent_agents`) and the cycle waits for the whole set before
//! folding results into metrics, ledgers, restarts and collaborations.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::core::events::OrchestratorEvent;
use crate::core::ledger::{Alert, Severity};
use crate::core::metrics::ExecutionOutcome;
use crate::core::worker::{Worker, WorkerContext, WorkerResult};

use super::restart::select_restarts;
use super::types::{CycleRecord, SystemStatus, WorkerOutcome};
use super::Orchestrator;

/// How many past cycles each worker sees in its context.
const RECENT_HISTORY: usize = 5;

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

impl Orchestrator {
    /// Run exactly one cycle across the enabled workers and return its record.
    pub async fn run_cycle(&self) -> CycleRecord {
        let _guard = self.cycle_lock.lock().await;
        self.run_cycle_locked().await
    }

    /// Timer entry point. Returns `None` when the scheduler was stopped while
    /// this tick waited for the cycle lock.
    pub(crate) async fn run_scheduled_cycle(&self) -> Option<CycleRecord> {
        let _guard = self.cycle_lock.lock().await;
        if !self.is_running() {
            debug!("Scheduled cycle skipped: scheduler stopped");
            return None;
        }
        Some(self.run_cycle_locked().await)
    }

    async fn run_cycle_locked(&self) -> CycleRecord {
        self.broker.spawn_dispatcher().await;

        let started_at = Utc::now();
        let clock = Instant::now();
        let config = self.config.read().await.clone();
        let cycle_number = self.current_cycle.load(Ordering::SeqCst) + 1;
        info!("Cycle {} starting", cycle_number);

        let ctx = Arc::new(WorkerContext {
            cycle_number,
            system_state: self.system_state().await,
            recent_history: self.history.lock().await.recent(RECENT_HISTORY),
            worker_parameters: serde_json::json!({
                "proactive": config.proactive_mode,
                "autonomous": config.autonomous_mode,
            }),
        });

        let targets: Vec<Arc<dyn Worker>> = {
            let mut registry = self.registry.write().await;
            let mut targets = Vec::new();
            for id in registry.ids() {
                if !config.is_enabled(&id) {
                    continue;
                }
                if let Some(entry) = registry.get_mut(&id) {
                    entry.metrics.mark_running();
                    targets.push(entry.worker.clone());
                }
            }
            targets
        };
        debug!(
            "Cycle {} dispatching {} worker(s)",
            cycle_number,
            targets.len()
        );

        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_agents.max(1)));
        let mut handles = Vec::with_capacity(targets.len());
        for worker in targets {
            let id = worker.id().to_string();
            let ctx = ctx.clone();
            let semaphore = semaphore.clone();
            handles.push((
                id,
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    let start = Instant::now();
                    let result = worker.execute(&ctx).await;
                    (result, elapsed_ms(start))
                }),
            ));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        let mut alerts = Vec::new();
        let mut successes: Vec<(String, WorkerResult)> = Vec::new();

        for (id, handle) in handles {
            let (outcome, latency_ms, message) = match handle.await {
                Ok((Ok(result), latency)) if result.success => {
                    let message = result.message.clone();
                    successes.push((id.clone(), result));
                    (ExecutionOutcome::Succeeded, latency, message)
                }
                Ok((Ok(result), latency)) => {
                    warn!("Worker [{}] reported failure: {}", id, result.message);
                    alerts.push(Alert::new(
                        Severity::Warning,
                        &id,
                        format!("Worker '{}' failed: {}", id, result.message),
                        false,
                    ));
                    (ExecutionOutcome::Failed, latency, result.message)
                }
                Ok((Err(e), latency)) => {
                    error!("Worker [{}] faulted: {}", id, e);
                    alerts.push(Alert::new(
                        Severity::Critical,
                        &id,
                        format!("Worker '{}' faulted: {}", id, e),
                        true,
                    ));
                    (ExecutionOutcome::Faulted, latency, e.to_string())
                }
                Err(join_err) => {
                    error!("Worker [{}] task aborted: {}", id, join_err);
                    alerts.push(Alert::new(
                        Severity::Critical,
                        &id,
                        format!("Worker '{}' crashed: {}", id, join_err),
                        true,
                    ));
                    (ExecutionOutcome::Faulted, elapsed_ms(clock), join_err.to_string())
                }
            };

            if let Some(entry) = self.registry.write().await.get_mut(&id) {
                entry.metrics.record(outcome, latency_ms);
            }
            outcomes.push(WorkerOutcome {
                worker_id: id,
                outcome,
                latency_ms,
                message,
            });
        }

        let flagged: Vec<String> = alerts
            .iter()
            .filter(|a| a.requires_restart)
            .map(|a| a.source_worker_id.clone())
            .collect();
        let any_fault = !flagged.is_empty();

        {
            let mut ledgers = self.ledgers.lock().await;
            for alert in alerts {
                ledgers.alerts.push(alert);
            }
            for (id, result) in &successes {
                for insight in &result.insights {
                    ledgers.record_insight(id, insight);
                }
            }
            if config.autonomous_mode {
                let applied = ledgers.process_pending_improvements();
                if applied > 0 {
                    info!("Autonomous mode applied {} improvement(s)", applied);
                }
            }
        }

        let mut restarted = Vec::new();
        if config.auto_restart && any_fault {
            let selected = {
                let registry = self.registry.read().await;
                select_restarts(config.restart_policy, &flagged, &registry, cycle_number)
            };
            if selected.len() < flagged.len() {
                info!(
                    "Restart policy deferred {} worker(s) this cycle",
                    flagged.len() - selected.len()
                );
            }
            for id in selected {
                if self.restart_worker_at(&id, cycle_number).await {
                    restarted.push(id);
                }
            }
        }

        if config.spontaneous_communication {
            for (id, result) in &successes {
                self.broker
                    .consider_spontaneous(
                        id,
                        result,
                        config.collaboration_threshold,
                        &config.collaboration_routes,
                    )
                    .await;
            }
        }

        let finished_at = Utc::now();
        self.current_cycle.store(cycle_number, Ordering::SeqCst);
        *self.last_cycle_time.lock().await = Some(finished_at);
        {
            let mut status = self.status.lock().await;
            if *status != SystemStatus::Stopped || self.is_running() {
                *status = if any_fault {
                    SystemStatus::Degraded
                } else {
                    SystemStatus::Active
                };
            }
        }

        let record = CycleRecord {
            cycle: cycle_number,
            started_at,
            finished_at,
            outcomes,
            restarted,
        };
        self.history.lock().await.push(record.clone());

        let duration_ms = clock.elapsed().as_millis() as u64;
        info!(
            "Cycle {} completed in {}ms: {} ok, {} failed, {} faulted",
            cycle_number,
            duration_ms,
            record.count(ExecutionOutcome::Succeeded),
            record.count(ExecutionOutcome::Failed),
            record.count(ExecutionOutcome::Faulted)
        );
        self.bus.publish(OrchestratorEvent::CycleCompleted {
            cycle: cycle_number,
            duration_ms,
            state: Box::new(self.system_state().await),
        });

        record
    }
}
