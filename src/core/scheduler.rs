//! Periodic driver for [`Orchestrator::run_cycle`].
//!
//! `stopped → running → stopped`. Starting runs one cycle right away and
//! then arms a repeated job on a `tokio_cron_scheduler::JobScheduler`.
//! Stopping removes the job; a cycle already in flight finishes normally.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

use crate::core::orchestrator::{CycleRecord, Orchestrator};

#[derive(Default)]
struct TimerSlot {
    scheduler: Option<JobScheduler>,
    job_id: Option<uuid::Uuid>,
}

pub struct CycleScheduler {
    orchestrator: Arc<Orchestrator>,
    timer: Mutex<TimerSlot>,
}

impl CycleScheduler {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            timer: Mutex::new(TimerSlot::default()),
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn is_running(&self) -> bool {
        self.orchestrator.is_running()
    }

    /// Returns `Ok(false)` without side effects if already running.
    pub async fn start(&self) -> Result<bool> {
        {
            let _slot = self.timer.lock().await;
            if self.orchestrator.is_running() {
                return Ok(false);
            }
            self.orchestrator.initialize().await;
            self.orchestrator.set_running(true).await;
        }
        info!("Cycle scheduler starting");

        self.orchestrator.run_cycle().await;

        let mut slot = self.timer.lock().await;
        if !self.orchestrator.is_running() {
            // stop() landed during the first cycle; nothing to arm.
            return Ok(true);
        }
        if let Err(e) = self.arm(&mut slot).await {
            self.orchestrator.set_running(false).await;
            return Err(e);
        }
        Ok(true)
    }

    async fn arm(&self, slot: &mut TimerSlot) -> Result<()> {
        let interval = self.orchestrator.config().await.cycle_interval();
        let scheduler = match slot.scheduler.clone() {
            Some(s) => s,
            None => {
                let s = JobScheduler::new().await?;
                s.start().await?;
                slot.scheduler = Some(s.clone());
                s
            }
        };

        let orch = self.orchestrator.clone();
        let job = Job::new_repeated_async(interval, move |_uuid, _l| {
            let orch = orch.clone();
            Box::pin(async move {
                if orch.is_running() {
                    orch.run_scheduled_cycle().await;
                }
            })
        })?;
        let job_id = scheduler.add(job).await?;
        slot.job_id = Some(job_id);
        info!("Cycle timer armed every {}s", interval.as_secs());
        Ok(())
    }

    /// Returns false if not running. Future ticks are cancelled; the current
    /// cycle, if any, is left to finish.
    pub async fn stop(&self) -> bool {
        let mut slot = self.timer.lock().await;
        if !self.orchestrator.is_running() {
            return false;
        }
        self.orchestrator.set_running(false).await;
        let job_id = slot.job_id.take();
        if let (Some(scheduler), Some(job_id)) = (slot.scheduler.as_ref(), job_id)
            && let Err(e) = scheduler.remove(&job_id).await
        {
            warn!("Failed to remove cycle timer: {}", e);
        }
        info!("Cycle scheduler stopped");
        true
    }

    /// Run one cycle now, whatever the timer state.
    pub async fn execute_manual_cycle(&self) -> CycleRecord {
        if !self.orchestrator.is_initialized() {
            self.orchestrator.initialize().await;
        }
        info!("Manual cycle requested");
        self.orchestrator.run_cycle().await
    }
}
