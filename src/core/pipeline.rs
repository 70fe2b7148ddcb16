//! Intensive mode: a bounded, strictly sequential pipeline that threads one
//! text context through an ordered list of roles, then condenses the result
//! with a synthesis call.
//!
//! Exactly one role runs at a time. A failing or timed-out role is recorded
//! and skipped; the next role sees the last good context. `stop` is honored
//! between roles only.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::PipelineSettings;

/// Text-in, text-out executor behind each pipeline role.
///
/// `cancel` fires when the runner gives up on the call (timeout), so
/// implementations can abort outbound requests instead of finishing them
/// for nobody.
#[async_trait]
pub trait RoleExecutor: Send + Sync {
    async fn execute_role(
        &self,
        role: &str,
        context: &str,
        cancel: CancellationToken,
    ) -> Result<String>;

    /// Condense a finished context into an executive summary.
    async fn synthesize(&self, context: &str, cancel: CancellationToken) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub roles: Vec<String>,
    pub max_cycles: usize,
    pub role_timeout: Duration,
}

impl PipelineRun {
    pub fn new(roles: Vec<String>, max_cycles: usize, role_timeout: Duration) -> Self {
        Self {
            roles,
            max_cycles,
            role_timeout,
        }
    }

    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self::new(
            settings.roles.clone(),
            settings.max_cycles,
            Duration::from_secs(settings.role_timeout_secs.max(1)),
        )
    }

    pub fn total_steps(&self) -> usize {
        self.roles.len() * self.max_cycles
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub role: String,
    pub cycle: usize,
    pub content: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    /// Synthesized summary, or the raw final context when synthesis failed.
    pub summary: String,
    pub final_context: String,
    pub synthesized: bool,
    pub cancelled: bool,
    pub cycles_completed: usize,
    pub steps: Vec<StepRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub running: bool,
    pub current_cycle: usize,
    pub completed_steps: usize,
    pub total_steps: usize,
    pub percent_complete: f64,
    pub average_step_ms: Option<f64>,
    pub estimated_remaining_ms: Option<u64>,
}

#[derive(Default)]
struct RunState {
    run: Option<PipelineRun>,
    started_at: Option<DateTime<Utc>>,
    current_cycle: usize,
    history: Vec<StepRecord>,
}

/// Clears the active flag however the run ends.
struct ActiveGuard<'a>(&'a AtomicBool);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SequentialPipelineRunner {
    executor: Arc<dyn RoleExecutor>,
    active: AtomicBool,
    stop_requested: AtomicBool,
    state: Mutex<RunState>,
}

impl SequentialPipelineRunner {
    pub fn new(executor: Arc<dyn RoleExecutor>) -> Self {
        Self {
            executor,
            active: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            state: Mutex::new(RunState::default()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Run every role once, in order, threading the context through.
    pub async fn run_cycle(&self, run: &PipelineRun, initial: &str) -> String {
        let mut context = initial.to_string();
        let cycle = self.state.lock().await.current_cycle;

        for role in &run.roles {
            if self.stop_requested.load(Ordering::SeqCst) {
                info!("Pipeline stop requested, skipping remaining roles");
                break;
            }

            let abort = CancellationToken::new();
            let call = self.executor.execute_role(role, &context, abort.clone());
            let (success, content) = match tokio::time::timeout(run.role_timeout, call).await {
                Ok(Ok(output)) => {
                    context = output.clone();
                    (true, output)
                }
                Ok(Err(e)) => {
                    warn!("Pipeline role [{}] failed: {}", role, e);
                    (false, format!("ERROR: {}", e))
                }
                Err(_) => {
                    abort.cancel();
                    warn!(
                        "Pipeline role [{}] timed out after {}ms",
                        role,
                        run.role_timeout.as_millis()
                    );
                    (
                        false,
                        format!(
                            "ERROR: role '{}' timed out after {}ms",
                            role,
                            run.role_timeout.as_millis()
                        ),
                    )
                }
            };

            info!(
                "Pipeline cycle {} role [{}] {}",
                cycle,
                role,
                if success { "completed" } else { "failed" }
            );
            self.state.lock().await.history.push(StepRecord {
                role: role.clone(),
                cycle,
                content,
                success,
                timestamp: Utc::now(),
            });
        }

        context
    }

    /// Run up to `max_cycles` cycles and synthesize. Fails only when another
    /// run is already active on this runner.
    pub async fn start(&self, run: PipelineRun, initial: &str) -> Result<PipelineOutcome> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            bail!("a pipeline run is already active on this runner");
        }
        let _active = ActiveGuard(&self.active);
        self.stop_requested.store(false, Ordering::SeqCst);
        {
            let mut state = self.state.lock().await;
            *state = RunState {
                run: Some(run.clone()),
                started_at: Some(Utc::now()),
                current_cycle: 0,
                history: Vec::new(),
            };
        }
        info!(
            "Pipeline starting: {} role(s) x {} cycle(s)",
            run.roles.len(),
            run.max_cycles
        );

        let mut context = initial.to_string();
        let mut cycles_completed = 0;
        for cycle in 1..=run.max_cycles {
            if self.stop_requested.load(Ordering::SeqCst) {
                break;
            }
            self.state.lock().await.current_cycle = cycle;
            context = self.run_cycle(&run, &context).await;
            if self.stop_requested.load(Ordering::SeqCst) {
                break;
            }
            cycles_completed += 1;
        }
        let cancelled = self.stop_requested.load(Ordering::SeqCst);

        let (summary, synthesized) = match self.synthesize(&run, &context).await {
            Ok(summary) => (summary, true),
            Err(e) => {
                warn!("Pipeline synthesis failed, returning raw context: {}", e);
                (context.clone(), false)
            }
        };

        let steps = self.state.lock().await.history.clone();
        info!(
            "Pipeline finished: {} step(s), cancelled={}, synthesized={}",
            steps.len(),
            cancelled,
            synthesized
        );
        Ok(PipelineOutcome {
            summary,
            final_context: context,
            synthesized,
            cancelled,
            cycles_completed,
            steps,
        })
    }

    async fn synthesize(&self, run: &PipelineRun, context: &str) -> Result<String> {
        let abort = CancellationToken::new();
        match tokio::time::timeout(
            run.role_timeout,
            self.executor.synthesize(context, abort.clone()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                abort.cancel();
                Err(anyhow!("synthesis timed out"))
            }
        }
    }

    /// Ask the active run to end after its current role.
    pub fn stop(&self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.stop_requested.store(true, Ordering::SeqCst);
        info!("Pipeline stop requested");
        true
    }

    pub async fn history(&self) -> Vec<StepRecord> {
        self.state.lock().await.history.clone()
    }

    pub async fn status(&self) -> PipelineStatus {
        let state = self.state.lock().await;
        let total_steps = state.run.as_ref().map(PipelineRun::total_steps).unwrap_or(0);
        let completed_steps = state.history.len();
        let percent_complete = if total_steps == 0 {
            0.0
        } else {
            completed_steps as f64 / total_steps as f64 * 100.0
        };

        // Consecutive gaps run started_at → step 1 → ... → step n, so their
        // mean is the whole span over n.
        let average_step_ms = match (state.started_at, state.history.last()) {
            (Some(start), Some(last)) => {
                let span = (last.timestamp - start).num_milliseconds().max(0) as f64;
                Some(span / completed_steps as f64)
            }
            _ => None,
        };
        let remaining = total_steps.saturating_sub(completed_steps);
        let estimated_remaining_ms = average_step_ms.map(|avg| (avg * remaining as f64) as u64);

        PipelineStatus {
            running: self.is_active(),
            current_cycle: state.current_cycle,
            completed_steps,
            total_steps,
            percent_complete,
            average_step_ms,
            estimated_remaining_ms,
        }
    }
}
