use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::worker::WorkerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Worker returned a result with `success == true`.
    Succeeded,
    /// Worker returned a result with `success == false`.
    Failed,
    /// Worker returned an error or its task panicked.
    Faulted,
}

impl ExecutionOutcome {
    pub fn is_success(self) -> bool {
        self == ExecutionOutcome::Succeeded
    }
}

/// Per-worker counters. `total_executions` always equals
/// `successful_executions + failed_executions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerMetrics {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub average_response_time_ms: f64,
    pub last_execution: Option<DateTime<Utc>>,
    pub status: WorkerState,
    pub restart_count: u32,
    pub last_restart_cycle: Option<u64>,
}

impl Default for WorkerMetrics {
    fn default() -> Self {
        Self {
            total_executions: 0,
            successful_executions: 0,
            failed_executions: 0,
            average_response_time_ms: 0.0,
            last_execution: None,
            status: WorkerState::Idle,
            restart_count: 0,
            last_restart_cycle: None,
        }
    }
}

impl WorkerMetrics {
    pub fn mark_running(&mut self) {
        self.status = WorkerState::Running;
    }

    /// Fold one execution into the counters and the running latency average.
    pub fn record(&mut self, outcome: ExecutionOutcome, latency_ms: f64) {
        self.total_executions += 1;
        if outcome.is_success() {
            self.successful_executions += 1;
            self.status = WorkerState::Idle;
        } else {
            self.failed_executions += 1;
            self.status = WorkerState::Error;
        }

        let n = self.total_executions as f64;
        self.average_response_time_ms =
            (self.average_response_time_ms * (n - 1.0) + latency_ms) / n;
        self.last_execution = Some(Utc::now());
    }

    /// Metrics for a replacement instance: history is kept, status flips to
    /// `restarted`.
    pub fn carried_forward(&self, cycle: u64) -> Self {
        Self {
            status: WorkerState::Restarted,
            restart_count: self.restart_count + 1,
            last_restart_cycle: Some(cycle),
            ..self.clone()
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            return 0.0;
        }
        self.successful_executions as f64 / self.total_executions as f64
    }

    pub fn is_consistent(&self) -> bool {
        self.total_executions == self.successful_executions + self.failed_executions
    }
}
