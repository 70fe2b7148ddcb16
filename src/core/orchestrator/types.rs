use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::ledger::{Alert, Improvement, Opportunity};
use crate::core::metrics::ExecutionOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    Initializing,
    Active,
    Degraded,
    Stopped,
}

impl SystemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SystemStatus::Initializing => "initializing",
            SystemStatus::Active => "active",
            SystemStatus::Degraded => "degraded",
            SystemStatus::Stopped => "stopped",
        }
    }
}

/// Snapshot handed to workers and to status consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemState {
    pub status: SystemStatus,
    pub alerts: Vec<Alert>,
    pub opportunities: Vec<Opportunity>,
    pub auto_improvements: Vec<Improvement>,
    pub current_cycle: u64,
    pub is_running: bool,
    pub last_cycle_time: Option<DateTime<Utc>>,
    pub agent_count: usize,
}

impl Default for SystemState {
    fn default() -> Self {
        Self {
            status: SystemStatus::Initializing,
            alerts: Vec::new(),
            opportunities: Vec::new(),
            auto_improvements: Vec::new(),
            current_cycle: 0,
            is_running: false,
            last_cycle_time: None,
            agent_count: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerOutcome {
    pub worker_id: String,
    pub outcome: ExecutionOutcome,
    pub latency_ms: f64,
    pub message: String,
}

/// One settled cycle. Never mutated after it is appended to history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleRecord {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<WorkerOutcome>,
    pub restarted: Vec<String>,
}

impl CycleRecord {
    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }

    pub fn count(&self, outcome: ExecutionOutcome) -> usize {
        self.outcomes.iter().filter(|o| o.outcome == outcome).count()
    }
}
