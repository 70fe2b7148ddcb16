//! Worker contract: the capability surface the orchestrator drives each cycle.
//!
//! A worker is opaque to the core beyond `execute` and `provide_assistance`.
//! Its result payload (`data`) is carried as a `serde_json::Value` and never
//! inspected here.

pub mod registry;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::orchestrator::types::{CycleRecord, SystemState};

pub use registry::{RegisteredWorker, WorkerRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Running,
    Error,
    Restarted,
}

impl WorkerState {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerState::Idle => "idle",
            WorkerState::Running => "running",
            WorkerState::Error => "error",
            WorkerState::Restarted => "restarted",
        }
    }
}

/// Everything a worker sees when the cycle invokes it.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerContext {
    pub cycle_number: u64,
    pub system_state: SystemState,
    pub recent_history: Vec<CycleRecord>,
    pub worker_parameters: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerResult {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub insights: Vec<Insight>,
    #[serde(default)]
    pub action_items: Vec<String>,
    #[serde(default)]
    pub learnings: Vec<String>,
}

impl WorkerResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_insight(mut self, kind: &str, content: &str, confidence: f64) -> Self {
        self.insights.push(Insight {
            kind: kind.to_string(),
            content: content.to_string(),
            confidence,
        });
        self
    }
}

/// A named unit of capability driven once per cycle.
#[async_trait]
pub trait Worker: Send + Sync {
    fn id(&self) -> &str;

    fn display_name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Called once before a freshly built worker is put into the registry.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Run one cycle's worth of work. `Ok` with `success == false` is a soft
    /// failure; `Err` is a fault and makes the worker a restart candidate.
    async fn execute(&self, ctx: &WorkerContext) -> Result<WorkerResult>;

    /// Answer a collaboration request from another worker.
    async fn provide_assistance(&self, requesting_worker: &str, query: &str)
    -> Result<serde_json::Value>;
}

/// Builds replacement instances for a worker id when it has to be restarted.
#[async_trait]
pub trait WorkerFactory: Send + Sync {
    async fn build(&self) -> Result<Arc<dyn Worker>>;
}

/// Serializable view of a registered worker for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerInfo {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub state: WorkerState,
    pub metrics: crate::core::metrics::WorkerMetrics,
}
