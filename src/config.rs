use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// How many flagged workers a single cycle may restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Restart every worker that faulted this cycle.
    RestartAll,
    /// Restart only the first faulted worker; the rest wait for a later cycle.
    #[default]
    OnePerCycle,
    /// Restart every faulted worker whose backoff window has elapsed. After
    /// `k` restarts a worker waits `base_cycles * 2^(k-1)` cycles.
    Backoff { base_cycles: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub cycle_duration_minutes: u64,
    /// Workers driven each cycle. Empty means every registered worker.
    pub enabled_agents: Vec<String>,
    pub auto_restart: bool,
    pub max_concurrent_agents: usize,
    /// Read once when the logger is installed at startup.
    pub log_level: String,
    pub proactive_mode: bool,
    pub autonomous_mode: bool,
    pub spontaneous_communication: bool,
    pub restart_policy: RestartPolicy,
    pub ledger_capacity: usize,
    pub history_capacity: usize,
    pub collaboration_threshold: f64,
    /// Insight type → candidate collaborator ids, in preference order.
    pub collaboration_routes: BTreeMap<String, Vec<String>>,
    /// Size of the collaboration queue, fixed when the orchestrator is built.
    pub collaboration_queue_capacity: usize,
}

fn default_routes() -> BTreeMap<String, Vec<String>> {
    let mut routes = BTreeMap::new();
    routes.insert(
        "opportunity".to_string(),
        vec!["analyst".to_string(), "planner".to_string()],
    );
    routes.insert(
        "risk".to_string(),
        vec!["monitor".to_string(), "analyst".to_string()],
    );
    routes.insert("improvement".to_string(), vec!["optimizer".to_string()]);
    routes.insert("trend".to_string(), vec!["analyst".to_string()]);
    routes
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cycle_duration_minutes: 30,
            enabled_agents: Vec::new(),
            auto_restart: true,
            max_concurrent_agents: 5,
            log_level: "info".to_string(),
            proactive_mode: true,
            autonomous_mode: false,
            spontaneous_communication: true,
            restart_policy: RestartPolicy::default(),
            ledger_capacity: 100,
            history_capacity: 50,
            collaboration_threshold: 0.7,
            collaboration_routes: default_routes(),
            collaboration_queue_capacity: 64,
        }
    }
}

/// Longest timer period the scheduler will arm: one year.
pub const MAX_CYCLE_MINUTES: u64 = 60 * 24 * 365;

impl OrchestratorConfig {
    /// Cycle period clamped to between one minute and [`MAX_CYCLE_MINUTES`].
    pub fn cycle_interval(&self) -> Duration {
        let minutes = self.cycle_duration_minutes.clamp(1, MAX_CYCLE_MINUTES);
        Duration::from_secs(minutes * 60)
    }

    pub fn is_enabled(&self, worker_id: &str) -> bool {
        self.enabled_agents.is_empty() || self.enabled_agents.iter().any(|id| id == worker_id)
    }

    /// Apply every field present in `patch`; absent fields keep their value.
    pub fn apply(&mut self, patch: ConfigPatch) {
        if let Some(v) = patch.cycle_duration_minutes {
            self.cycle_duration_minutes = v;
        }
        if let Some(v) = patch.enabled_agents {
            self.enabled_agents = v;
        }
        if let Some(v) = patch.auto_restart {
            self.auto_restart = v;
        }
        if let Some(v) = patch.max_concurrent_agents {
            self.max_concurrent_agents = v;
        }
        if let Some(v) = patch.log_level {
            self.log_level = v;
        }
        if let Some(v) = patch.proactive_mode {
            self.proactive_mode = v;
        }
        if let Some(v) = patch.autonomous_mode {
            self.autonomous_mode = v;
        }
        if let Some(v) = patch.spontaneous_communication {
            self.spontaneous_communication = v;
        }
        if let Some(v) = patch.restart_policy {
            self.restart_policy = v;
        }
        if let Some(v) = patch.ledger_capacity {
            self.ledger_capacity = v;
        }
        if let Some(v) = patch.history_capacity {
            self.history_capacity = v;
        }
        if let Some(v) = patch.collaboration_threshold {
            self.collaboration_threshold = v;
        }
        if let Some(v) = patch.collaboration_routes {
            self.collaboration_routes = v;
        }
        if let Some(v) = patch.collaboration_queue_capacity {
            self.collaboration_queue_capacity = v;
        }
    }
}

/// Partial update of [`OrchestratorConfig`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub cycle_duration_minutes: Option<u64>,
    pub enabled_agents: Option<Vec<String>>,
    pub auto_restart: Option<bool>,
    pub max_concurrent_agents: Option<usize>,
    pub log_level: Option<String>,
    pub proactive_mode: Option<bool>,
    pub autonomous_mode: Option<bool>,
    pub spontaneous_communication: Option<bool>,
    pub restart_policy: Option<RestartPolicy>,
    pub ledger_capacity: Option<usize>,
    pub history_capacity: Option<usize>,
    pub collaboration_threshold: Option<f64>,
    pub collaboration_routes: Option<BTreeMap<String, Vec<String>>>,
    pub collaboration_queue_capacity: Option<usize>,
}

impl ConfigPatch {
    /// Clear the fields a running orchestrator cannot honour and return
    /// their names.
    pub fn take_startup_only(&mut self) -> Vec<&'static str> {
        let mut taken = Vec::new();
        if self.log_level.take().is_some() {
            taken.push("log_level");
        }
        if self.collaboration_queue_capacity.take().is_some() {
            taken.push("collaboration_queue_capacity");
        }
        taken
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// OpenAI-format chat completions endpoint.
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

impl LlmSettings {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub roles: Vec<String>,
    pub max_cycles: usize,
    pub role_timeout_secs: u64,
    /// Per-role instructions handed to the role executor.
    pub instructions: BTreeMap<String, String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            roles: vec![
                "researcher".to_string(),
                "analyst".to_string(),
                "critic".to_string(),
            ],
            max_cycles: 1,
            role_timeout_secs: 120,
            instructions: BTreeMap::new(),
        }
    }
}

/// A worker declared in the config file, backed by the LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: String,
}

/// Contents of `cadence.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub orchestrator: OrchestratorConfig,
    pub llm: LlmSettings,
    pub pipeline: PipelineSettings,
    pub workers: Vec<WorkerSpec>,
}

pub const DEFAULT_CONFIG_FILE: &str = "cadence.toml";

impl AppConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn summary(&self) -> String {
        format!(
            "workers={}, cycle={}m, roles={:?}",
            self.workers.len(),
            self.orchestrator.cycle_duration_minutes,
            self.pipeline.roles
        )
    }
}
