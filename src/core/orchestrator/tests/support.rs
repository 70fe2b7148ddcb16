use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::config::OrchestratorConfig;
use crate::core::orchestrator::Orchestrator;
use crate::core::worker::{Worker, WorkerContext, WorkerFactory, WorkerResult};

#[derive(Clone)]
pub(super) enum Script {
    Succeed(WorkerResult),
    SoftFail,
    Fault,
    Panic,
}

/// Tracks how many workers are inside `execute` at once.
#[derive(Default)]
pub(super) struct Gauge {
    current: AtomicUsize,
    pub peak: AtomicUsize,
}

pub(super) struct ScriptedWorker {
    id: String,
    script: Script,
    pub calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
    gauge: Option<Arc<Gauge>>,
}

impl ScriptedWorker {
    pub fn new(id: &str, script: Script) -> Self {
        Self {
            id: id.to_string(),
            script,
            calls: Arc::new(AtomicUsize::new(0)),
            delay: None,
            gauge: None,
        }
    }

    pub fn ok(id: &str) -> Self {
        Self::new(id, Script::Succeed(WorkerResult::ok("done")))
    }

    pub fn with_delay(mut self, delay: Duration, gauge: Arc<Gauge>) -> Self {
        self.delay = Some(delay);
        self.gauge = Some(gauge);
        self
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.id
    }

    async fn execute(&self, _ctx: &WorkerContext) -> Result<WorkerResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref gauge) = self.gauge {
            let now = gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
            gauge.peak.fetch_max(now, Ordering::SeqCst);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(ref gauge) = self.gauge {
            gauge.current.fetch_sub(1, Ordering::SeqCst);
        }
        match &self.script {
            Script::Succeed(result) => Ok(result.clone()),
            Script::SoftFail => Ok(WorkerResult::failed("source unavailable")),
            Script::Fault => Err(anyhow!("connection reset")),
            Script::Panic => panic!("worker blew up"),
        }
    }

    async fn provide_assistance(&self, from: &str, query: &str) -> Result<serde_json::Value> {
        Ok(serde_json::json!({ "from": from, "query": query, "by": self.id }))
    }
}

pub(super) struct ScriptedFactory {
    pub id: String,
    pub script: Script,
    pub fail: bool,
    pub builds: Arc<AtomicUsize>,
}

impl ScriptedFactory {
    pub fn new(id: &str, script: Script) -> Self {
        Self {
            id: id.to_string(),
            script,
            fail: false,
            builds: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(id: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(id, Script::Fault)
        }
    }
}

#[async_trait]
impl WorkerFactory for ScriptedFactory {
    async fn build(&self) -> Result<Arc<dyn Worker>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("credentials expired"));
        }
        Ok(Arc::new(ScriptedWorker::new(&self.id, self.script.clone())))
    }
}

pub(super) fn quiet_config() -> OrchestratorConfig {
    OrchestratorConfig {
        spontaneous_communication: false,
        ..Default::default()
    }
}

pub(super) async fn orchestrator_with(
    config: OrchestratorConfig,
    workers: Vec<ScriptedWorker>,
) -> Orchestrator {
    let orch = Orchestrator::new(config);
    for w in workers {
        assert!(orch.register_worker(Arc::new(w)).await);
    }
    orch
}

pub(super) async fn register_faulty(orch: &Orchestrator, id: &str) -> Arc<AtomicUsize> {
    let factory = ScriptedFactory::new(id, Script::Fault);
    let builds = factory.builds.clone();
    assert!(
        orch.register_worker_with_factory(
            Arc::new(ScriptedWorker::new(id, Script::Fault)),
            Arc::new(factory),
        )
        .await
    );
    builds
}
