use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use cadence::config::AppConfig;
use cadence::core::events::OrchestratorEvent;
use cadence::core::llm::{LlmProvider, LlmRoleExecutor, LlmWorkerFactory, OpenAiCompatibleProvider};
use cadence::core::orchestrator::Orchestrator;
use cadence::core::pipeline::{PipelineRun, SequentialPipelineRunner};
use cadence::core::scheduler::CycleScheduler;
use cadence::core::terminal::{
    print_cycle, print_goodbye, print_info, print_pipeline_outcome, print_status, print_step,
    print_success, print_system_state, print_warn, print_workers,
};
use cadence::core::worker::WorkerFactory;
use cadence::logging::init_logging;

use super::CommandArgs;

async fn load(args: &CommandArgs) -> Result<AppConfig> {
    let found = Path::new(&args.config_path).exists();
    let config = AppConfig::load(&args.config_path).await?;
    init_logging(&config.orchestrator.log_level);
    if found {
        info!("Loaded config: {}", config.summary());
    } else {
        info!("No {} found, using default configuration.", args.config_path);
    }
    Ok(config)
}

fn provider(config: &AppConfig) -> Arc<dyn LlmProvider> {
    if config.llm.api_key().is_none() {
        print_warn(&format!(
            "{} is not set; model calls go out without an API key.",
            config.llm.api_key_env
        ));
    }
    Arc::new(OpenAiCompatibleProvider::from_settings(&config.llm))
}

async fn build_orchestrator(config: &AppConfig) -> Result<Arc<Orchestrator>> {
    let orch = Arc::new(Orchestrator::new(config.orchestrator.clone()));
    if config.workers.is_empty() {
        print_warn("No [[workers]] configured; cycles will have nothing to run.");
        return Ok(orch);
    }

    let provider = provider(config);
    for spec in &config.workers {
        let factory = Arc::new(LlmWorkerFactory::new(
            spec.clone(),
            config.llm.model.clone(),
            provider.clone(),
        ));
        let worker = factory.build().await?;
        worker.initialize().await?;
        if !orch.register_worker_with_factory(worker, factory).await {
            print_warn(&format!("Duplicate worker id '{}' skipped.", spec.id));
        }
    }
    info!("Registered {} worker(s)", orch.active_agents().await.len());
    Ok(orch)
}

pub(super) async fn run(args: &CommandArgs) -> Result<()> {
    let config = load(args).await?;
    let orch = build_orchestrator(&config).await?;

    let mut events = orch.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(OrchestratorEvent::CycleCompleted {
                    cycle, duration_ms, ..
                }) => print_info(&format!("Cycle {} completed in {}ms", cycle, duration_ms)),
                Ok(OrchestratorEvent::WorkerRestarted { worker_id, success }) => {
                    if success {
                        print_success(&format!("Worker '{}' restarted", worker_id));
                    } else {
                        print_warn(&format!("Worker '{}' could not be restarted", worker_id));
                    }
                }
                Ok(OrchestratorEvent::CollaborationCompleted { collaboration }) => print_status(
                    "Collaboration",
                    &format!(
                        "{} -> {} {}",
                        collaboration.source_worker_id,
                        collaboration.target_worker_id,
                        collaboration.status.as_str()
                    ),
                ),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let scheduler = CycleScheduler::new(orch.clone());
    scheduler.start().await?;
    print_success(&format!(
        "Scheduler running every {} minute(s). Press Ctrl-C to stop.",
        config.orchestrator.cycle_duration_minutes.max(1)
    ));

    tokio::signal::ctrl_c().await?;
    scheduler.stop().await;
    printer.abort();
    print_system_state(&orch.system_state().await);
    print_workers(&orch.active_agents().await);
    print_goodbye();
    Ok(())
}

pub(super) async fn cycle(args: &CommandArgs) -> Result<()> {
    let config = load(args).await?;
    let orch = build_orchestrator(&config).await?;
    let scheduler = CycleScheduler::new(orch.clone());

    let record = scheduler.execute_manual_cycle().await;
    print_cycle(&record);
    let state = orch.system_state().await;
    print_system_state(&state);
    print_workers(&orch.active_agents().await);
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

pub(super) async fn pipeline(args: &CommandArgs) -> Result<()> {
    let config = load(args).await?;
    let mut run = PipelineRun::from_settings(&config.pipeline);
    if let Some(cycles) = args.cycles {
        run.max_cycles = cycles;
    }
    let executor = LlmRoleExecutor::from_settings(
        provider(&config),
        config.llm.model.clone(),
        &config.pipeline,
    );
    let runner = Arc::new(SequentialPipelineRunner::new(Arc::new(executor)));

    let stopper = runner.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            print_warn("Stopping after the current role...");
            stopper.stop();
        }
    });

    print_step(&format!(
        "Running {} role(s) x {} cycle(s)",
        run.roles.len(),
        run.max_cycles
    ));
    let outcome = runner.start(run, &args.prompt).await?;
    watcher.abort();
    print_pipeline_outcome(&outcome);
    Ok(())
}

pub(super) async fn config(args: &CommandArgs) -> Result<()> {
    let config = load(args).await?;
    let orch = Orchestrator::new(config.orchestrator.clone());
    println!("{}", orch.export_config().await?);
    Ok(())
}
