use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::config::{OrchestratorConfig, RestartPolicy};
use crate::core::ledger::Severity;
use crate::core::metrics::{ExecutionOutcome, WorkerMetrics};
use crate::core::orchestrator::{Orchestrator, select_restarts};
use crate::core::worker::{RegisteredWorker, WorkerRegistry, WorkerState};

use super::support::{
    Script, ScriptedFactory, ScriptedWorker, orchestrator_with, quiet_config, register_faulty,
};

#[tokio::test]
async fn faulting_worker_is_restarted_with_history() {
    let orch = Orchestrator::new(quiet_config());
    let builds = register_faulty(&orch, "flaky").await;

    orch.run_cycle().await;

    let state = orch.system_state().await;
    assert!(
        state
            .alerts
            .iter()
            .any(|a| a.source_worker_id == "flaky" && a.requires_restart)
    );
    assert!(
        state
            .alerts
            .iter()
            .any(|a| a.severity == Severity::Info && a.message.contains("restarted"))
    );

    let info = orch.worker("flaky").await.unwrap();
    assert_eq!(info.state, WorkerState::Restarted);
    assert_eq!(info.metrics.total_executions, 1);
    assert_eq!(info.metrics.failed_executions, 1);
    assert_eq!(info.metrics.restart_count, 1);
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert_eq!(orch.cycle_history().await[0].restarted, vec!["flaky"]);
}

#[tokio::test]
async fn manual_restart_preserves_five_executions() {
    let orch = Orchestrator::new(OrchestratorConfig {
        auto_restart: false,
        ..quiet_config()
    });
    register_faulty(&orch, "w").await;
    for _ in 0..5 {
        orch.run_cycle().await;
    }
    assert_eq!(orch.worker("w").await.unwrap().state, WorkerState::Error);

    assert!(orch.restart_worker("w").await);
    let info = orch.worker("w").await.unwrap();
    assert_eq!(info.metrics.total_executions, 5);
    assert_eq!(info.metrics.status, WorkerState::Restarted);
    assert!(info.metrics.is_consistent());
}

#[tokio::test]
async fn one_per_cycle_restarts_only_the_first_flagged() {
    let orch = Orchestrator::new(quiet_config());
    let first = register_faulty(&orch, "first").await;
    let second = register_faulty(&orch, "second").await;

    let record = orch.run_cycle().await;
    assert_eq!(record.restarted, vec!["first"]);
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 0);
    assert_eq!(
        orch.worker("second").await.unwrap().state,
        WorkerState::Error
    );
}

#[tokio::test]
async fn restart_all_policy_restarts_every_flagged_worker() {
    let orch = Orchestrator::new(OrchestratorConfig {
        restart_policy: RestartPolicy::RestartAll,
        ..quiet_config()
    });
    register_faulty(&orch, "first").await;
    register_faulty(&orch, "second").await;

    let record = orch.run_cycle().await;
    assert_eq!(record.restarted, vec!["first", "second"]);
}

#[tokio::test]
async fn auto_restart_off_leaves_workers_alone() {
    let orch = Orchestrator::new(OrchestratorConfig {
        auto_restart: false,
        ..quiet_config()
    });
    let builds = register_faulty(&orch, "w").await;
    orch.run_cycle().await;
    assert_eq!(builds.load(Ordering::SeqCst), 0);
    assert_eq!(orch.worker("w").await.unwrap().state, WorkerState::Error);
}

#[tokio::test]
async fn failed_rebuild_raises_critical_alert_and_keeps_worker() {
    let orch = Orchestrator::new(quiet_config());
    assert!(
        orch.register_worker_with_factory(
            Arc::new(ScriptedWorker::new("w", Script::Fault)),
            Arc::new(ScriptedFactory::failing("w")),
        )
        .await
    );

    orch.run_cycle().await;

    let info = orch.worker("w").await.expect("worker stays registered");
    assert_eq!(info.state, WorkerState::Error);
    assert_eq!(info.metrics.restart_count, 0);
    let state = orch.system_state().await;
    assert!(state.alerts.iter().any(|a| {
        a.severity == Severity::Critical
            && !a.requires_restart
            && a.message.contains("credentials expired")
    }));
}

#[tokio::test]
async fn restart_without_factory_fails_softly() {
    let orch = orchestrator_with(quiet_config(), vec![ScriptedWorker::ok("plain")]).await;
    assert!(!orch.restart_worker("plain").await);
    assert!(orch.worker("plain").await.is_some());
    assert!(!orch.restart_worker("missing").await);
}

fn registry_with(id: &str, metrics: WorkerMetrics) -> WorkerRegistry {
    let mut reg = WorkerRegistry::new();
    reg.insert(RegisteredWorker {
        worker: Arc::new(ScriptedWorker::ok(id)),
        factory: None,
        metrics,
    });
    reg
}

#[test]
fn backoff_waits_out_an_exponential_window() {
    let policy = RestartPolicy::Backoff { base_cycles: 2 };
    let flagged = vec!["w".to_string()];

    let fresh = registry_with("w", WorkerMetrics::default());
    assert_eq!(select_restarts(policy, &flagged, &fresh, 1), vec!["w"]);

    let mut once = WorkerMetrics::default();
    once.record(ExecutionOutcome::Faulted, 1.0);
    let once = once.carried_forward(10);
    let reg = registry_with("w", once.clone());
    assert!(select_restarts(policy, &flagged, &reg, 11).is_empty());
    assert_eq!(select_restarts(policy, &flagged, &reg, 12), vec!["w"]);

    let twice = once.carried_forward(12);
    let reg = registry_with("w", twice);
    assert!(select_restarts(policy, &flagged, &reg, 15).is_empty());
    assert_eq!(select_restarts(policy, &flagged, &reg, 16), vec!["w"]);
}

#[test]
fn selection_deduplicates_flagged_ids() {
    let reg = WorkerRegistry::new();
    let flagged = vec!["a".to_string(), "a".to_string(), "b".to_string()];
    assert_eq!(
        select_restarts(RestartPolicy::RestartAll, &flagged, &reg, 1),
        vec!["a", "b"]
    );
    assert_eq!(
        select_restarts(RestartPolicy::OnePerCycle, &flagged, &reg, 1),
        vec!["a"]
    );
}
