use console::{Emoji, style};

use crate::core::metrics::ExecutionOutcome;
use crate::core::orchestrator::{CycleRecord, SystemState, SystemStatus};
use crate::core::pipeline::PipelineOutcome;
use crate::core::worker::WorkerInfo;

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_step(step: &str) {
    println!("{} {}", SPARKLE, style(step).bold());
}

/// Titled block of `command  description` rows for help screens.
pub struct GuideSection {
    title: String,
    rows: Vec<(String, String)>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            rows: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, desc: &str) -> Self {
        self.rows.push((name.to_string(), desc.to_string()));
        self
    }

    pub fn print(&self) {
        println!("\n {}", style(&self.title).bold().underlined());
        let width = self.rows.iter().map(|(n, _)| n.len()).max().unwrap_or(0);
        for (name, desc) in &self.rows {
            println!(
                "   {}  {}",
                style(format!("{:<width$}", name, width = width)).green(),
                style(desc).dim()
            );
        }
    }
}

pub fn print_banner() {
    println!();
    println!("{}", style("  c a d e n c e").bold().color256(111));
    println!("{}\n", style("  Agents on a steady beat.").color256(44));
}

pub fn print_cycle(record: &CycleRecord) {
    let failed =
        record.count(ExecutionOutcome::Failed) + record.count(ExecutionOutcome::Faulted);
    let line = format!(
        "Cycle {} finished in {}ms: {} ok, {} failed",
        record.cycle,
        record.duration_ms(),
        record.count(ExecutionOutcome::Succeeded),
        failed
    );
    if failed == 0 {
        println!("{} {}", CLOCK, style(line).green());
    } else {
        println!("{} {}", CLOCK, style(line).yellow());
    }
    if !record.restarted.is_empty() {
        print_status("Restarted", &record.restarted.join(", "));
    }
}

pub fn print_system_state(state: &SystemState) {
    let status = match state.status {
        SystemStatus::Active => style(state.status.as_str()).green(),
        SystemStatus::Degraded => style(state.status.as_str()).yellow(),
        _ => style(state.status.as_str()).dim(),
    };
    print_status("Status", &status.to_string());
    print_status("Cycle", &state.current_cycle.to_string());
    print_status("Workers", &state.agent_count.to_string());
    print_status(
        "Ledgers",
        &format!(
            "{} alert(s), {} opportunit(ies), {} improvement(s)",
            state.alerts.len(),
            state.opportunities.len(),
            state.auto_improvements.len()
        ),
    );
}

/// One row per worker: state, runs, success rate and mean latency.
pub fn print_workers(workers: &[WorkerInfo]) {
    for info in workers {
        let m = &info.metrics;
        let rate = format!("{:.0}%", m.success_rate() * 100.0);
        let rate = if m.total_executions > 0 && m.success_rate() < 0.5 {
            style(rate).yellow()
        } else {
            style(rate).green()
        };
        print_status(
            &info.display_name,
            &format!(
                "{} | {} run(s) | {} ok | {:.0}ms avg | {} restart(s)",
                info.state.as_str(),
                m.total_executions,
                rate,
                m.average_response_time_ms,
                m.restart_count
            ),
        );
    }
}

pub fn print_pipeline_outcome(outcome: &PipelineOutcome) {
    let failed = outcome.steps.iter().filter(|s| !s.success).count();
    print_status(
        "Steps",
        &format!("{} run, {} failed", outcome.steps.len(), failed),
    );
    if outcome.cancelled {
        print_warn("Run was stopped before all cycles completed.");
    }
    if !outcome.synthesized {
        print_warn("Synthesis failed; showing the raw final context.");
    }
    println!("\n{}\n", outcome.summary);
}

pub fn print_goodbye() {
    println!(
        "\n{} {}",
        SPARKLE,
        style("cadence stopped. See you next beat!").bold().cyan()
    );
}
