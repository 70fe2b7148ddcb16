//! Periodic multi-worker orchestration with restarts, collaboration and a
//! sequential role pipeline.

pub mod config;
pub mod core;
pub mod logging;

pub use crate::config::{AppConfig, OrchestratorConfig};
pub use crate::core::orchestrator::Orchestrator;
pub use crate::core::pipeline::SequentialPipelineRunner;
pub use crate::core::scheduler::CycleScheduler;
