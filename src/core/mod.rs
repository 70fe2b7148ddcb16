pub mod collaboration;
pub mod events;
pub mod ledger;
pub mod llm;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod scheduler;
pub mod terminal;
pub mod worker;
