//! Concrete [`kg_automations::Executor`] implementations for every worker in
//! the analysis pipeline (C5-C14), plus the job/event payload shapes and
//! prompt-construction helpers they share.

pub mod dispatch;
pub mod file_analysis_worker;
pub mod file_discovery_batcher;
pub mod directory_resolution_worker;
pub mod global_resolution_worker;
pub mod graph_ingestor;
pub mod outbox_publisher;
pub mod payloads;
pub mod prompts;
pub mod reconciliation_worker;
pub mod relationship_resolution_worker;
pub mod relationship_schema;
pub mod scanner;
pub mod validation_worker;
