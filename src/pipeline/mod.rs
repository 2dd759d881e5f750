pub mod orchestrator;
pub mod service;
pub mod summary;

pub use orchestrator::{Ingestor, RunPhase};
pub use service::{IngestionService, SourceReport};
pub use summary::{FailureStage, ItemFailure, RunSummary};
