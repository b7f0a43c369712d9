pub mod jobs;
pub mod orchestrator;
pub mod store;
pub mod types;
