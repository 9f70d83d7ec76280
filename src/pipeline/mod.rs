// ETL pipeline: generation, cleaning/transformation, and loading

pub mod generation;
pub mod load;
pub mod orchestrator;
pub mod processing;
pub mod storage;

pub use orchestrator::{Pipeline, RunSummary};
