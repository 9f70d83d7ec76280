pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod observability;
pub mod pipeline;

pub use config::EtlConfig;
pub use error::{EtlError, Result};
pub use pipeline::{Pipeline, RunSummary};
