use thiserror::Error;

use crate::pipeline::storage::Table;

/// Broad classes of fatal failures. Data-quality problems are not errors at
/// all: they are counted as rejections in the transform report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Storage,
    Io,
}

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Load aborted while writing {table} ({committed} rows committed): {source}")]
    LoadAborted {
        table: Table,
        committed: usize,
        #[source]
        source: Box<EtlError>,
    },

    #[error("Referential integrity violated: {0}")]
    Integrity(String),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EtlError {
    pub fn storage(message: impl Into<String>) -> Self {
        EtlError::Storage {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::Config(_) | EtlError::Toml(_) => ErrorCategory::Configuration,
            EtlError::Database(_)
            | EtlError::Storage { .. }
            | EtlError::LoadAborted { .. }
            | EtlError::Integrity(_) => ErrorCategory::Storage,
            EtlError::Json(_) | EtlError::Io(_) => ErrorCategory::Io,
        }
    }

    /// Rows that made it into the store before a load was aborted.
    pub fn committed_rows(&self) -> Option<usize> {
        match self {
            EtlError::LoadAborted { committed, .. } => Some(*committed),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_aborted_reports_committed_rows_and_storage_category() {
        let err = EtlError::LoadAborted {
            table: Table::Facts,
            committed: 42,
            source: Box::new(EtlError::storage("disk full")),
        };
        assert_eq!(err.committed_rows(), Some(42));
        assert_eq!(err.category(), ErrorCategory::Storage);
        assert!(err.to_string().contains("fact_shipments"));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn config_errors_are_configuration_category() {
        let err = EtlError::Config("row count must be positive".into());
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.committed_rows(), None);
    }
}
