use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{EtlError, Result};
use crate::pipeline::generation::GeneratorConfig;
use crate::pipeline::processing::TransformConfig;

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "etl.toml";

pub const ENV_ROWS: &str = "ETL_ROWS";
pub const ENV_SEED: &str = "ETL_SEED";
pub const ENV_DATABASE_PATH: &str = "ETL_DATABASE_PATH";
pub const ENV_LOG_DIR: &str = "ETL_LOG_DIR";

const IN_MEMORY_PATH: &str = ":memory:";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub generator: GeneratorConfig,
    pub transform: TransformConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

/// Connection parameters for the warehouse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file, or `:memory:`
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("warehouse.db"),
            busy_timeout_ms: 5_000,
        }
    }
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::from(IN_MEMORY_PATH),
            ..Self::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == IN_MEMORY_PATH
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(EtlError::Config("database path must not be empty".to_string()));
        }
        if !self.is_in_memory() && self.path.is_dir() {
            return Err(EtlError::Config(format!(
                "database path '{}' is a directory",
                self.path.display()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    pub file_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            file_name: "etl.log".to_string(),
        }
    }
}

impl EtlConfig {
    /// Read the TOML file if one is given (or `etl.toml` exists), then apply
    /// environment overrides. Validation is left to the caller so CLI flags
    /// can be layered on first.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let config: EtlConfig = toml::from_str(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(rows) = env_var(ENV_ROWS) {
            self.generator.rows = rows
                .parse()
                .map_err(|_| EtlError::Config(format!("{ENV_ROWS} must be a positive integer, got '{rows}'")))?;
        }
        if let Some(seed) = env_var(ENV_SEED) {
            self.generator.seed = Some(
                seed.parse()
                    .map_err(|_| EtlError::Config(format!("{ENV_SEED} must be an unsigned integer, got '{seed}'")))?,
            );
        }
        if let Some(path) = env_var(ENV_DATABASE_PATH) {
            self.database.path = PathBuf::from(path);
        }
        if let Some(dir) = env_var(ENV_LOG_DIR) {
            self.logging.directory = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.generator.validate()?;
        self.transform.validate()?;
        self.database.validate()
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::generation::DefectRates;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = EtlConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.generator.rows, 10_000);
        assert_eq!(config.generator.defects, DefectRates::default());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[generator]
rows = 250
seed = 99

[generator.defects]
missing_cost = 0.5

[database]
path = ":memory:"
"#
        )
        .unwrap();

        let config = EtlConfig::from_file(file.path()).unwrap();
        assert_eq!(config.generator.rows, 250);
        assert_eq!(config.generator.seed, Some(99));
        assert_eq!(config.generator.defects.missing_cost, 0.5);
        assert_eq!(config.generator.defects.negative_cost, DefectRates::default().negative_cost);
        assert!(config.database.is_in_memory());
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn zero_rows_fail_validation() {
        let mut config = EtlConfig::default();
        config.generator.rows = 0;
        assert!(matches!(config.validate(), Err(EtlError::Config(_))));
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = EtlConfig::default();
        config.database.path = PathBuf::new();
        assert!(matches!(config.validate(), Err(EtlError::Config(_))));
    }

    #[test]
    fn directory_is_not_a_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().to_path_buf(),
            ..DatabaseConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = EtlConfig::from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }
}
