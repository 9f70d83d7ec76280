use serde::Serialize;
use std::time::Instant;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::config::EtlConfig;
use crate::error::Result;

use super::generation::Generator;
use super::load::{LoadReport, Loader};
use super::processing::{TransformReport, Transformer};
use super::storage::WarehouseStore;

/// What one pipeline run did, end to end
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub seed: u64,
    pub generated: usize,
    pub injected_defects: usize,
    pub transform: TransformReport,
    pub load: LoadReport,
    pub fingerprint: String,
    pub duration_ms: u128,
}

impl RunSummary {
    pub fn accepted(&self) -> usize {
        self.transform.accepted
    }

    pub fn rejected(&self) -> usize {
        self.transform.rejected
    }

    pub fn loaded(&self) -> usize {
        self.load.facts()
    }
}

pub struct Pipeline;

impl Pipeline {
    /// Generate, transform and load in one go. The configuration is
    /// validated before anything is generated.
    pub fn run<S: WarehouseStore + ?Sized>(config: &EtlConfig, store: &mut S) -> Result<RunSummary> {
        config.validate()?;
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline_run", run_id = %run_id);
        let _enter = span.enter();
        let started = Instant::now();

        info!("🚀 Starting ETL run");
        let generator = Generator::new(config.generator.clone())?;
        let seed = generator.seed();
        info!("📦 Generating {} rows (seed {})", config.generator.rows, seed);
        let dataset = generator.generate();

        info!("🔧 Cleaning and transforming");
        let output = Transformer::new(config.transform.clone()).transform(&dataset.rows);
        if output.report.rejected > 0 {
            warn!(
                "{} of {} rows rejected: {:?}",
                output.report.rejected, output.report.input_rows, output.report.rejections_by_reason
            );
        }

        info!("💾 Loading warehouse");
        let load = Loader::new(store).load(&output.schema)?;
        let fingerprint = store.fingerprint()?;

        let summary = RunSummary {
            run_id,
            seed,
            generated: dataset.len(),
            injected_defects: dataset.ledger.entries().len(),
            transform: output.report,
            load,
            fingerprint,
            duration_ms: started.elapsed().as_millis(),
        };
        info!(
            "✅ Run finished: {} generated, {} accepted, {} rejected, {} facts loaded",
            summary.generated,
            summary.accepted(),
            summary.rejected(),
            summary.loaded()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;
    use crate::pipeline::storage::{InMemoryStore, Table};

    fn config(rows: usize, seed: u64) -> EtlConfig {
        let mut config = EtlConfig::default();
        config.generator.rows = rows;
        config.generator.seed = Some(seed);
        config
    }

    #[test]
    fn summary_counts_balance() {
        let mut store = InMemoryStore::new();
        let summary = Pipeline::run(&config(500, 21), &mut store).unwrap();
        assert_eq!(summary.generated, 500);
        assert_eq!(summary.accepted() + summary.rejected(), 500);
        assert_eq!(summary.loaded(), summary.accepted());
        assert_eq!(store.row_count(Table::Facts).unwrap(), summary.accepted());
        assert_eq!(summary.seed, 21);
    }

    #[test]
    fn invalid_config_stops_before_touching_the_store() {
        let mut store = InMemoryStore::new();
        let err = Pipeline::run(&config(0, 1), &mut store).unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
        assert_eq!(store.truncations(), 0);
    }

    #[test]
    fn storage_failure_is_fatal() {
        let mut store = InMemoryStore::failing_on(Table::Facts);
        let err = Pipeline::run(&config(100, 2), &mut store).unwrap_err();
        assert!(err.committed_rows().unwrap() > 0);
    }
}
