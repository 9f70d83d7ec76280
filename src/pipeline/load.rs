use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, info, instrument};

use crate::domain::StarSchema;
use crate::error::{EtlError, Result};
use crate::observability::metrics;

use super::storage::{Table, WarehouseStore};

/// Rows committed per table by one load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub rows_by_table: BTreeMap<Table, usize>,
}

impl LoadReport {
    pub fn rows(&self, table: Table) -> usize {
        self.rows_by_table.get(&table).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.rows_by_table.values().sum()
    }

    pub fn facts(&self) -> usize {
        self.rows(Table::Facts)
    }
}

/// Truncate-and-load writer for a [`WarehouseStore`]
pub struct Loader<'a, S: WarehouseStore + ?Sized> {
    store: &'a mut S,
}

impl<'a, S: WarehouseStore + ?Sized> Loader<'a, S> {
    pub fn new(store: &'a mut S) -> Self {
        Self { store }
    }

    /// Replace the warehouse contents with `schema`.
    ///
    /// Nothing is written if the schema has dangling references. After that,
    /// the first failing step aborts the run with
    /// [`EtlError::LoadAborted`] carrying the rows already committed.
    #[instrument(skip(self, schema), fields(facts = schema.facts.len()))]
    pub fn load(&mut self, schema: &StarSchema) -> Result<LoadReport> {
        let started = std::time::Instant::now();
        schema.check_integrity()?;
        self.store.ensure_schema()?;

        for table in Table::LOAD_ORDER.iter().rev() {
            self.store.truncate(*table).map_err(|e| abort(*table, 0, e))?;
        }

        let mut report = LoadReport::default();
        for table in Table::LOAD_ORDER {
            let written = match table {
                Table::Locations => self.store.write_locations(&schema.locations),
                Table::Carriers => self.store.write_carriers(&schema.carriers),
                Table::Dates => self.store.write_dates(&schema.dates),
                Table::Facts => self.store.write_facts(&schema.facts),
            };
            match written {
                Ok(rows) => {
                    info!("Loaded {} rows into {}", rows, table);
                    metrics::load::rows_loaded(table, rows);
                    report.rows_by_table.insert(table, rows);
                }
                Err(e) => {
                    let committed = report.total();
                    error!("Writing {} failed after {} committed rows: {}", table, committed, e);
                    metrics::load::load_aborted(table);
                    return Err(abort(table, committed, e));
                }
            }
        }

        metrics::stage_completed("load", started.elapsed().as_secs_f64());
        Ok(report)
    }
}

fn abort(table: Table, committed: usize, source: EtlError) -> EtlError {
    EtlError::LoadAborted {
        table,
        committed,
        source: Box::new(source),
    }
}
