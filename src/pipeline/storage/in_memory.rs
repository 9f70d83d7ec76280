use tracing::debug;

use super::{Table, WarehouseStore};
use crate::domain::{Carrier, DateDim, FactShipment, Location, StarSchema};
use crate::error::{EtlError, Result};

/// In-memory warehouse for development/testing. Can be told to fail on a
/// table to exercise aborted loads.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: StarSchema,
    schema_ready: bool,
    fail_on: Option<Table>,
    truncations: usize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write to `table` will fail until cleared
    pub fn failing_on(table: Table) -> Self {
        Self {
            fail_on: Some(table),
            ..Self::default()
        }
    }

    pub fn clear_failure(&mut self) {
        self.fail_on = None;
    }

    pub fn truncations(&self) -> usize {
        self.truncations
    }

    fn check_writable(&self, table: Table) -> Result<()> {
        if !self.schema_ready {
            return Err(EtlError::storage(format!("{table} does not exist")));
        }
        if self.fail_on == Some(table) {
            return Err(EtlError::storage(format!("injected write failure on {table}")));
        }
        Ok(())
    }
}

impl WarehouseStore for InMemoryStore {
    fn ensure_schema(&mut self) -> Result<()> {
        self.schema_ready = true;
        Ok(())
    }

    fn truncate(&mut self, table: Table) -> Result<()> {
        match table {
            Table::Locations => self.tables.locations.clear(),
            Table::Carriers => self.tables.carriers.clear(),
            Table::Dates => self.tables.dates.clear(),
            Table::Facts => self.tables.facts.clear(),
        }
        self.truncations += 1;
        debug!("Truncated {}", table);
        Ok(())
    }

    fn write_locations(&mut self, rows: &[Location]) -> Result<usize> {
        self.check_writable(Table::Locations)?;
        self.tables.locations.extend_from_slice(rows);
        Ok(rows.len())
    }

    fn write_carriers(&mut self, rows: &[Carrier]) -> Result<usize> {
        self.check_writable(Table::Carriers)?;
        self.tables.carriers.extend_from_slice(rows);
        Ok(rows.len())
    }

    fn write_dates(&mut self, rows: &[DateDim]) -> Result<usize> {
        self.check_writable(Table::Dates)?;
        self.tables.dates.extend_from_slice(rows);
        Ok(rows.len())
    }

    fn write_facts(&mut self, rows: &[FactShipment]) -> Result<usize> {
        self.check_writable(Table::Facts)?;
        self.tables.facts.extend_from_slice(rows);
        Ok(rows.len())
    }

    fn row_count(&self, table: Table) -> Result<usize> {
        Ok(match table {
            Table::Locations => self.tables.locations.len(),
            Table::Carriers => self.tables.carriers.len(),
            Table::Dates => self.tables.dates.len(),
            Table::Facts => self.tables.facts.len(),
        })
    }

    fn snapshot(&self) -> Result<StarSchema> {
        let mut snapshot = self.tables.clone();
        snapshot.locations.sort_by_key(|l| l.id);
        snapshot.carriers.sort_by_key(|c| c.id);
        snapshot.dates.sort_by_key(|d| d.date_key);
        snapshot.facts.sort_by_key(|f| f.fact_id);
        Ok(snapshot)
    }
}
