// Warehouse persistence: the store seam plus its SQLite and in-memory backends

pub mod in_memory;
pub mod sqlite;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::domain::{Carrier, DateDim, FactShipment, Location, StarSchema};
use crate::error::Result;

pub use in_memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// The four warehouse tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Locations,
    Carriers,
    Dates,
    Facts,
}

impl Table {
    /// Dimensions before facts, so every foreign key already has its target
    pub const LOAD_ORDER: [Table; 4] = [Table::Locations, Table::Carriers, Table::Dates, Table::Facts];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Locations => "dim_locations",
            Table::Carriers => "dim_carriers",
            Table::Dates => "dim_dates",
            Table::Facts => "fact_shipments",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Destination of the loader. Each `write_*` call is all-or-nothing for its
/// table and returns the number of rows committed.
pub trait WarehouseStore {
    fn ensure_schema(&mut self) -> Result<()>;

    fn truncate(&mut self, table: Table) -> Result<()>;

    fn write_locations(&mut self, rows: &[Location]) -> Result<usize>;

    fn write_carriers(&mut self, rows: &[Carrier]) -> Result<usize>;

    fn write_dates(&mut self, rows: &[DateDim]) -> Result<usize>;

    fn write_facts(&mut self, rows: &[FactShipment]) -> Result<usize>;

    fn row_count(&self, table: Table) -> Result<usize>;

    /// Read every table back, ordered by key
    fn snapshot(&self) -> Result<StarSchema>;

    fn fingerprint(&self) -> Result<String> {
        Ok(fingerprint(&self.snapshot()?))
    }
}

/// SHA-256 over a canonical line-per-row rendering of the tables
pub fn fingerprint(schema: &StarSchema) -> String {
    let mut hasher = Sha256::new();
    for l in &schema.locations {
        hasher.update(format!("L|{}|{}|{}\n", l.id, l.city, l.state));
    }
    for c in &schema.carriers {
        hasher.update(format!("C|{}|{}\n", c.id, c.name));
    }
    for d in &schema.dates {
        hasher.update(format!(
            "D|{}|{}|{}|{}|{}|{}|{}|{}\n",
            d.date_key, d.full_date, d.year, d.quarter, d.month, d.day, d.day_of_week, d.day_name
        ));
    }
    for f in &schema.facts {
        hasher.update(format!(
            "F|{}|{}|{}|{}|{:?}|{}|{}|{}|{}|{}|{}|{:?}\n",
            f.fact_id,
            f.shipment_id,
            f.ship_date_key,
            f.planned_date_key,
            f.actual_date_key,
            f.origin_location_id,
            f.destination_location_id,
            f.carrier_id,
            f.cost.cents(),
            f.status,
            f.planned_delivery,
            f.actual_delivery
        ));
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_order_puts_facts_last() {
        assert_eq!(Table::LOAD_ORDER.last(), Some(&Table::Facts));
        assert_eq!(Table::Facts.to_string(), "fact_shipments");
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let empty = StarSchema::default();
        let one = StarSchema {
            carriers: vec![Carrier { id: 1, name: "SpeedyShip".into() }],
            ..StarSchema::default()
        };
        assert_eq!(fingerprint(&empty), fingerprint(&StarSchema::default()));
        assert_ne!(fingerprint(&empty), fingerprint(&one));
        assert_eq!(fingerprint(&one).len(), 64);
    }
}
