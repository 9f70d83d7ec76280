use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::{Table, WarehouseStore};
use crate::config::DatabaseConfig;
use crate::constants::{ISO_DATE_FORMAT, TIMESTAMP_FORMAT};
use crate::domain::{Carrier, Cost, DateDim, FactShipment, Location, ShipmentStatus, StarSchema};
use crate::error::{EtlError, Result};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS dim_locations (
        LocationID  INTEGER PRIMARY KEY,
        City        TEXT NOT NULL,
        State       TEXT NOT NULL,
        UNIQUE (City, State)
    );
    CREATE TABLE IF NOT EXISTS dim_carriers (
        CarrierID   INTEGER PRIMARY KEY,
        CarrierName TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS dim_dates (
        DateKey     INTEGER PRIMARY KEY,
        FullDate    TEXT NOT NULL UNIQUE,
        Year        INTEGER NOT NULL,
        Quarter     INTEGER NOT NULL,
        Month       INTEGER NOT NULL,
        Day         INTEGER NOT NULL,
        Weekday     INTEGER NOT NULL,
        DayName     TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS fact_shipments (
        ShipmentFactID         INTEGER PRIMARY KEY,
        ShipmentID             TEXT NOT NULL UNIQUE,
        ShipDateKey            INTEGER NOT NULL REFERENCES dim_dates(DateKey),
        PromisedDateKey        INTEGER NOT NULL REFERENCES dim_dates(DateKey),
        ActualDeliveryDateKey  INTEGER REFERENCES dim_dates(DateKey),
        OriginLocationID       INTEGER NOT NULL REFERENCES dim_locations(LocationID),
        DestinationLocationID  INTEGER NOT NULL REFERENCES dim_locations(LocationID),
        CarrierID              INTEGER NOT NULL REFERENCES dim_carriers(CarrierID),
        ShippingCostCents      INTEGER NOT NULL CHECK (ShippingCostCents >= 0),
        ShipmentStatus         TEXT NOT NULL
            CHECK (ShipmentStatus IN ('on-time', 'delayed', 'in-transit', 'cancelled')),
        PlannedDeliveryAt      TEXT NOT NULL,
        ActualDeliveryAt       TEXT
    );
"#;

/// SQLite-backed warehouse with foreign keys enforced
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let conn = if config.is_in_memory() {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let conn = Connection::open(&config.path)?;
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
            conn
        };
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        info!("Opened warehouse at {}", config.path.display());
        Ok(Self { conn })
    }

    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(&DatabaseConfig {
            path: path.as_ref().to_path_buf(),
            ..DatabaseConfig::default()
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(&DatabaseConfig::in_memory())
    }

    fn read_locations(&self) -> Result<Vec<Location>> {
        let mut stmt = self
            .conn
            .prepare("SELECT LocationID, City, State FROM dim_locations ORDER BY LocationID")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Location {
                    id: row.get(0)?,
                    city: row.get(1)?,
                    state: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn read_carriers(&self) -> Result<Vec<Carrier>> {
        let mut stmt = self
            .conn
            .prepare("SELECT CarrierID, CarrierName FROM dim_carriers ORDER BY CarrierID")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Carrier {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn read_dates(&self) -> Result<Vec<DateDim>> {
        let mut stmt = self.conn.prepare(
            "SELECT DateKey, FullDate, Year, Quarter, Month, Day, Weekday, DayName
             FROM dim_dates ORDER BY DateKey",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i32>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, u32>(4)?,
                    row.get::<_, u32>(5)?,
                    row.get::<_, u32>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.into_iter()
            .map(|(date_key, full_date, year, quarter, month, day, day_of_week, day_name)| {
                Ok(DateDim {
                    date_key,
                    full_date: parse_stored_date(&full_date)?,
                    year,
                    quarter,
                    month,
                    day,
                    day_of_week,
                    day_name,
                })
            })
            .collect()
    }

    fn read_facts(&self) -> Result<Vec<FactShipment>> {
        let mut stmt = self.conn.prepare(
            "SELECT ShipmentFactID, ShipmentID, ShipDateKey, PromisedDateKey, ActualDeliveryDateKey,
                    OriginLocationID, DestinationLocationID, CarrierID, ShippingCostCents,
                    ShipmentStatus, PlannedDeliveryAt, ActualDeliveryAt
             FROM fact_shipments ORDER BY ShipmentFactID",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok(StoredFact {
                    fact_id: row.get(0)?,
                    shipment_id: row.get(1)?,
                    ship_date_key: row.get(2)?,
                    planned_date_key: row.get(3)?,
                    actual_date_key: row.get(4)?,
                    origin_location_id: row.get(5)?,
                    destination_location_id: row.get(6)?,
                    carrier_id: row.get(7)?,
                    cost_cents: row.get(8)?,
                    status: row.get(9)?,
                    planned_delivery: row.get(10)?,
                    actual_delivery: row.get(11)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.into_iter().map(StoredFact::into_fact).collect()
    }
}

/// A fact row as SQLite hands it back, before text columns are parsed
struct StoredFact {
    fact_id: u32,
    shipment_id: String,
    ship_date_key: u32,
    planned_date_key: u32,
    actual_date_key: Option<u32>,
    origin_location_id: u32,
    destination_location_id: u32,
    carrier_id: u32,
    cost_cents: i64,
    status: String,
    planned_delivery: String,
    actual_delivery: Option<String>,
}

impl StoredFact {
    fn into_fact(self) -> Result<FactShipment> {
        Ok(FactShipment {
            fact_id: self.fact_id,
            shipment_id: self.shipment_id,
            ship_date_key: self.ship_date_key,
            planned_date_key: self.planned_date_key,
            actual_date_key: self.actual_date_key,
            origin_location_id: self.origin_location_id,
            destination_location_id: self.destination_location_id,
            carrier_id: self.carrier_id,
            cost: Cost::from_cents(self.cost_cents),
            status: self.status.parse::<ShipmentStatus>().map_err(|e| {
                EtlError::storage(format!("stored fact {} is corrupt: {e}", self.fact_id))
            })?,
            planned_delivery: parse_stored_timestamp(&self.planned_delivery)?,
            actual_delivery: self
                .actual_delivery
                .as_deref()
                .map(parse_stored_timestamp)
                .transpose()?,
        })
    }
}

fn parse_stored_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text, ISO_DATE_FORMAT)
        .map_err(|e| EtlError::storage(format!("stored date '{text}' is corrupt: {e}")))
}

fn parse_stored_timestamp(text: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map_err(|e| EtlError::storage(format!("stored timestamp '{text}' is corrupt: {e}")))
}

impl WarehouseStore for SqliteStore {
    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        debug!("Warehouse schema ready");
        Ok(())
    }

    fn truncate(&mut self, table: Table) -> Result<()> {
        let deleted = self.conn.execute(&format!("DELETE FROM {}", table.name()), [])?;
        debug!("Truncated {} ({} rows)", table, deleted);
        Ok(())
    }

    fn write_locations(&mut self, rows: &[Location]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO dim_locations (LocationID, City, State) VALUES (?1, ?2, ?3)")?;
            for l in rows {
                stmt.execute(params![l.id, l.city, l.state])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn write_carriers(&mut self, rows: &[Carrier]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare("INSERT INTO dim_carriers (CarrierID, CarrierName) VALUES (?1, ?2)")?;
            for c in rows {
                stmt.execute(params![c.id, c.name])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn write_dates(&mut self, rows: &[DateDim]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO dim_dates (DateKey, FullDate, Year, Quarter, Month, Day, Weekday, DayName)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for d in rows {
                stmt.execute(params![
                    d.date_key,
                    d.full_date.format(ISO_DATE_FORMAT).to_string(),
                    d.year,
                    d.quarter,
                    d.month,
                    d.day,
                    d.day_of_week,
                    d.day_name,
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn write_facts(&mut self, rows: &[FactShipment]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO fact_shipments (
                    ShipmentFactID, ShipmentID, ShipDateKey, PromisedDateKey, ActualDeliveryDateKey,
                    OriginLocationID, DestinationLocationID, CarrierID, ShippingCostCents,
                    ShipmentStatus, PlannedDeliveryAt, ActualDeliveryAt
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for f in rows {
                stmt.execute(params![
                    f.fact_id,
                    f.shipment_id,
                    f.ship_date_key,
                    f.planned_date_key,
                    f.actual_date_key,
                    f.origin_location_id,
                    f.destination_location_id,
                    f.carrier_id,
                    f.cost.cents(),
                    f.status.as_str(),
                    f.planned_delivery.format(TIMESTAMP_FORMAT).to_string(),
                    f.actual_delivery.map(|a| a.format(TIMESTAMP_FORMAT).to_string()),
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn row_count(&self, table: Table) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table.name()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn snapshot(&self) -> Result<StarSchema> {
        Ok(StarSchema {
            locations: self.read_locations()?,
            carriers: self.read_carriers()?,
            dates: self.read_dates()?,
            facts: self.read_facts()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StarSchema {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let planned = date.and_hms_opt(9, 15, 0).unwrap();
        StarSchema {
            locations: vec![
                Location { id: 1, city: "Boston".into(), state: "MA".into() },
                Location { id: 2, city: "Denver".into(), state: "CO".into() },
            ],
            carriers: vec![Carrier { id: 1, name: "Quick Haul".into() }],
            dates: vec![DateDim::from_date(date)],
            facts: vec![FactShipment {
                fact_id: 1,
                shipment_id: "SHP-100000".into(),
                ship_date_key: 20240301,
                planned_date_key: 20240301,
                actual_date_key: None,
                origin_location_id: 1,
                destination_location_id: 2,
                carrier_id: 1,
                cost: Cost(19999),
                status: ShipmentStatus::InTransit,
                planned_delivery: planned,
                actual_delivery: None,
            }],
        }
    }

    fn write_all(store: &mut SqliteStore, schema: &StarSchema) -> Result<()> {
        store.ensure_schema()?;
        store.write_locations(&schema.locations)?;
        store.write_carriers(&schema.carriers)?;
        store.write_dates(&schema.dates)?;
        store.write_facts(&schema.facts)?;
        Ok(())
    }

    #[test]
    fn snapshot_reads_back_what_was_written() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let schema = sample();
        write_all(&mut store, &schema).unwrap();
        assert_eq!(store.snapshot().unwrap(), schema);
        assert_eq!(store.row_count(Table::Facts).unwrap(), 1);
    }

    #[test]
    fn foreign_keys_are_enforced() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.ensure_schema().unwrap();
        let mut schema = sample();
        schema.facts[0].carrier_id = 99;
        store.write_locations(&schema.locations).unwrap();
        store.write_carriers(&schema.carriers).unwrap();
        store.write_dates(&schema.dates).unwrap();
        let err = store.write_facts(&schema.facts).unwrap_err();
        assert!(matches!(err, EtlError::Database(_)));
        assert_eq!(store.row_count(Table::Facts).unwrap(), 0);
    }

    #[test]
    fn failed_table_write_commits_nothing() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.ensure_schema().unwrap();
        let dupes = vec![
            Carrier { id: 1, name: "SpeedyShip".into() },
            Carrier { id: 2, name: "SpeedyShip".into() },
        ];
        assert!(store.write_carriers(&dupes).is_err());
        assert_eq!(store.row_count(Table::Carriers).unwrap(), 0);
    }
}
