//! Record shapes shared by every stage: the loosely-typed raw shipment the
//! generator emits, and the star schema the cleaner produces and the loader
//! persists.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::{EtlError, Result};

/// A shipment exactly as the generator produced it. Nothing here is trusted
/// until the cleaner has validated it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawShipment {
    pub shipment_id: Option<String>,
    pub ship_date: Option<String>,
    pub lead_time_days: Option<u32>,
    pub planned_delivery: Option<String>,
    pub actual_delivery: Option<String>,
    pub origin_city: Option<String>,
    pub origin_state: Option<String>,
    pub destination_city: Option<String>,
    pub destination_state: Option<String>,
    pub shipping_cost: Option<String>,
    pub carrier_name: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShipmentStatus {
    OnTime,
    Delayed,
    InTransit,
    Cancelled,
}

impl ShipmentStatus {
    pub const ALL: [ShipmentStatus; 4] = [
        ShipmentStatus::OnTime,
        ShipmentStatus::Delayed,
        ShipmentStatus::InTransit,
        ShipmentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::OnTime => "on-time",
            ShipmentStatus::Delayed => "delayed",
            ShipmentStatus::InTransit => "in-transit",
            ShipmentStatus::Cancelled => "cancelled",
        }
    }

    /// Lenient label parsing: `On-Time`, `on time`, `ON_TIME` all map to
    /// `OnTime`. Returns `None` for anything unrecognised.
    pub fn parse_label(label: &str) -> Option<Self> {
        let canonical: String = label
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == '_' || c == ' ' { '-' } else { c })
            .collect();
        match canonical.as_str() {
            "on-time" | "ontime" => Some(ShipmentStatus::OnTime),
            "delayed" | "late" => Some(ShipmentStatus::Delayed),
            "in-transit" | "intransit" => Some(ShipmentStatus::InTransit),
            "cancelled" | "canceled" => Some(ShipmentStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A label that matches none of the known statuses
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown shipment status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for ShipmentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse_label(s).ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Declared shipping cost, held exactly as whole cents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cost(pub i64);

impl Cost {
    pub fn from_cents(cents: i64) -> Self {
        Cost(cents)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: u32,
    pub city: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Carrier {
    pub id: u32,
    pub name: String,
}

/// Calendar day with the attributes analysts slice on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateDim {
    pub date_key: u32,
    pub full_date: NaiveDate,
    pub year: i32,
    pub quarter: u32,
    pub month: u32,
    pub day: u32,
    /// 0 = Monday
    pub day_of_week: u32,
    pub day_name: String,
}

impl DateDim {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            date_key: date_key(date),
            full_date: date,
            year: date.year(),
            quarter: (date.month() - 1) / 3 + 1,
            month: date.month(),
            day: date.day(),
            day_of_week: date.weekday().num_days_from_monday(),
            day_name: date.format("%A").to_string(),
        }
    }
}

/// Smart key `YYYYMMDD`
pub fn date_key(date: NaiveDate) -> u32 {
    (date.year().max(0) as u32) * 10_000 + date.month() * 100 + date.day()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactShipment {
    pub fact_id: u32,
    pub shipment_id: String,
    pub ship_date_key: u32,
    pub planned_date_key: u32,
    pub actual_date_key: Option<u32>,
    pub origin_location_id: u32,
    pub destination_location_id: u32,
    pub carrier_id: u32,
    pub cost: Cost,
    pub status: ShipmentStatus,
    pub planned_delivery: NaiveDateTime,
    pub actual_delivery: Option<NaiveDateTime>,
}

/// The normalized output of one run: a fact table and its three dimensions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarSchema {
    pub locations: Vec<Location>,
    pub carriers: Vec<Carrier>,
    pub dates: Vec<DateDim>,
    pub facts: Vec<FactShipment>,
}

impl StarSchema {
    pub fn location(&self, id: u32) -> Option<&Location> {
        self.locations.iter().find(|l| l.id == id)
    }

    pub fn carrier(&self, id: u32) -> Option<&Carrier> {
        self.carriers.iter().find(|c| c.id == id)
    }

    pub fn date(&self, key: u32) -> Option<&DateDim> {
        self.dates.iter().find(|d| d.date_key == key)
    }

    /// Every broken foreign key or duplicated natural key, described for humans.
    pub fn integrity_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();

        let mut location_ids = HashSet::new();
        let mut location_keys = HashSet::new();
        for l in &self.locations {
            if !location_ids.insert(l.id) {
                violations.push(format!("duplicate location id {}", l.id));
            }
            if !location_keys.insert((l.city.as_str(), l.state.as_str())) {
                violations.push(format!("duplicate location {}, {}", l.city, l.state));
            }
        }

        let mut carrier_ids = HashSet::new();
        let mut carrier_names = HashSet::new();
        for c in &self.carriers {
            if !carrier_ids.insert(c.id) {
                violations.push(format!("duplicate carrier id {}", c.id));
            }
            if !carrier_names.insert(c.name.as_str()) {
                violations.push(format!("duplicate carrier {}", c.name));
            }
        }

        let mut date_keys = HashSet::new();
        for d in &self.dates {
            if !date_keys.insert(d.date_key) {
                violations.push(format!("duplicate date {}", d.full_date));
            }
        }

        let mut shipment_ids = HashSet::new();
        for f in &self.facts {
            if !shipment_ids.insert(f.shipment_id.as_str()) {
                violations.push(format!("duplicate shipment {}", f.shipment_id));
            }
            for (role, id) in [("origin", f.origin_location_id), ("destination", f.destination_location_id)] {
                if !location_ids.contains(&id) {
                    violations.push(format!("{} references missing {} location {}", f.shipment_id, role, id));
                }
            }
            if !carrier_ids.contains(&f.carrier_id) {
                violations.push(format!("{} references missing carrier {}", f.shipment_id, f.carrier_id));
            }
            let date_refs = [("ship", Some(f.ship_date_key)), ("planned", Some(f.planned_date_key)), ("actual", f.actual_date_key)];
            for (role, key) in date_refs {
                if let Some(key) = key {
                    if !date_keys.contains(&key) {
                        violations.push(format!("{} references missing {} date {}", f.shipment_id, role, key));
                    }
                }
            }
        }

        violations
    }

    pub fn check_integrity(&self) -> Result<()> {
        let violations = self.integrity_violations();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(EtlError::Integrity(format!(
                "{} violation(s), first: {}",
                violations.len(),
                violations[0]
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels_parse_leniently() {
        assert_eq!(ShipmentStatus::parse_label("On-Time"), Some(ShipmentStatus::OnTime));
        assert_eq!(ShipmentStatus::parse_label(" on time "), Some(ShipmentStatus::OnTime));
        assert_eq!(ShipmentStatus::parse_label("IN_TRANSIT"), Some(ShipmentStatus::InTransit));
        assert_eq!(ShipmentStatus::parse_label("Canceled"), Some(ShipmentStatus::Cancelled));
        assert_eq!(ShipmentStatus::parse_label("lost at sea"), None);
    }

    #[test]
    fn status_round_trips_through_its_label() {
        for status in ShipmentStatus::ALL {
            assert_eq!(status.as_str().parse::<ShipmentStatus>().unwrap(), status);
        }
        assert_eq!(
            "lost at sea".parse::<ShipmentStatus>(),
            Err(UnknownStatus("lost at sea".to_string()))
        );
    }

    #[test]
    fn cost_displays_two_decimals() {
        assert_eq!(Cost(12345).to_string(), "123.45");
        assert_eq!(Cost(5).to_string(), "0.05");
        assert_eq!(Cost(-250).to_string(), "-2.50");
    }

    #[test]
    fn date_dim_derives_calendar_attributes() {
        let d = DateDim::from_date(NaiveDate::from_ymd_opt(2024, 11, 29).unwrap());
        assert_eq!(d.date_key, 20241129);
        assert_eq!(d.quarter, 4);
        assert_eq!(d.month, 11);
        assert_eq!(d.day_of_week, 4);
        assert_eq!(d.day_name, "Friday");
    }

    #[test]
    fn integrity_flags_dangling_carrier() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let ts = date.and_hms_opt(10, 0, 0).unwrap();
        let schema = StarSchema {
            locations: vec![
                Location { id: 1, city: "Boston".into(), state: "MA".into() },
                Location { id: 2, city: "Miami".into(), state: "FL".into() },
            ],
            carriers: vec![],
            dates: vec![DateDim::from_date(date)],
            facts: vec![FactShipment {
                fact_id: 1,
                shipment_id: "SHP-1".into(),
                ship_date_key: 20240101,
                planned_date_key: 20240101,
                actual_date_key: None,
                origin_location_id: 1,
                destination_location_id: 2,
                carrier_id: 7,
                cost: Cost(100),
                status: ShipmentStatus::InTransit,
                planned_delivery: ts,
                actual_delivery: None,
            }],
        };
        let violations = schema.integrity_violations();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("carrier 7"));
        assert!(matches!(schema.check_integrity(), Err(EtlError::Integrity(_))));
    }
}
