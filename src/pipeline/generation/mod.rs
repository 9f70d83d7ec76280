//! Synthetic shipment generation.
//!
//! Produces loosely-typed [`RawShipment`] rows with realistic distributions
//! (skewed carrier market share, seasonal ship dates) and a configurable
//! amount of injected messiness. Every injected defect is written to a
//! [`DefectLedger`] so downstream stages can be checked against it.

pub mod defects;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::constants::{
    CITY_GAZETTEER, GLOBAL_CARGO, ISO_DATE_FORMAT, DAY_FIRST_DATE_FORMAT, QUICK_HAUL,
    RELIABLE_FREIGHT, SHIPMENT_ID_BASE, SHIPMENT_ID_PREFIX, SPEEDY_SHIP, TIMESTAMP_FORMAT,
};
use crate::domain::{RawShipment, ShipmentStatus};
use crate::error::{EtlError, Result};
use crate::observability::metrics;

pub use defects::{Defect, DefectLedger, DefectRates, InjectedDefect};

/// Market share of one carrier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarrierShare {
    pub name: String,
    pub weight: f64,
}

/// Everything the generator needs; there is no hidden global state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Number of rows to fabricate
    pub rows: usize,
    /// RNG seed; a random one is drawn (and reported) when absent
    pub seed: Option<u64>,
    /// First possible ship date
    pub start_date: NaiveDate,
    /// Ship dates fall in `start_date .. start_date + span_days`
    pub span_days: u32,
    /// Relative likelihood of a ship date landing in each month, January first
    pub seasonal_weights: [f64; 12],
    pub carrier_shares: Vec<CarrierShare>,
    pub defects: DefectRates,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            rows: 10_000,
            seed: None,
            start_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or(NaiveDate::MIN),
            span_days: 500,
            seasonal_weights: [0.8, 0.7, 0.8, 0.9, 1.0, 1.0, 0.9, 1.0, 1.1, 1.2, 1.5, 1.8],
            carrier_shares: vec![
                CarrierShare { name: SPEEDY_SHIP.to_string(), weight: 0.40 },
                CarrierShare { name: RELIABLE_FREIGHT.to_string(), weight: 0.25 },
                CarrierShare { name: GLOBAL_CARGO.to_string(), weight: 0.20 },
                CarrierShare { name: QUICK_HAUL.to_string(), weight: 0.15 },
            ],
            defects: DefectRates::default(),
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 {
            return Err(EtlError::Config("row count must be positive".to_string()));
        }
        if self.span_days == 0 {
            return Err(EtlError::Config("span_days must be positive".to_string()));
        }
        if self
            .start_date
            .checked_add_signed(Duration::days(i64::from(self.span_days) + 30))
            .is_none()
        {
            return Err(EtlError::Config("date window overflows the calendar".to_string()));
        }
        if self.seasonal_weights.iter().any(|w| !w.is_finite() || *w < 0.0)
            || self.seasonal_weights.iter().sum::<f64>() <= 0.0
        {
            return Err(EtlError::Config(
                "seasonal weights must be non-negative with a positive sum".to_string(),
            ));
        }
        if self.carrier_shares.is_empty() {
            return Err(EtlError::Config("at least one carrier share is required".to_string()));
        }
        for share in &self.carrier_shares {
            if share.name.trim().is_empty() {
                return Err(EtlError::Config("carrier names must not be blank".to_string()));
            }
            if !share.weight.is_finite() || share.weight <= 0.0 {
                return Err(EtlError::Config(format!(
                    "carrier '{}' needs a positive weight, got {}",
                    share.name, share.weight
                )));
            }
        }
        self.defects.validate()
    }
}

/// Output of the generator: raw rows plus a record of what was broken on purpose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDataset {
    pub seed: u64,
    pub rows: Vec<RawShipment>,
    pub ledger: DefectLedger,
}

impl RawDataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// What actually happened to a shipment, before any labelling noise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Cancelled,
    InTransit,
    Late,
    Early,
    OnTime,
}

impl Outcome {
    fn status(self) -> ShipmentStatus {
        match self {
            Outcome::Cancelled => ShipmentStatus::Cancelled,
            Outcome::InTransit => ShipmentStatus::InTransit,
            Outcome::Late => ShipmentStatus::Delayed,
            Outcome::Early | Outcome::OnTime => ShipmentStatus::OnTime,
        }
    }
}

pub struct Generator {
    config: GeneratorConfig,
    seed: u64,
    rng: StdRng,
    carriers: WeightedIndex<f64>,
    max_season_weight: f64,
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(rand::random);
        let weights: Vec<f64> = config.carrier_shares.iter().map(|s| s.weight).collect();
        let carriers = WeightedIndex::new(&weights)
            .map_err(|e| EtlError::Config(format!("invalid carrier shares: {e}")))?;
        let max_season_weight = config.seasonal_weights.iter().cloned().fold(0.0, f64::max);

        Ok(Self {
            config,
            seed,
            rng: StdRng::seed_from_u64(seed),
            carriers,
            max_season_weight,
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[instrument(skip(self), fields(rows = self.config.rows, seed = self.seed))]
    pub fn generate(mut self) -> RawDataset {
        let started = std::time::Instant::now();
        let mut rows = Vec::with_capacity(self.config.rows);
        let mut ledger = DefectLedger::default();

        for i in 0..self.config.rows {
            let row = self.generate_row(i, &rows, &mut ledger);
            rows.push(row);
            if (i + 1) % 2_500 == 0 {
                debug!("Generated {}/{} rows", i + 1, self.config.rows);
            }
        }

        info!(
            "Generated {} rows with {} injected defects (seed {})",
            rows.len(),
            ledger.entries().len(),
            self.seed
        );
        metrics::generation::rows_generated(rows.len());
        for entry in ledger.entries() {
            metrics::generation::defect_injected(entry.defect);
        }
        metrics::stage_completed("generate", started.elapsed().as_secs_f64());

        RawDataset {
            seed: self.seed,
            rows,
            ledger,
        }
    }

    fn generate_row(&mut self, i: usize, earlier: &[RawShipment], ledger: &mut DefectLedger) -> RawShipment {
        let rates = self.config.defects.clone();

        let origin_idx = self.rng.gen_range(0..CITY_GAZETTEER.len());
        let mut dest_idx = self.rng.gen_range(0..CITY_GAZETTEER.len() - 1);
        if dest_idx >= origin_idx {
            dest_idx += 1;
        }
        let (origin_city, origin_state) = CITY_GAZETTEER[origin_idx];
        let (dest_city, dest_state) = CITY_GAZETTEER[dest_idx];

        let ship_date = self.seasonal_ship_date();
        let lead_time_days: u32 = self.rng.gen_range(3..=10);
        let planned = self.planned_delivery(ship_date, lead_time_days);

        let mislabel = self.rng.gen_bool(rates.status_mislabel);
        let outcome = if mislabel { Outcome::Late } else { self.roll_outcome() };
        let actual = self.actual_delivery(planned, outcome);

        let status = if mislabel {
            ledger.record(i, Defect::StatusMislabel);
            Some("On-Time".to_string())
        } else if self.rng.gen_bool(rates.missing_status) {
            ledger.record(i, Defect::MissingStatus);
            None
        } else if self.rng.gen_bool(rates.status_label_variant) {
            ledger.record(i, Defect::StatusLabelVariant);
            Some(self.label_variant(outcome.status()))
        } else {
            Some(outcome.status().as_str().to_string())
        };

        let ship_date_text = self.ship_date_text(i, ship_date, ledger);

        let base_cents = (self.rng.gen_range(50.0..500.0_f64) * 100.0).round() as i64;
        let shipping_cost = if self.rng.gen_bool(rates.missing_cost) {
            ledger.record(i, Defect::MissingCost);
            match self.rng.gen_range(0..3) {
                0 => None,
                1 => Some("NaN".to_string()),
                _ => Some(String::new()),
            }
        } else if self.rng.gen_bool(rates.negative_cost) {
            ledger.record(i, Defect::NegativeCost);
            Some(format!("-{}.{:02}", base_cents / 100, base_cents % 100))
        } else {
            Some(format!("{}.{:02}", base_cents / 100, base_cents % 100))
        };

        let mut origin_state = origin_state.to_string();
        let mut dest_state = dest_state.to_string();
        if self.rng.gen_bool(rates.malformed_location) {
            ledger.record(i, Defect::MalformedLocation);
            if self.rng.gen_bool(0.5) {
                origin_state = defects::mangle_state_code(&mut self.rng, &origin_state);
            } else {
                dest_state = defects::mangle_state_code(&mut self.rng, &dest_state);
            }
        }

        let carrier = self.config.carrier_shares[self.carriers.sample(&mut self.rng)].name.clone();
        let carrier_name = if self.rng.gen_bool(rates.blank_carrier) {
            ledger.record(i, Defect::BlankCarrier);
            if self.rng.gen_bool(0.5) { None } else { Some(String::new()) }
        } else if self.rng.gen_bool(rates.messy_carrier) {
            ledger.record(i, Defect::MessyCarrier);
            Some(defects::mangle_carrier(&mut self.rng, &carrier))
        } else {
            Some(carrier)
        };

        let shipment_id = if i > 0 && self.rng.gen_bool(rates.duplicate_id) {
            ledger.record(i, Defect::DuplicateId);
            let j = self.rng.gen_range(0..i);
            earlier[j].shipment_id.clone()
        } else {
            Some(format!("{}-{}", SHIPMENT_ID_PREFIX, SHIPMENT_ID_BASE + i))
        };

        RawShipment {
            shipment_id,
            ship_date: ship_date_text,
            lead_time_days: Some(lead_time_days),
            planned_delivery: Some(planned.format(TIMESTAMP_FORMAT).to_string()),
            actual_delivery: actual.map(|ts| ts.format(TIMESTAMP_FORMAT).to_string()),
            origin_city: Some(origin_city.to_string()),
            origin_state: Some(origin_state),
            destination_city: Some(dest_city.to_string()),
            destination_state: Some(dest_state),
            shipping_cost,
            carrier_name,
            status,
        }
    }

    /// Rejection sampling over the window, weighted by month
    fn seasonal_ship_date(&mut self) -> NaiveDate {
        let mut date = self.config.start_date;
        for _ in 0..64 {
            let offset = self.rng.gen_range(0..self.config.span_days);
            date = self.config.start_date + Duration::days(i64::from(offset));
            let weight = self.config.seasonal_weights[date.month0() as usize];
            if self.rng.gen::<f64>() * self.max_season_weight < weight {
                break;
            }
        }
        date
    }

    fn planned_delivery(&mut self, ship_date: NaiveDate, lead_time_days: u32) -> NaiveDateTime {
        let day = ship_date + Duration::days(i64::from(lead_time_days));
        let hour = self.rng.gen_range(9..=18);
        let minute = *[0, 15, 30, 45].choose(&mut self.rng).unwrap_or(&0);
        day.and_hms_opt(hour, minute, 0)
            .unwrap_or_else(|| day.and_time(NaiveTime::MIN))
    }

    fn roll_outcome(&mut self) -> Outcome {
        let roll: f64 = self.rng.gen();
        if roll < 0.02 {
            Outcome::Cancelled
        } else if roll < 0.07 {
            Outcome::InTransit
        } else if roll < 0.27 {
            Outcome::Late
        } else if roll < 0.32 {
            Outcome::Early
        } else {
            Outcome::OnTime
        }
    }

    fn actual_delivery(&mut self, planned: NaiveDateTime, outcome: Outcome) -> Option<NaiveDateTime> {
        match outcome {
            Outcome::Cancelled | Outcome::InTransit => None,
            Outcome::Late => {
                let days = self.rng.gen_range(1..=3);
                let hours = self.rng.gen_range(0..=6);
                Some(planned + Duration::days(days) + Duration::hours(hours))
            }
            Outcome::Early => Some(planned - Duration::days(1)),
            Outcome::OnTime => Some(planned - Duration::minutes(self.rng.gen_range(0..=120))),
        }
    }

    fn label_variant(&mut self, status: ShipmentStatus) -> String {
        let variants: [&str; 3] = match status {
            ShipmentStatus::OnTime => ["On-Time", "on time", "ON_TIME"],
            ShipmentStatus::Delayed => ["Delayed", "DELAYED", "late"],
            ShipmentStatus::InTransit => ["In-Transit", "in transit", "IN_TRANSIT"],
            ShipmentStatus::Cancelled => ["Cancelled", "canceled", "CANCELLED"],
        };
        variants.choose(&mut self.rng).copied().unwrap_or(status.as_str()).to_string()
    }

    fn ship_date_text(&mut self, i: usize, ship_date: NaiveDate, ledger: &mut DefectLedger) -> Option<String> {
        let rates = &self.config.defects;
        let alternate = rates.alternate_date_format;
        let missing = alternate + rates.missing_date;
        let malformed = missing + rates.malformed_date;
        let out_of_range = malformed + rates.out_of_range_date;

        let roll: f64 = self.rng.gen();
        if roll < alternate {
            ledger.record(i, Defect::AlternateDateFormat);
            Some(ship_date.format(DAY_FIRST_DATE_FORMAT).to_string())
        } else if roll < missing {
            ledger.record(i, Defect::MissingDate);
            None
        } else if roll < malformed {
            ledger.record(i, Defect::MalformedDate);
            Some(defects::garbage_date(
                &mut self.rng,
                ship_date.year(),
                ship_date.month(),
                ship_date.day(),
            ))
        } else if roll < out_of_range {
            ledger.record(i, Defect::OutOfRangeDate);
            let year = if self.rng.gen_bool(0.5) {
                self.rng.gen_range(1850..=1899)
            } else {
                self.rng.gen_range(2150..=2199)
            };
            let shifted = ship_date
                .with_year(year)
                .or_else(|| NaiveDate::from_ymd_opt(year, 1, 1))
                .unwrap_or(ship_date);
            Some(shifted.format(ISO_DATE_FORMAT).to_string())
        } else {
            Some(ship_date.format(ISO_DATE_FORMAT).to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn config(rows: usize, seed: u64) -> GeneratorConfig {
        GeneratorConfig {
            rows,
            seed: Some(seed),
            ..GeneratorConfig::default()
        }
    }

    #[test]
    fn zero_rows_is_rejected() {
        let err = Generator::new(config(0, 1)).err().unwrap();
        assert!(matches!(err, EtlError::Config(_)));
    }

    #[test]
    fn same_seed_same_dataset() {
        let a = Generator::new(config(300, 7)).unwrap().generate();
        let b = Generator::new(config(300, 7)).unwrap().generate();
        assert_eq!(a, b);
        let c = Generator::new(config(300, 8)).unwrap().generate();
        assert_ne!(a.rows, c.rows);
    }

    #[test]
    fn missing_seed_is_drawn_and_reported() {
        let generator = Generator::new(GeneratorConfig { rows: 5, seed: None, ..GeneratorConfig::default() }).unwrap();
        let seed = generator.seed();
        assert_eq!(generator.generate().seed, seed);
    }

    #[test]
    fn clean_config_injects_nothing() {
        let cfg = GeneratorConfig {
            defects: DefectRates::none(),
            ..config(1_000, 11)
        };
        let dataset = Generator::new(cfg).unwrap().generate();
        assert!(dataset.ledger.is_empty());

        let ids: HashSet<_> = dataset.rows.iter().map(|r| r.shipment_id.clone()).collect();
        assert_eq!(ids.len(), 1_000);
        for row in &dataset.rows {
            assert!(row.ship_date.is_some());
            assert!(row.shipping_cost.as_deref().map(|c| !c.starts_with('-')).unwrap_or(false));
            assert!(row.status.is_some());
            assert_ne!(row.origin_city, row.destination_city);
        }
    }

    #[test]
    fn carrier_share_is_skewed_toward_the_heaviest_weight() {
        let cfg = GeneratorConfig {
            defects: DefectRates::none(),
            ..config(4_000, 3)
        };
        let dataset = Generator::new(cfg).unwrap().generate();
        let mut counts: HashMap<String, usize> = HashMap::new();
        for row in &dataset.rows {
            *counts.entry(row.carrier_name.clone().unwrap_or_default()).or_default() += 1;
        }
        let speedy = counts[SPEEDY_SHIP];
        let quick = counts[QUICK_HAUL];
        assert!(speedy > quick * 2, "speedy={speedy} quick={quick}");
    }

    #[test]
    fn duplicate_defect_reuses_an_earlier_id() {
        let cfg = GeneratorConfig {
            defects: DefectRates { duplicate_id: 0.2, ..DefectRates::none() },
            ..config(500, 5)
        };
        let dataset = Generator::new(cfg).unwrap().generate();
        let dup_rows = dataset.ledger.rows_with(Defect::DuplicateId);
        assert!(!dup_rows.is_empty());
        for row in dup_rows {
            let id = &dataset.rows[row].shipment_id;
            assert!(dataset.rows[..row].iter().any(|r| &r.shipment_id == id));
        }
    }

    #[test]
    fn ship_dates_stay_inside_the_window() {
        let cfg = GeneratorConfig {
            defects: DefectRates::none(),
            ..config(2_000, 9)
        };
        let start = cfg.start_date;
        let end = start + Duration::days(i64::from(cfg.span_days));
        let dataset = Generator::new(cfg).unwrap().generate();
        for row in &dataset.rows {
            let date = NaiveDate::parse_from_str(row.ship_date.as_deref().unwrap(), ISO_DATE_FORMAT).unwrap();
            assert!(date >= start && date < end);
        }
    }
}
