use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{EtlError, Result};

/// Kinds of messiness the generator deliberately injects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Defect {
    MissingCost,
    NegativeCost,
    MalformedLocation,
    DuplicateId,
    AlternateDateFormat,
    MissingDate,
    MalformedDate,
    OutOfRangeDate,
    StatusMislabel,
    MissingStatus,
    StatusLabelVariant,
    MessyCarrier,
    BlankCarrier,
}

/// One defect applied to one generated row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectedDefect {
    pub row: usize,
    pub defect: Defect,
}

/// Per-row injection probabilities. The four ship-date defects are drawn
/// from a single roll, so their sum may not exceed 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefectRates {
    pub missing_cost: f64,
    pub negative_cost: f64,
    pub malformed_location: f64,
    pub duplicate_id: f64,
    pub alternate_date_format: f64,
    pub missing_date: f64,
    pub malformed_date: f64,
    pub out_of_range_date: f64,
    pub status_mislabel: f64,
    pub missing_status: f64,
    pub status_label_variant: f64,
    pub messy_carrier: f64,
    pub blank_carrier: f64,
}

impl Default for DefectRates {
    fn default() -> Self {
        Self {
            missing_cost: 0.04,
            negative_cost: 0.05,
            malformed_location: 0.05,
            duplicate_id: 0.01,
            alternate_date_format: 0.10,
            missing_date: 0.10,
            malformed_date: 0.02,
            out_of_range_date: 0.01,
            status_mislabel: 0.03,
            missing_status: 0.10,
            status_label_variant: 0.20,
            messy_carrier: 0.15,
            blank_carrier: 0.02,
        }
    }
}

impl DefectRates {
    /// Clean data: every rate zero
    pub fn none() -> Self {
        Self {
            missing_cost: 0.0,
            negative_cost: 0.0,
            malformed_location: 0.0,
            duplicate_id: 0.0,
            alternate_date_format: 0.0,
            missing_date: 0.0,
            malformed_date: 0.0,
            out_of_range_date: 0.0,
            status_mislabel: 0.0,
            missing_status: 0.0,
            status_label_variant: 0.0,
            messy_carrier: 0.0,
            blank_carrier: 0.0,
        }
    }

    fn named(&self) -> [(&'static str, f64); 13] {
        [
            ("missing_cost", self.missing_cost),
            ("negative_cost", self.negative_cost),
            ("malformed_location", self.malformed_location),
            ("duplicate_id", self.duplicate_id),
            ("alternate_date_format", self.alternate_date_format),
            ("missing_date", self.missing_date),
            ("malformed_date", self.malformed_date),
            ("out_of_range_date", self.out_of_range_date),
            ("status_mislabel", self.status_mislabel),
            ("missing_status", self.missing_status),
            ("status_label_variant", self.status_label_variant),
            ("messy_carrier", self.messy_carrier),
            ("blank_carrier", self.blank_carrier),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        for (name, rate) in self.named() {
            if !(0.0..=1.0).contains(&rate) {
                return Err(EtlError::Config(format!(
                    "defect rate '{name}' must be within [0, 1], got {rate}"
                )));
            }
        }
        let date_total = self.alternate_date_format
            + self.missing_date
            + self.malformed_date
            + self.out_of_range_date;
        if date_total > 1.0 {
            return Err(EtlError::Config(format!(
                "ship-date defect rates sum to {date_total}, which exceeds 1"
            )));
        }
        Ok(())
    }
}

/// Which row got which defect
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefectLedger {
    entries: Vec<InjectedDefect>,
}

impl DefectLedger {
    pub fn record(&mut self, row: usize, defect: Defect) {
        self.entries.push(InjectedDefect { row, defect });
    }

    pub fn entries(&self) -> &[InjectedDefect] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn rows_with(&self, defect: Defect) -> BTreeSet<usize> {
        self.entries
            .iter()
            .filter(|e| e.defect == defect)
            .map(|e| e.row)
            .collect()
    }

    pub fn count(&self, defect: Defect) -> usize {
        self.entries.iter().filter(|e| e.defect == defect).count()
    }
}

pub(crate) fn mangle_state_code<R: Rng>(rng: &mut R, state: &str) -> String {
    match rng.gen_range(0..6) {
        0 => state.to_ascii_lowercase(),
        1 => state.chars().map(|c| format!("{c}.")).collect(),
        2 => format!("  {} ", state.to_ascii_lowercase()),
        3 => "XX".to_string(),
        4 => "??".to_string(),
        _ => String::new(),
    }
}

pub(crate) fn mangle_carrier<R: Rng>(rng: &mut R, name: &str) -> String {
    match rng.gen_range(0..3) {
        0 => name.to_ascii_lowercase(),
        1 => name.to_ascii_uppercase(),
        _ => format!("  {}  ", name.split_whitespace().collect::<Vec<_>>().join("   ")),
    }
}

pub(crate) fn garbage_date<R: Rng>(rng: &mut R, year: i32, month: u32, day: u32) -> String {
    const PLACEHOLDERS: [&str; 4] = ["N/A", "TBD", "pending", "00-00-0000"];
    match rng.gen_range(0..4) {
        0 => PLACEHOLDERS.choose(rng).copied().unwrap_or("N/A").to_string(),
        1 => format!("{year}/{month:02}/{day:02}"),
        2 => format!("{year}-13-{day:02}"),
        _ => format!("{day:02}.{month:02}.{year}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rates_are_valid() {
        assert!(DefectRates::default().validate().is_ok());
        assert!(DefectRates::none().validate().is_ok());
    }

    #[test]
    fn out_of_bounds_rate_is_a_config_error() {
        let rates = DefectRates { missing_cost: 1.5, ..DefectRates::none() };
        let err = rates.validate().unwrap_err();
        assert!(err.to_string().contains("missing_cost"));
    }

    #[test]
    fn date_defects_must_fit_in_one_roll() {
        let rates = DefectRates {
            missing_date: 0.6,
            malformed_date: 0.6,
            ..DefectRates::none()
        };
        assert!(matches!(rates.validate(), Err(EtlError::Config(_))));
    }

    #[test]
    fn ledger_groups_rows_by_defect() {
        let mut ledger = DefectLedger::default();
        ledger.record(3, Defect::MalformedDate);
        ledger.record(1, Defect::MalformedDate);
        ledger.record(3, Defect::MissingCost);
        assert_eq!(ledger.rows_with(Defect::MalformedDate).into_iter().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(ledger.count(Defect::MissingCost), 1);
        assert_eq!(ledger.count(Defect::DuplicateId), 0);
    }
}
