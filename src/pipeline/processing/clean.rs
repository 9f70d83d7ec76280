//! Field-level cleaning rules and the validated record they produce.
//!
//! [`validate_row`] is the transform boundary: a [`RawShipment`] either
//! becomes a [`CleanShipment`] or is rejected with a [`RejectReason`].
//! Cost imputation needs the whole batch and happens later in the transformer.

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{
    is_us_state_code, known_carriers, lookup_city, DAY_FIRST_DATE_FORMAT, ISO_DATE_FORMAT,
    TIMESTAMP_FORMAT, UNKNOWN_CARRIER,
};
use crate::domain::{Cost, RawShipment, ShipmentStatus};
use crate::error::{EtlError, Result};

static STATE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{2}$").unwrap());
static DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").unwrap());

/// Costs above this many cents are treated as unreadable
pub const MAX_COST_CENTS: i64 = 100_000_000_000;

/// Date keys are `YYYYMMDD`, so the window has to stay within four-digit years
const MIN_WINDOW_YEAR: i32 = 1;
const MAX_WINDOW_YEAR: i32 = 9999;

const TIMESTAMP_FALLBACK_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"];

/// Ship dates outside this window are treated as unparseable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            valid_from: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN),
            valid_to: NaiveDate::from_ymd_opt(2099, 12, 31).unwrap_or(NaiveDate::MAX),
        }
    }
}

impl TransformConfig {
    pub fn validate(&self) -> Result<()> {
        if self.valid_from > self.valid_to {
            return Err(EtlError::Config(format!(
                "valid_from {} is after valid_to {}",
                self.valid_from, self.valid_to
            )));
        }
        for bound in [self.valid_from, self.valid_to] {
            if !(MIN_WINDOW_YEAR..=MAX_WINDOW_YEAR).contains(&bound.year()) {
                return Err(EtlError::Config(format!(
                    "validity window bound {bound} must lie within years {MIN_WINDOW_YEAR}..={MAX_WINDOW_YEAR}"
                )));
            }
        }
        Ok(())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.valid_from && date <= self.valid_to
    }
}

/// Why a raw row did not make it into the fact table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MissingId,
    DuplicateId,
    InvalidDate,
    InvalidLocation,
    InvalidTimestamp,
    MissingStatus,
    MissingCost,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MissingId => "missing_id",
            RejectReason::DuplicateId => "duplicate_id",
            RejectReason::InvalidDate => "invalid_date",
            RejectReason::InvalidLocation => "invalid_location",
            RejectReason::InvalidTimestamp => "invalid_timestamp",
            RejectReason::MissingStatus => "missing_status",
            RejectReason::MissingCost => "missing_cost",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected row and what was wrong with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRejection {
    pub reason: RejectReason,
    pub detail: String,
}

impl RowRejection {
    fn new(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResolvedLocation {
    pub city: String,
    pub state: String,
    /// State code came from the city gazetteer rather than the row
    pub imputed: bool,
}

/// Outcome of reading the raw cost column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostField {
    Valid(Cost),
    /// Negative in the source; holds the absolute value
    Corrected(Cost),
    Missing,
}

/// A row that passed every per-row check. Only `cost` may still be absent.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanShipment {
    pub row: usize,
    pub shipment_id: String,
    pub ship_date: NaiveDate,
    pub ship_date_imputed: bool,
    pub planned_delivery: NaiveDateTime,
    pub actual_delivery: Option<NaiveDateTime>,
    pub origin: ResolvedLocation,
    pub destination: ResolvedLocation,
    pub carrier: String,
    pub carrier_normalized: bool,
    pub cost: CostField,
    pub status: ShipmentStatus,
    pub status_recoded: bool,
    pub status_derived: bool,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// `%Y-%m-%d`, then the day-first `%d-%m-%Y` layout
pub fn parse_calendar_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, ISO_DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(text, DAY_FIRST_DATE_FORMAT))
        .ok()
}

pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(ts) = NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT) {
        return Some(ts);
    }
    for format in TIMESTAMP_FALLBACK_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(text, ISO_DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Trim, drop dots, upper-case; `None` unless the result is a real state code
pub fn normalize_state_code(raw: &str) -> Option<String> {
    let code: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '.')
        .collect::<String>()
        .to_ascii_uppercase();
    if STATE_CODE.is_match(&code) && is_us_state_code(&code) {
        Some(code)
    } else {
        None
    }
}

pub fn resolve_location(city: Option<&str>, state: Option<&str>) -> Option<ResolvedLocation> {
    let city = non_blank(city)?;
    let known = lookup_city(city);
    let city = known.map(|(name, _)| name.to_string()).unwrap_or_else(|| city.to_string());

    match state.and_then(normalize_state_code) {
        Some(state) => Some(ResolvedLocation {
            city,
            state,
            imputed: false,
        }),
        None => known.map(|(_, state)| ResolvedLocation {
            city,
            state: state.to_string(),
            imputed: true,
        }),
    }
}

/// Canonical carrier name and whether the raw value had to change
pub fn normalize_carrier(raw: Option<&str>) -> (String, bool) {
    let Some(raw) = non_blank(raw) else {
        return (UNKNOWN_CARRIER.to_string(), true);
    };
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let squashed = collapsed.replace(' ', "").to_ascii_lowercase();

    if let Some(known) = known_carriers()
        .into_iter()
        .find(|k| k.replace(' ', "").to_ascii_lowercase() == squashed)
    {
        return (known.to_string(), known != raw);
    }

    let titled = collapsed
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ");
    let changed = titled != raw;
    (titled, changed)
}

pub fn parse_cost(raw: Option<&str>) -> CostField {
    let Some(raw) = non_blank(raw) else {
        return CostField::Missing;
    };
    let stripped: String = raw.chars().filter(|c| *c != '$' && *c != ',').collect();
    if !DECIMAL.is_match(&stripped) {
        return CostField::Missing;
    }
    let Ok(value) = stripped.parse::<f64>() else {
        return CostField::Missing;
    };
    let cents = (value * 100.0).round();
    if !cents.is_finite() || cents.abs() > MAX_COST_CENTS as f64 {
        return CostField::Missing;
    }
    let cents = cents as i64;
    if cents < 0 {
        CostField::Corrected(Cost::from_cents(-cents))
    } else {
        CostField::Valid(Cost::from_cents(cents))
    }
}

/// Reconcile the claimed status with the delivery timestamps.
///
/// Cancelled is kept. Delivered shipments follow the timestamps. Undelivered
/// ones are in transit unless they were already reported delayed.
pub fn derive_status(
    claimed: Option<ShipmentStatus>,
    planned: NaiveDateTime,
    actual: Option<NaiveDateTime>,
) -> ShipmentStatus {
    match (claimed, actual) {
        (Some(ShipmentStatus::Cancelled), _) => ShipmentStatus::Cancelled,
        (_, Some(actual)) if actual <= planned => ShipmentStatus::OnTime,
        (_, Some(_)) => ShipmentStatus::Delayed,
        (Some(ShipmentStatus::Delayed), None) => ShipmentStatus::Delayed,
        (_, None) => ShipmentStatus::InTransit,
    }
}

/// Validate one raw row. Duplicate detection is done by the caller.
pub fn validate_row(
    row: usize,
    raw: &RawShipment,
    config: &TransformConfig,
) -> std::result::Result<CleanShipment, RowRejection> {
    let shipment_id = non_blank(raw.shipment_id.as_deref())
        .ok_or_else(|| RowRejection::new(RejectReason::MissingId, "shipment id is blank"))?
        .to_string();

    let claimed = non_blank(raw.status.as_deref()).and_then(ShipmentStatus::parse_label);

    let planned = match non_blank(raw.planned_delivery.as_deref()) {
        Some(text) => parse_timestamp(text),
        None => None,
    };
    if let Some(planned) = planned.filter(|p| !config.contains(p.date())) {
        return Err(RowRejection::new(
            RejectReason::InvalidTimestamp,
            format!("planned delivery {planned} is outside {}..={}", config.valid_from, config.valid_to),
        ));
    }

    let (ship_date, ship_date_imputed) = match non_blank(raw.ship_date.as_deref()) {
        Some(text) => match parse_calendar_date(text) {
            Some(date) if config.contains(date) => (date, false),
            Some(date) => {
                return Err(RowRejection::new(
                    RejectReason::InvalidDate,
                    format!("ship date {date} is outside {}..={}", config.valid_from, config.valid_to),
                ))
            }
            None => {
                return Err(RowRejection::new(
                    RejectReason::InvalidDate,
                    format!("unparseable ship date '{text}'"),
                ))
            }
        },
        None => match (planned, raw.lead_time_days) {
            (Some(planned), Some(lead)) => {
                match planned.date().checked_sub_days(Days::new(u64::from(lead))) {
                    Some(date) if config.contains(date) => (date, true),
                    _ => {
                        return Err(RowRejection::new(
                            RejectReason::InvalidDate,
                            format!("ship date {lead} days before {planned} is out of range"),
                        ))
                    }
                }
            }
            _ => {
                return Err(RowRejection::new(
                    RejectReason::InvalidDate,
                    "ship date missing and not derivable",
                ))
            }
        },
    };

    let origin = resolve_location(raw.origin_city.as_deref(), raw.origin_state.as_deref())
        .ok_or_else(|| {
            RowRejection::new(
                RejectReason::InvalidLocation,
                format!("unresolvable origin {:?}/{:?}", raw.origin_city, raw.origin_state),
            )
        })?;
    let destination =
        resolve_location(raw.destination_city.as_deref(), raw.destination_state.as_deref())
            .ok_or_else(|| {
                RowRejection::new(
                    RejectReason::InvalidLocation,
                    format!(
                        "unresolvable destination {:?}/{:?}",
                        raw.destination_city, raw.destination_state
                    ),
                )
            })?;

    let (carrier, carrier_normalized) = normalize_carrier(raw.carrier_name.as_deref());

    let planned = match planned {
        Some(planned) => planned,
        None if claimed.is_none() => {
            return Err(RowRejection::new(
                RejectReason::MissingStatus,
                "status missing and planned delivery unavailable",
            ))
        }
        None => {
            return Err(RowRejection::new(
                RejectReason::InvalidTimestamp,
                format!("bad planned delivery {:?}", raw.planned_delivery),
            ))
        }
    };

    let actual = match non_blank(raw.actual_delivery.as_deref()) {
        Some(text) => Some(parse_timestamp(text).ok_or_else(|| {
            RowRejection::new(
                RejectReason::InvalidTimestamp,
                format!("unparseable actual delivery '{text}'"),
            )
        })?),
        None => None,
    };
    if let Some(actual) = actual.filter(|a| !config.contains(a.date())) {
        return Err(RowRejection::new(
            RejectReason::InvalidTimestamp,
            format!("actual delivery {actual} is outside {}..={}", config.valid_from, config.valid_to),
        ));
    }

    let status = derive_status(claimed, planned, actual);

    Ok(CleanShipment {
        row,
        shipment_id,
        ship_date,
        ship_date_imputed,
        planned_delivery: planned,
        actual_delivery: actual,
        origin,
        destination,
        carrier,
        carrier_normalized,
        cost: parse_cost(raw.shipping_cost.as_deref()),
        status,
        status_recoded: claimed.map(|c| c != status).unwrap_or(false),
        status_derived: claimed.is_none(),
    })
}
