use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

use crate::domain::{Cost, RawShipment, StarSchema};
use crate::observability::metrics;

use super::clean::{validate_row, CleanShipment, CostField, RejectReason, RowRejection, TransformConfig};
use super::dimensions::DimensionBuilder;

/// One raw row that did not survive cleaning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub row: usize,
    pub shipment_id: Option<String>,
    pub reason: RejectReason,
    pub detail: String,
}

/// Accounting for a transform run. `accepted + rejected == input_rows` always.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformReport {
    pub input_rows: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub rejections_by_reason: BTreeMap<RejectReason, usize>,
    pub rejections: Vec<Rejection>,
    pub imputed_ship_dates: usize,
    pub imputed_locations: usize,
    pub imputed_costs: usize,
    pub corrected_costs: usize,
    pub normalized_carriers: usize,
    pub recoded_statuses: usize,
    pub derived_statuses: usize,
}

impl TransformReport {
    pub fn rejected_for(&self, reason: RejectReason) -> usize {
        self.rejections_by_reason.get(&reason).copied().unwrap_or(0)
    }

    pub fn rejected_rows(&self) -> Vec<usize> {
        self.rejections.iter().map(|r| r.row).collect()
    }

    fn reject(&mut self, row: usize, shipment_id: Option<String>, rejection: RowRejection) {
        debug!("Rejecting row {} ({:?}): {}", row, shipment_id, rejection.detail);
        metrics::transform::row_rejected(rejection.reason);
        *self.rejections_by_reason.entry(rejection.reason).or_default() += 1;
        self.rejections.push(Rejection {
            row,
            shipment_id,
            reason: rejection.reason,
            detail: rejection.detail,
        });
    }
}

#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub schema: StarSchema,
    pub report: TransformReport,
}

/// Turns raw generated rows into a star schema with full rejection accounting
#[derive(Debug, Clone, Default)]
pub struct Transformer {
    config: TransformConfig,
}

impl Transformer {
    pub fn new(config: TransformConfig) -> Self {
        Self { config }
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    pub fn transform(&self, rows: &[RawShipment]) -> TransformOutput {
        let started = std::time::Instant::now();
        let mut report = TransformReport {
            input_rows: rows.len(),
            ..TransformReport::default()
        };

        // First occurrence of an id wins, whatever happens to it afterwards
        let mut seen_ids: HashSet<&str> = HashSet::new();
        let mut clean: Vec<CleanShipment> = Vec::with_capacity(rows.len());

        for (row, raw) in rows.iter().enumerate() {
            if let Some(id) = raw.shipment_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
                if !seen_ids.insert(id) {
                    report.reject(
                        row,
                        Some(id.to_string()),
                        RowRejection {
                            reason: RejectReason::DuplicateId,
                            detail: format!("{id} already seen earlier in the batch"),
                        },
                    );
                    continue;
                }
            }

            match validate_row(row, raw, &self.config) {
                Ok(shipment) => clean.push(shipment),
                Err(rejection) => report.reject(row, raw.shipment_id.clone(), rejection),
            }
        }

        let costed = self.impute_costs(clean, &mut report);

        for (shipment, _) in &costed {
            report.imputed_ship_dates += usize::from(shipment.ship_date_imputed);
            report.imputed_locations +=
                usize::from(shipment.origin.imputed) + usize::from(shipment.destination.imputed);
            report.normalized_carriers += usize::from(shipment.carrier_normalized);
            report.recoded_statuses += usize::from(shipment.status_recoded);
            report.derived_statuses += usize::from(shipment.status_derived);
        }

        report.rejections.sort_by_key(|r| r.row);
        report.accepted = costed.len();
        report.rejected = report.rejections.len();

        let schema = DimensionBuilder::new().build(&costed);

        info!(
            "Transformed {} rows: {} accepted, {} rejected ({} locations, {} carriers, {} dates)",
            report.input_rows,
            report.accepted,
            report.rejected,
            schema.locations.len(),
            schema.carriers.len(),
            schema.dates.len()
        );
        if report.recoded_statuses > 0 {
            info!("Recoded {} inconsistent statuses", report.recoded_statuses);
        }
        metrics::transform::rows_accepted(report.accepted);
        metrics::transform::statuses_recoded(report.recoded_statuses);
        metrics::transform::values_imputed("cost", report.imputed_costs);
        metrics::transform::values_imputed("ship_date", report.imputed_ship_dates);
        metrics::transform::values_imputed("location", report.imputed_locations);
        metrics::stage_completed("transform", started.elapsed().as_secs_f64());

        TransformOutput { schema, report }
    }

    /// Fill missing costs with the carrier median, then the global median.
    /// Rows with no reference cost at all are rejected.
    fn impute_costs(
        &self,
        clean: Vec<CleanShipment>,
        report: &mut TransformReport,
    ) -> Vec<(CleanShipment, Cost)> {
        let mut by_carrier: HashMap<&str, Vec<i64>> = HashMap::new();
        let mut all: Vec<i64> = Vec::new();
        for shipment in &clean {
            if let CostField::Valid(cost) | CostField::Corrected(cost) = shipment.cost {
                by_carrier.entry(shipment.carrier.as_str()).or_default().push(cost.cents());
                all.push(cost.cents());
            }
        }
        let carrier_medians: HashMap<String, i64> = by_carrier
            .into_iter()
            .filter_map(|(carrier, mut cents)| median(&mut cents).map(|m| (carrier.to_string(), m)))
            .collect();
        let global_median = median(&mut all);

        let mut costed = Vec::with_capacity(clean.len());
        for shipment in clean {
            let cost = match shipment.cost {
                CostField::Valid(cost) => cost,
                CostField::Corrected(cost) => {
                    report.corrected_costs += 1;
                    cost
                }
                CostField::Missing => {
                    match carrier_medians.get(&shipment.carrier).copied().or(global_median) {
                        Some(cents) => {
                            report.imputed_costs += 1;
                            Cost::from_cents(cents)
                        }
                        None => {
                            warn!("No reference cost available for {}", shipment.shipment_id);
                            report.reject(
                                shipment.row,
                                Some(shipment.shipment_id.clone()),
                                RowRejection {
                                    reason: RejectReason::MissingCost,
                                    detail: "cost missing and no median to impute from".to_string(),
                                },
                            );
                            continue;
                        }
                    }
                }
            };
            costed.push((shipment, cost));
        }
        costed
    }
}

/// Median in cents; even counts take the floor of the two middle values' mean
fn median(values: &mut [i64]) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        let (low, high) = (values[mid - 1], values[mid]);
        Some(low + (high - low).div_euclid(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ShipmentStatus;

    fn row(id: &str, carrier: &str, cost: Option<&str>) -> RawShipment {
        RawShipment {
            shipment_id: Some(id.to_string()),
            ship_date: Some("2024-01-01".into()),
            lead_time_days: Some(3),
            planned_delivery: Some("2024-01-04T10:00:00".into()),
            actual_delivery: Some("2024-01-04T09:00:00".into()),
            origin_city: Some("Chicago".into()),
            origin_state: Some("IL".into()),
            destination_city: Some("Dallas".into()),
            destination_state: Some("TX".into()),
            shipping_cost: cost.map(str::to_string),
            carrier_name: Some(carrier.to_string()),
            status: Some("On-Time".into()),
        }
    }

    #[test]
    fn median_handles_odd_and_even_counts() {
        assert_eq!(median(&mut []), None);
        assert_eq!(median(&mut [5, 1, 3]), Some(3));
        assert_eq!(median(&mut [4, 1, 3, 2]), Some(2));
        assert_eq!(median(&mut [i64::MAX, i64::MAX - 2]), Some(i64::MAX - 1));
    }

    #[test]
    fn oversized_costs_do_not_overflow_the_median() {
        let rows = vec![
            row("A", "SpeedyShip", Some("99999999999999999999999")),
            row("B", "SpeedyShip", Some("99999999999999999999999")),
            row("C", "SpeedyShip", Some("NaN")),
            row("D", "Quick Haul", Some("-99999999999999999999999")),
        ];
        let out = Transformer::default().transform(&rows);
        assert_eq!(out.report.accepted + out.report.rejected, 4);
        assert_eq!(out.report.rejected_for(RejectReason::MissingCost), 4);
        assert!(out.schema.facts.is_empty());
    }

    #[test]
    fn out_of_window_planned_dates_never_reach_the_date_dimension() {
        let mut first = row("A", "SpeedyShip", Some("10.00"));
        first.planned_delivery = Some("-0001-01-04T10:00:00".into());
        first.actual_delivery = None;
        let mut second = row("B", "SpeedyShip", Some("10.00"));
        second.planned_delivery = Some("-0002-01-04T10:00:00".into());
        second.actual_delivery = None;

        let out = Transformer::default().transform(&[first, second, row("C", "SpeedyShip", Some("10.00"))]);
        assert_eq!(out.report.rejected_for(RejectReason::InvalidTimestamp), 2);
        assert_eq!(out.report.accepted, 1);
        assert!(out.schema.integrity_violations().is_empty());
    }

    #[test]
    fn duplicates_keep_the_first_occurrence() {
        let mut second = row("SHP-1", "Quick Haul", Some("99.00"));
        second.origin_city = Some("Miami".into());
        second.origin_state = Some("FL".into());
        let rows = vec![row("SHP-1", "SpeedyShip", Some("10.00")), second, row("SHP-2", "SpeedyShip", Some("20.00"))];

        let out = Transformer::default().transform(&rows);
        assert_eq!(out.report.accepted, 2);
        assert_eq!(out.report.rejected_for(RejectReason::DuplicateId), 1);
        assert_eq!(out.report.rejected_rows(), vec![1]);
        let kept = out.schema.facts.iter().find(|f| f.shipment_id == "SHP-1").unwrap();
        assert_eq!(kept.cost, Cost(1000));
        assert_eq!(out.schema.location(kept.origin_location_id).unwrap().city, "Chicago");
    }

    #[test]
    fn duplicate_of_a_rejected_row_is_still_a_duplicate() {
        let mut first = row("SHP-1", "SpeedyShip", Some("10.00"));
        first.ship_date = Some("not a date".into());
        let rows = vec![first, row("SHP-1", "SpeedyShip", Some("10.00"))];

        let out = Transformer::default().transform(&rows);
        assert_eq!(out.report.accepted, 0);
        assert_eq!(out.report.rejected_for(RejectReason::InvalidDate), 1);
        assert_eq!(out.report.rejected_for(RejectReason::DuplicateId), 1);
    }

    #[test]
    fn missing_cost_takes_the_carrier_median() {
        let rows = vec![
            row("A", "SpeedyShip", Some("10.00")),
            row("B", "SpeedyShip", Some("30.00")),
            row("C", "Quick Haul", Some("500.00")),
            row("D", "speedyship", None),
            row("E", "Acme", Some("NaN")),
        ];
        let out = Transformer::default().transform(&rows);
        assert_eq!(out.report.imputed_costs, 2);
        let cost_of = |id: &str| out.schema.facts.iter().find(|f| f.shipment_id == id).unwrap().cost;
        assert_eq!(cost_of("D"), Cost(2000));
        // Acme has no costs of its own; falls back to the global median of 10, 30, 500
        assert_eq!(cost_of("E"), Cost(3000));
    }

    #[test]
    fn negative_costs_are_made_absolute() {
        let out = Transformer::default().transform(&[row("A", "SpeedyShip", Some("-42.10"))]);
        assert_eq!(out.report.corrected_costs, 1);
        assert_eq!(out.schema.facts[0].cost, Cost(4210));
    }

    #[test]
    fn no_reference_cost_means_rejection() {
        let out = Transformer::default().transform(&[row("A", "SpeedyShip", None)]);
        assert_eq!(out.report.accepted, 0);
        assert_eq!(out.report.rejected_for(RejectReason::MissingCost), 1);
        assert!(out.schema.facts.is_empty());
        assert!(out.schema.locations.is_empty());
    }

    #[test]
    fn on_time_label_with_late_delivery_is_recoded() {
        let mut late = row("A", "SpeedyShip", Some("10.00"));
        late.planned_delivery = Some("2024-01-01T10:00:00".into());
        late.actual_delivery = Some("2024-01-01T12:00:00".into());
        late.status = Some("on-time".into());

        let out = Transformer::default().transform(&[late]);
        assert_eq!(out.schema.facts[0].status, ShipmentStatus::Delayed);
        assert_eq!(out.report.recoded_statuses, 1);
    }

    #[test]
    fn dimensions_only_hold_referenced_values_with_stable_ids() {
        let rows = vec![row("A", "SpeedyShip", Some("10.00")), row("B", "Global Cargo", Some("12.00"))];
        let forward = Transformer::default().transform(&rows);
        let reversed: Vec<_> = rows.iter().rev().cloned().collect();
        let backward = Transformer::default().transform(&reversed);

        assert_eq!(forward.schema.locations, backward.schema.locations);
        assert_eq!(forward.schema.carriers, backward.schema.carriers);
        assert_eq!(forward.schema.dates, backward.schema.dates);

        let names: Vec<_> = forward.schema.carriers.iter().map(|c| (c.id, c.name.as_str())).collect();
        assert_eq!(names, vec![(1, "Global Cargo"), (2, "SpeedyShip")]);
        assert_eq!(forward.schema.locations.len(), 2);
        // ship date, planned date; actual falls on the planned day
        assert_eq!(forward.schema.dates.len(), 2);
        assert!(forward.schema.integrity_violations().is_empty());
    }

    #[test]
    fn counts_always_balance() {
        let mut bad = row("B", "SpeedyShip", Some("1.00"));
        bad.origin_city = None;
        let rows = vec![row("A", "SpeedyShip", Some("1.00")), bad, RawShipment::default()];
        let out = Transformer::default().transform(&rows);
        assert_eq!(out.report.accepted + out.report.rejected, out.report.input_rows);
        assert_eq!(out.report.rejected_for(RejectReason::InvalidLocation), 1);
        assert_eq!(out.report.rejected_for(RejectReason::MissingId), 1);
    }
}
