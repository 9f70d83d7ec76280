use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{date_key, Carrier, Cost, DateDim, FactShipment, Location, StarSchema};

use super::clean::CleanShipment;

/// Builds the star schema from rows that survived cleaning and cost
/// imputation. Ids follow sorted natural-key order so they are stable
/// across runs over the same surviving facts.
#[derive(Debug, Default)]
pub struct DimensionBuilder {
    locations: BTreeSet<(String, String)>,
    carriers: BTreeSet<String>,
    dates: BTreeSet<NaiveDate>,
}

impl DimensionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn observe(&mut self, shipment: &CleanShipment) {
        for loc in [&shipment.origin, &shipment.destination] {
            self.locations.insert((loc.city.clone(), loc.state.clone()));
        }
        self.carriers.insert(shipment.carrier.clone());
        self.dates.insert(shipment.ship_date);
        self.dates.insert(shipment.planned_delivery.date());
        if let Some(actual) = shipment.actual_delivery {
            self.dates.insert(actual.date());
        }
    }

    /// `shipments` pairs each clean row with its final cost
    pub fn build(mut self, shipments: &[(CleanShipment, Cost)]) -> StarSchema {
        for (shipment, _) in shipments {
            self.observe(shipment);
        }

        let location_ids: BTreeMap<(String, String), u32> = self
            .locations
            .iter()
            .cloned()
            .zip(1u32..)
            .collect();
        let carrier_ids: BTreeMap<String, u32> = self.carriers.iter().cloned().zip(1u32..).collect();

        let facts = shipments
            .iter()
            .zip(1u32..)
            .map(|((s, cost), fact_id)| FactShipment {
                fact_id,
                shipment_id: s.shipment_id.clone(),
                ship_date_key: date_key(s.ship_date),
                planned_date_key: date_key(s.planned_delivery.date()),
                actual_date_key: s.actual_delivery.map(|a| date_key(a.date())),
                origin_location_id: location_ids[&(s.origin.city.clone(), s.origin.state.clone())],
                destination_location_id: location_ids
                    [&(s.destination.city.clone(), s.destination.state.clone())],
                carrier_id: carrier_ids[&s.carrier],
                cost: *cost,
                status: s.status,
                planned_delivery: s.planned_delivery,
                actual_delivery: s.actual_delivery,
            })
            .collect();

        StarSchema {
            locations: location_ids
                .into_iter()
                .map(|((city, state), id)| Location { id, city, state })
                .collect(),
            carriers: carrier_ids
                .into_iter()
                .map(|(name, id)| Carrier { id, name })
                .collect(),
            dates: self.dates.into_iter().map(DateDim::from_date).collect(),
            facts,
        }
    }
}
