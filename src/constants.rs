//! Reference catalogs shared by the generator and the cleaner.
//! The generator draws from them and the cleaner resolves messy values against them.

/// Cities the generator ships between, with their canonical state codes.
pub const CITY_GAZETTEER: &[(&str, &str)] = &[
    ("New York", "NY"),
    ("Los Angeles", "CA"),
    ("Chicago", "IL"),
    ("Houston", "TX"),
    ("Phoenix", "AZ"),
    ("Philadelphia", "PA"),
    ("San Antonio", "TX"),
    ("San Diego", "CA"),
    ("Dallas", "TX"),
    ("San Jose", "CA"),
    ("Miami", "FL"),
    ("Denver", "CO"),
    ("Seattle", "WA"),
    ("Boston", "MA"),
    ("Atlanta", "GA"),
];

/// Carrier names as they appear in the warehouse.
pub const SPEEDY_SHIP: &str = "SpeedyShip";
pub const RELIABLE_FREIGHT: &str = "Reliable Freight";
pub const GLOBAL_CARGO: &str = "Global Cargo";
pub const QUICK_HAUL: &str = "Quick Haul";

/// Stand-in for shipments whose carrier was never recorded
pub const UNKNOWN_CARRIER: &str = "Unknown";

pub fn known_carriers() -> Vec<&'static str> {
    vec![SPEEDY_SHIP, RELIABLE_FREIGHT, GLOBAL_CARGO, QUICK_HAUL]
}

/// USPS codes for the 50 states plus DC
pub const US_STATE_CODES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN",
    "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH",
    "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT",
    "VT", "VA", "WA", "WV", "WI", "WY",
];

pub const SHIPMENT_ID_PREFIX: &str = "SHP";
pub const SHIPMENT_ID_BASE: usize = 100_000;

/// Date and timestamp layouts used on the raw side
pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";
pub const DAY_FIRST_DATE_FORMAT: &str = "%d-%m-%Y";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn is_us_state_code(code: &str) -> bool {
    US_STATE_CODES.contains(&code)
}

/// Look up the canonical spelling and state of a known city (case-insensitive)
pub fn lookup_city(city: &str) -> Option<(&'static str, &'static str)> {
    let needle = city.trim();
    CITY_GAZETTEER
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(needle))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gazetteer_states_are_valid_codes() {
        for (city, state) in CITY_GAZETTEER {
            assert!(is_us_state_code(state), "{city} has bad state {state}");
        }
    }

    #[test]
    fn lookup_city_ignores_case_and_padding() {
        assert_eq!(lookup_city("  new york "), Some(("New York", "NY")));
        assert_eq!(lookup_city("Springfield"), None);
    }
}
