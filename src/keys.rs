//! Cache and dedupe keys.
//!
//! A vicinity key buckets nearby coordinates into one cache slot by rounding,
//! and a place identity key collapses differently formatted copies of the
//! same place into one dedupe slot.

use crate::common::parse_coordinate;
use crate::places::PlaceCandidate;

const NON_NUMERIC_COORDINATE: &str = "NA";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VicinityParams {
    pub precision: u32,
    pub radius_meters: u32,
    pub result_limit: u32,
}

/// `{pin}|{lat}|{lon}|r{radius}|n{limit}` with lat/lon rounded to `precision`
/// decimals. The binary value of the parsed coordinate is rounded to the
/// nearest decimal, so `12.9715` becomes `12.972` and `77.5915` becomes
/// `77.591`. Unparseable coordinates become `NA`.
pub fn vicinity_key(lat: &str, lon: &str, pin: &str, params: &VicinityParams) -> String {
    format!(
        "{}|{}|{}|r{}|n{}",
        pin.trim(),
        round_coordinate(lat, params.precision),
        round_coordinate(lon, params.precision),
        params.radius_meters,
        params.result_limit
    )
}

fn round_coordinate(raw: &str, precision: u32) -> String {
    let Some(value) = parse_coordinate(raw) else {
        return NON_NUMERIC_COORDINATE.to_string();
    };
    let rounded = format!("{:.*}", precision as usize, value);
    match rounded.strip_prefix('-') {
        Some(magnitude) if magnitude.chars().all(|c| c == '0' || c == '.') => {
            magnitude.to_string()
        }
        _ => rounded,
    }
}

/// `cid:<id>` when the provider id is present, else `na:<name>|<address>`.
pub fn place_identity_key(candidate: &PlaceCandidate) -> String {
    if let Some(cid) = candidate
        .cid
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return format!("cid:{cid}");
    }
    format!(
        "na:{}|{}",
        normalize_key_text(&candidate.title),
        normalize_key_text(&candidate.address)
    )
}

fn normalize_key_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> VicinityParams {
        VicinityParams {
            precision: 3,
            radius_meters: 100,
            result_limit: 20,
        }
    }

    fn candidate(title: &str, address: &str, cid: Option<&str>) -> PlaceCandidate {
        PlaceCandidate {
            title: title.into(),
            address: address.into(),
            cid: cid.map(Into::into),
            ..PlaceCandidate::default()
        }
    }

    #[test]
    fn nearby_coordinates_share_a_key() {
        let a = vicinity_key("12.97123", "77.59145", "560001", &params());
        let b = vicinity_key("12.9712", "77.5915", "560001", &params());
        assert_eq!(a, b);
        assert_eq!(a, "560001|12.971|77.591|r100|n20");
        assert_eq!(a, vicinity_key("12.97123", "77.59145", "560001", &params()));
    }

    #[test]
    fn rounding_follows_binary_value_at_the_boundary() {
        let key = vicinity_key("12.9715", "77.5915", "1", &params());
        assert_eq!(key, "1|12.972|77.591|r100|n20");
    }

    #[test]
    fn search_parameters_split_keys() {
        let base = vicinity_key("12.9716", "77.5946", "560001", &params());
        let other_pin = vicinity_key("12.9716", "77.5946", "560002", &params());
        let wider = vicinity_key(
            "12.9716",
            "77.5946",
            "560001",
            &VicinityParams {
                radius_meters: 500,
                ..params()
            },
        );
        assert_ne!(base, other_pin);
        assert_ne!(base, wider);
    }

    #[test]
    fn non_numeric_coordinates_use_sentinel() {
        assert_eq!(
            vicinity_key("n/a", "", " 560001 ", &params()),
            "560001|NA|NA|r100|n20"
        );
    }

    #[test]
    fn negative_zero_is_normalized() {
        assert_eq!(
            vicinity_key("-0.0001", "0.0001", "x", &params()),
            "x|0.000|0.000|r100|n20"
        );
        assert_eq!(
            vicinity_key("-12.3456", "1", "x", &params()),
            "x|-12.346|1.000|r100|n20"
        );
    }

    #[test]
    fn identity_prefers_trimmed_cid() {
        let c = candidate("City Hospital", "MG Road", Some("  X1 "));
        assert_eq!(place_identity_key(&c), "cid:X1");
    }

    #[test]
    fn identity_fallback_is_case_and_whitespace_insensitive() {
        let a = candidate("  City   Hospital ", "MG Road,  Bengaluru", Some("   "));
        let b = candidate("city hospital", "mg road, bengaluru", None);
        assert_eq!(place_identity_key(&a), place_identity_key(&b));
        assert_eq!(
            place_identity_key(&b),
            "na:city hospital|mg road, bengaluru"
        );
    }

    #[test]
    fn key_spaces_do_not_collide() {
        let by_cid = candidate("", "", Some("na:x|y"));
        let by_name = candidate("x", "y", None);
        assert_ne!(place_identity_key(&by_cid), place_identity_key(&by_name));
    }
}
