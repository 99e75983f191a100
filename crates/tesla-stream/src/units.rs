//! Unit conversions for vehicle telemetry
//!
//! The streaming feed reports imperial units (miles, mph, Fahrenheit);
//! everything published to MQTT is metric. Conversions round to two
//! decimals and return `None` for absent or unparseable input rather
//! than failing, so a single bad value never poisons a data frame.

/// Round to two decimal places
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Convert miles to kilometers
///
/// Also used for mph → km/h, which is the same factor.
pub fn miles_to_km(miles: f64) -> f64 {
    round2(miles * 1.60934)
}

/// Convert a loosely-typed distance value to kilometers
///
/// Accepts the textual form a wire value may arrive in. Returns `None`
/// for `None`, empty strings, and anything that does not parse as a number.
pub fn miles_to_km_str(miles: Option<&str>) -> Option<f64> {
    parse_loose(miles).map(miles_to_km)
}

/// Convert Fahrenheit to Celsius
pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    round2((f - 32.0) * 5.0 / 9.0)
}

/// Convert a loosely-typed temperature value to Celsius
///
/// Same absence/parse-failure contract as [`miles_to_km_str`].
pub fn fahrenheit_to_celsius_str(f: Option<&str>) -> Option<f64> {
    parse_loose(f).map(fahrenheit_to_celsius)
}

fn parse_loose(value: Option<&str>) -> Option<f64> {
    let text = value?.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miles_to_km() {
        assert_eq!(miles_to_km(100.0), 160.93);
        assert_eq!(miles_to_km(0.0), 0.0);
        assert_eq!(miles_to_km(1.0), 1.61);
    }

    #[test]
    fn test_miles_to_km_str() {
        assert_eq!(miles_to_km_str(Some("100")), Some(160.93));
        assert_eq!(miles_to_km_str(Some("0")), Some(0.0));
        assert_eq!(miles_to_km_str(None), None);
        assert_eq!(miles_to_km_str(Some("")), None);
        assert_eq!(miles_to_km_str(Some("invalid")), None);
    }

    #[test]
    fn test_fahrenheit_to_celsius() {
        assert_eq!(fahrenheit_to_celsius(32.0), 0.0);
        assert_eq!(fahrenheit_to_celsius(100.0), 37.78);
        assert_eq!(fahrenheit_to_celsius(212.0), 100.0);
    }

    #[test]
    fn test_fahrenheit_to_celsius_str() {
        assert_eq!(fahrenheit_to_celsius_str(Some("32")), Some(0.0));
        assert_eq!(fahrenheit_to_celsius_str(None), None);
        assert_eq!(fahrenheit_to_celsius_str(Some("")), None);
        assert_eq!(fahrenheit_to_celsius_str(Some("invalid")), None);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(37.777_777), 37.78);
        assert_eq!(round2(1.004), 1.0);
        assert_eq!(round2(-0.125), -0.13);
    }
}
