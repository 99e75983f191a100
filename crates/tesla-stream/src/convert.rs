//! Field value normalization
//!
//! Converts a raw tagged wire value into its MQTT-ready form: canonical
//! topic, typed value, and formatted payload string. Normalization applies
//! type coercion per the field's semantic type, then domain conversion per
//! its category (miles → km, mph → km/h, °F → °C), then formatting.
//!
//! A normalized value with an empty `formatted` string must not be
//! published; that is how invalid and unconvertible values are suppressed
//! without affecting the rest of the data frame.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::fields::{
    distance_topic, is_location_field, speed_topic, FieldCategory, FieldKind, FieldRegistry,
};
use crate::units::{fahrenheit_to_celsius, miles_to_km, round2};

/// Prefix stripped from gear shift state values (`ShiftStateP` → `P`)
const SHIFT_STATE_PREFIX: &str = "ShiftState";

/// Temperatures above this are assumed Fahrenheit; at or below, already
/// Celsius. Downstream consumers depend on the exact threshold.
const FAHRENHEIT_THRESHOLD: f64 = 50.0;

// ============================================================================
// Wire and normalized forms
// ============================================================================

/// A tagged value as received on the wire
///
/// At most one tag is populated per instance. A value with `invalid` set
/// is accepted but yields no publishable output.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawFieldValue {
    /// Marks the value as not publishable
    pub invalid: Option<bool>,
    /// Textual value
    pub string_value: Option<String>,
    /// Double-precision value
    pub double_value: Option<f64>,
    /// Integer value
    pub int_value: Option<i64>,
    /// Boolean value
    pub bool_value: Option<bool>,
    /// Generic numeric value
    pub number_value: Option<f64>,
    /// Structured location value
    pub location_value: Option<serde_json::Value>,
    /// Gear shift state value
    pub shift_state_value: Option<String>,
}

impl RawFieldValue {
    /// Wire value carrying a string tag
    pub fn string(value: impl Into<String>) -> Self {
        RawFieldValue {
            string_value: Some(value.into()),
            ..Default::default()
        }
    }

    /// Wire value carrying a double tag
    pub fn double(value: f64) -> Self {
        RawFieldValue {
            double_value: Some(value),
            ..Default::default()
        }
    }

    /// Wire value carrying an integer tag
    pub fn int(value: i64) -> Self {
        RawFieldValue {
            int_value: Some(value),
            ..Default::default()
        }
    }

    /// Wire value carrying a boolean tag
    pub fn boolean(value: bool) -> Self {
        RawFieldValue {
            bool_value: Some(value),
            ..Default::default()
        }
    }

    /// Wire value marked invalid
    pub fn invalid() -> Self {
        RawFieldValue {
            invalid: Some(true),
            ..Default::default()
        }
    }
}

/// A typed telemetry value after coercion and conversion
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// No publishable value
    None,
    /// Floating-point value
    Float(f64),
    /// Integer value
    Int(i64),
    /// Boolean value
    Bool(bool),
    /// Textual value
    Text(String),
    /// Structured location value
    Location(serde_json::Value),
}

impl FieldValue {
    /// Numeric view of the value, mirroring loose numeric coercion
    fn as_numeric(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Whether the value is numeric (not a numeric-looking string)
    fn is_number(&self) -> bool {
        matches!(self, FieldValue::Float(_) | FieldValue::Int(_))
    }
}

/// The MQTT-ready form of one field
#[derive(Debug, Clone)]
pub struct NormalizedValue {
    /// Canonical topic suffix to publish under
    pub topic: String,
    /// Typed value after conversion
    pub value: FieldValue,
    /// Payload string; empty exactly when the value must not be published
    pub formatted: String,
}

impl NormalizedValue {
    fn suppressed(topic: String) -> Self {
        NormalizedValue {
            topic,
            value: FieldValue::None,
            formatted: String::new(),
        }
    }

    /// Whether this value must be skipped rather than published
    pub fn is_suppressed(&self) -> bool {
        self.formatted.is_empty()
    }
}

// The single populated wire tag, extracted before coercion
enum Scalar {
    Text(String),
    Float(f64),
    Int(i64),
}

impl Scalar {
    fn textual(&self) -> String {
        match self {
            Scalar::Text(s) => s.clone(),
            Scalar::Float(v) => v.to_string(),
            Scalar::Int(v) => v.to_string(),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Text(s) => s.trim().parse::<f64>().ok(),
            Scalar::Float(v) => Some(*v),
            Scalar::Int(v) => Some(*v as f64),
        }
    }
}

// ============================================================================
// Converter
// ============================================================================

/// Converts raw wire values into normalized, publishable form
#[derive(Clone)]
pub struct FieldConverter {
    registry: Arc<FieldRegistry>,
}

impl FieldConverter {
    /// Create a converter over a shared field registry
    pub fn new(registry: Arc<FieldRegistry>) -> Self {
        FieldConverter { registry }
    }

    /// Normalize one raw field value
    pub fn normalize(&self, field: &str, raw: &RawFieldValue) -> NormalizedValue {
        let topic = self.registry.topic_for(field);

        if raw.invalid == Some(true) {
            debug!("Field {} has invalid value, suppressing", field);
            return NormalizedValue::suppressed(topic);
        }

        // Location values pass through unconverted as structured data
        if let Some(location) = &raw.location_value {
            if is_location_field(field) {
                let formatted = serde_json::to_string(location).unwrap_or_default();
                return NormalizedValue {
                    topic,
                    value: FieldValue::Location(location.clone()),
                    formatted,
                };
            }
        }

        let coerced = if let Some(state) = &raw.shift_state_value {
            let gear = state.strip_prefix(SHIFT_STATE_PREFIX).unwrap_or(state);
            FieldValue::Text(gear.to_string())
        } else if let Some(text) = &raw.string_value {
            self.coerce(field, Scalar::Text(text.clone()))
        } else if let Some(value) = raw.double_value {
            self.coerce(field, Scalar::Float(value))
        } else if let Some(value) = raw.int_value {
            self.coerce(field, Scalar::Int(value))
        } else if let Some(value) = raw.bool_value {
            FieldValue::Bool(value)
        } else if let Some(value) = raw.number_value {
            self.coerce(field, Scalar::Float(value))
        } else {
            warn!("Unknown value type for {}: {:?}", field, raw);
            return NormalizedValue::suppressed(topic);
        };

        let (topic, converted) = self.convert_units(field, topic, coerced);
        let formatted = format_value(&converted);
        NormalizedValue {
            topic,
            value: converted,
            formatted,
        }
    }

    /// Coerce an extracted scalar per the field's semantic type
    fn coerce(&self, field: &str, scalar: Scalar) -> FieldValue {
        if let Scalar::Text(s) = &scalar {
            if s.is_empty() {
                return FieldValue::None;
            }
        }

        match self.registry.kind_of(field) {
            None => {
                // Unknown field: infer float vs integer from the textual form
                let text = scalar.textual();
                if text.contains('.') {
                    match text.parse::<f64>() {
                        Ok(v) => FieldValue::Float(round2(v)),
                        Err(_) => scalar_passthrough(scalar),
                    }
                } else {
                    match text.parse::<i64>() {
                        Ok(v) => FieldValue::Int(v),
                        Err(_) => scalar_passthrough(scalar),
                    }
                }
            }
            Some(FieldKind::Real) => match scalar.as_f64() {
                Some(v) => FieldValue::Float(round2(v)),
                None => FieldValue::None,
            },
            Some(FieldKind::Integer) => match scalar.as_f64() {
                Some(v) => FieldValue::Int(v as i64),
                None => FieldValue::None,
            },
            Some(FieldKind::Boolean) => match scalar {
                Scalar::Text(s) => {
                    let lowered = s.to_lowercase();
                    FieldValue::Bool(matches!(lowered.as_str(), "true" | "1" | "yes"))
                }
                Scalar::Float(v) => FieldValue::Bool(v != 0.0),
                Scalar::Int(v) => FieldValue::Bool(v != 0),
            },
            Some(FieldKind::Text) | Some(FieldKind::Location) => {
                FieldValue::Text(scalar.textual())
            }
        }
    }

    /// Apply domain conversion after type coercion
    ///
    /// Distance and speed values always land on the canonical fixed topic,
    /// regardless of what the registry derived for the field.
    fn convert_units(
        &self,
        field: &str,
        topic: String,
        value: FieldValue,
    ) -> (String, FieldValue) {
        match self.registry.category_of(field) {
            FieldCategory::Distance => {
                let topic = distance_topic(field).map(str::to_string).unwrap_or(topic);
                (topic, convert_numeric(value, miles_to_km))
            }
            FieldCategory::Speed => {
                let topic = speed_topic(field).map(str::to_string).unwrap_or(topic);
                // mph → km/h uses the same factor as miles → km
                (topic, convert_numeric(value, miles_to_km))
            }
            FieldCategory::Temperature
                if value.is_number()
                    && value.as_numeric().is_some_and(|v| v > FAHRENHEIT_THRESHOLD) =>
            {
                let celsius = value.as_numeric().map(fahrenheit_to_celsius);
                (topic, celsius.map_or(FieldValue::None, FieldValue::Float))
            }
            _ => {
                // No conversion, but keep float rounding consistent
                let value = match value {
                    FieldValue::Float(v) => FieldValue::Float(round2(v)),
                    other => other,
                };
                (topic, value)
            }
        }
    }
}

fn convert_numeric(value: FieldValue, convert: fn(f64) -> f64) -> FieldValue {
    match value.as_numeric() {
        Some(v) => FieldValue::Float(convert(v)),
        None => FieldValue::None,
    }
}

fn scalar_passthrough(scalar: Scalar) -> FieldValue {
    match scalar {
        Scalar::Text(s) => FieldValue::Text(s),
        Scalar::Float(v) => FieldValue::Float(v),
        Scalar::Int(v) => FieldValue::Int(v),
    }
}

/// Format a converted value for MQTT publishing
///
/// Floats use a fixed two-decimal form; an absent value formats as the
/// empty string, which suppresses publication.
fn format_value(value: &FieldValue) -> String {
    match value {
        FieldValue::None => String::new(),
        FieldValue::Float(v) => format!("{:.2}", v),
        FieldValue::Int(v) => v.to_string(),
        FieldValue::Bool(b) => b.to_string(),
        FieldValue::Text(s) => s.clone(),
        FieldValue::Location(v) => serde_json::to_string(v).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn converter() -> FieldConverter {
        FieldConverter::new(Arc::new(FieldRegistry::with_defaults()))
    }

    #[test]
    fn test_invalid_value_suppressed() {
        let result = converter().normalize("VehicleSpeed", &RawFieldValue::invalid());
        assert!(result.is_suppressed());
        assert_eq!(result.formatted, "");
    }

    #[test]
    fn test_distance_conversion_and_fixed_topic() {
        let result = converter().normalize("EstBatteryRange", &RawFieldValue::double(100.0));
        assert_eq!(result.topic, "battery_range_estimated_km");
        assert_eq!(result.value, FieldValue::Float(160.93));
        assert_eq!(result.formatted, "160.93");
    }

    #[test]
    fn test_speed_conversion() {
        let result = converter().normalize("VehicleSpeed", &RawFieldValue::double(60.0));
        assert_eq!(result.topic, "speed_kmh");
        assert_eq!(result.formatted, "96.56");
    }

    #[test]
    fn test_distance_string_value_converts() {
        let result = converter().normalize("Odometer", &RawFieldValue::string("100"));
        assert_eq!(result.topic, "odometer_km");
        assert_eq!(result.formatted, "160.93");
    }

    #[test]
    fn test_temperature_above_threshold_converts() {
        let result = converter().normalize("OutsideTemp", &RawFieldValue::double(98.6));
        assert_eq!(result.value, FieldValue::Float(37.0));
        assert_eq!(result.formatted, "37.00");
    }

    #[test]
    fn test_temperature_at_or_below_threshold_passes_through() {
        let result = converter().normalize("OutsideTemp", &RawFieldValue::double(20.0));
        assert_eq!(result.value, FieldValue::Float(20.0));
        assert_eq!(result.formatted, "20.00");

        let result = converter().normalize("InsideTemp", &RawFieldValue::double(50.0));
        assert_eq!(result.value, FieldValue::Float(50.0));
    }

    #[test]
    fn test_shift_state_prefix_stripped() {
        let result = converter().normalize("ShiftState", &RawFieldValue {
            shift_state_value: Some("ShiftStateP".to_string()),
            ..Default::default()
        });
        assert_eq!(result.formatted, "P");

        let result = converter().normalize("ShiftState", &RawFieldValue {
            shift_state_value: Some("D".to_string()),
            ..Default::default()
        });
        assert_eq!(result.formatted, "D");
    }

    #[test]
    fn test_location_passes_through() {
        let location = json!({"latitude": 37.44, "longitude": -122.15});
        let result = converter().normalize("Location", &RawFieldValue {
            location_value: Some(location.clone()),
            ..Default::default()
        });
        assert_eq!(result.value, FieldValue::Location(location.clone()));
        assert_eq!(result.formatted, serde_json::to_string(&location).unwrap());
    }

    #[test]
    fn test_location_value_on_non_location_field_suppressed() {
        let result = converter().normalize("VehicleSpeed", &RawFieldValue {
            location_value: Some(json!({"latitude": 1.0, "longitude": 2.0})),
            ..Default::default()
        });
        assert!(result.is_suppressed());
    }

    #[test]
    fn test_empty_tag_suppressed() {
        let result = converter().normalize("VehicleSpeed", &RawFieldValue::default());
        assert!(result.is_suppressed());
    }

    #[test]
    fn test_bool_value_direct_cast() {
        let result = converter().normalize("Locked", &RawFieldValue::boolean(true));
        assert_eq!(result.value, FieldValue::Bool(true));
        assert_eq!(result.formatted, "true");
    }

    #[test]
    fn test_unknown_field_infers_float_from_decimal_point() {
        let result = converter().normalize("ChargerPower", &RawFieldValue::string("3.14159"));
        assert_eq!(result.value, FieldValue::Float(3.14));
        assert_eq!(result.formatted, "3.14");
    }

    #[test]
    fn test_unknown_field_infers_integer_without_decimal_point() {
        let result = converter().normalize("DoorCount", &RawFieldValue::string("4"));
        assert_eq!(result.value, FieldValue::Int(4));
        assert_eq!(result.formatted, "4");
    }

    #[test]
    fn test_unknown_field_nonnumeric_text_passes_through() {
        let result = converter().normalize("ChargePortLatch", &RawFieldValue::string("Engaged"));
        assert_eq!(result.value, FieldValue::Text("Engaged".to_string()));
        assert_eq!(result.formatted, "Engaged");
    }

    #[test]
    fn test_real_kind_unparseable_suppressed() {
        let result = converter().normalize("VehicleSpeed", &RawFieldValue::string("not-a-number"));
        assert!(result.is_suppressed());
    }

    #[test]
    fn test_empty_string_value_suppressed() {
        let result = converter().normalize("VehicleSpeed", &RawFieldValue::string(""));
        assert!(result.is_suppressed());
    }

    #[test]
    fn test_wire_deserialization() {
        let raw: RawFieldValue =
            serde_json::from_value(json!({"stringValue": "22.5"})).unwrap();
        assert_eq!(raw.string_value.as_deref(), Some("22.5"));

        let raw: RawFieldValue =
            serde_json::from_value(json!({"invalid": true})).unwrap();
        assert_eq!(raw.invalid, Some(true));

        let raw: RawFieldValue =
            serde_json::from_value(json!({"shiftStateValue": "ShiftStateD"})).unwrap();
        assert_eq!(raw.shift_state_value.as_deref(), Some("ShiftStateD"));
    }
}
