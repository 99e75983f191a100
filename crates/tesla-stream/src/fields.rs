//! Field metadata registry and MQTT topic derivation
//!
//! Maps vendor field identifiers (e.g. `VehicleSpeed`) to canonical MQTT
//! topic names, semantic types, and conversion categories.
//!
//! Topic derivation precedence, first match wins:
//!
//! 1. Distance fields → fixed `*_km` topic
//! 2. Speed fields → fixed `*_kmh` topic
//! 3. Location fields → snake_case of the field name
//! 4. Everything else → snake_case of the field name
//!
//! The registry is loaded once at startup and shared read-only by all
//! vehicle sessions. The only mutable piece is the discovery set, which
//! records previously-unseen field identifiers so a new sensor is
//! announced exactly once for the life of the process.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

// ============================================================================
// Fixed conversion tables
// ============================================================================

/// Distance fields and their fixed kilometer topics
pub const DISTANCE_FIELDS: &[(&str, &str)] = &[
    ("EstBatteryRange", "battery_range_estimated_km"),
    ("IdealBatteryRange", "battery_range_ideal_km"),
    ("RatedRange", "battery_range_rated_km"),
    ("RangeDisplay", "battery_range_display_km"),
    ("MilesToArrival", "navigation_distance_remaining_km"),
    ("MilesRemaining", "navigation_distance_remaining_km"),
    ("Odometer", "odometer_km"),
    ("ChargeRateMilePerHour", "charge_rate_kmh"),
    ("DistanceToArrival", "navigation_distance_remaining_km"),
];

/// Speed fields and their fixed km/h topics
pub const SPEED_FIELDS: &[(&str, &str)] = &[
    ("VehicleSpeed", "speed_kmh"),
    ("CruiseSetSpeed", "cruise_speed_kmh"),
    ("CurrentLimitMph", "speed_limit_kmh"),
    ("SpeedLimit", "speed_limit_kmh"),
    ("SpeedLimitDisplay", "speed_limit_display_kmh"),
    ("SpeedLimitMode", "speed_limit_mode_kmh"),
];

/// Temperature fields, reported in Fahrenheit above the heuristic threshold
pub const TEMPERATURE_FIELDS: &[&str] = &["OutsideTemp", "InsideTemp"];

/// Location fields, passed through as structured values
pub const LOCATION_FIELDS: &[&str] = &["Location", "DestinationLocation", "OriginLocation"];

/// Look up the fixed kilometer topic for a distance field
pub fn distance_topic(field: &str) -> Option<&'static str> {
    DISTANCE_FIELDS
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, topic)| *topic)
}

/// Look up the fixed km/h topic for a speed field
pub fn speed_topic(field: &str) -> Option<&'static str> {
    SPEED_FIELDS
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, topic)| *topic)
}

/// Check whether a field is one of the known temperature fields
pub fn is_temperature_field(field: &str) -> bool {
    TEMPERATURE_FIELDS.contains(&field)
}

/// Check whether a field is one of the known location fields
pub fn is_location_field(field: &str) -> bool {
    LOCATION_FIELDS.contains(&field)
}

// ============================================================================
// Field descriptors
// ============================================================================

/// Semantic type of a telemetry field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Floating-point value, rounded to two decimals
    Real,
    /// Integer value, truncated
    Integer,
    /// Boolean value
    Boolean,
    /// Textual value (also covers vendor `enum` and `object` types)
    Text,
    /// Structured location value
    Location,
}

impl FieldKind {
    fn parse(text: &str) -> FieldKind {
        match text {
            "real" => FieldKind::Real,
            "integer" => FieldKind::Integer,
            "boolean" => FieldKind::Boolean,
            "location" => FieldKind::Location,
            _ => FieldKind::Text,
        }
    }
}

/// Conversion category of a field, derived from the fixed tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCategory {
    /// Miles → kilometers, fixed `*_km` topic
    Distance,
    /// Mph → km/h, fixed `*_kmh` topic
    Speed,
    /// Fahrenheit → Celsius above the heuristic threshold
    Temperature,
    /// Structured pass-through
    Location,
    /// No domain conversion
    Other,
}

/// Metadata for one known field identifier, immutable after load
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Vendor field identifier
    pub name: String,
    /// Canonical MQTT topic suffix
    pub topic: String,
    /// Semantic type
    pub kind: FieldKind,
    /// Vendor category string from the metadata file
    pub category: String,
}

// ============================================================================
// Registry
// ============================================================================

/// Process-wide field metadata registry
///
/// Immutable after construction apart from the discovery set, which is
/// synchronized so concurrent sessions record a new identifier at most once.
pub struct FieldRegistry {
    descriptors: HashMap<String, FieldDescriptor>,
    discovered: Mutex<HashSet<String>>,
}

impl FieldRegistry {
    /// Load field metadata from a file
    ///
    /// On any load failure (missing file, malformed row) this logs the
    /// problem and falls back to [`FieldRegistry::with_defaults`]; it
    /// never returns an error to the caller.
    pub fn load(path: &Path) -> FieldRegistry {
        match Self::try_load(path) {
            Ok(registry) => {
                info!(
                    "Loaded {} field definitions from {}",
                    registry.descriptors.len(),
                    path.display()
                );
                registry
            }
            Err(reason) => {
                warn!(
                    "Failed to load field metadata from {}: {} - using default mappings",
                    path.display(),
                    reason
                );
                Self::with_defaults()
            }
        }
    }

    fn try_load(path: &Path) -> std::result::Result<FieldRegistry, String> {
        let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        let mut registry = FieldRegistry::empty();

        for (idx, line) in content.lines().enumerate() {
            if idx == 0 || line.trim().is_empty() {
                continue; // header
            }
            let columns: Vec<&str> = line.split(',').map(|c| c.trim().trim_matches('"')).collect();
            if columns.len() < 4 {
                return Err(format!("malformed row at line {}", idx + 1));
            }
            let name = columns[0];
            let kind = FieldKind::parse(&columns[2].to_lowercase());
            let category = columns[3].to_lowercase();
            registry.insert(name, kind, &category);
        }

        if registry.descriptors.is_empty() {
            return Err("no field rows".to_string());
        }
        Ok(registry)
    }

    /// Build the minimal built-in table covering the distance, speed,
    /// temperature, and location field sets
    pub fn with_defaults() -> FieldRegistry {
        let mut registry = FieldRegistry::empty();
        for (name, _) in DISTANCE_FIELDS {
            registry.insert(name, FieldKind::Real, "distance");
        }
        for (name, _) in SPEED_FIELDS {
            registry.insert(name, FieldKind::Real, "speed");
        }
        for name in LOCATION_FIELDS {
            registry.insert(name, FieldKind::Location, "location");
        }
        for name in TEMPERATURE_FIELDS {
            registry.insert(name, FieldKind::Real, "temperature");
        }
        info!("Default field mappings have been set up");
        registry
    }

    fn empty() -> FieldRegistry {
        FieldRegistry {
            descriptors: HashMap::new(),
            discovered: Mutex::new(HashSet::new()),
        }
    }

    fn insert(&mut self, name: &str, kind: FieldKind, category: &str) {
        let topic = if let Some(fixed) = distance_topic(name) {
            fixed.to_string()
        } else if let Some(fixed) = speed_topic(name) {
            fixed.to_string()
        } else {
            camel_to_snake(name)
        };
        self.descriptors.insert(
            name.to_string(),
            FieldDescriptor {
                name: name.to_string(),
                topic,
                kind,
                category: category.to_string(),
            },
        );
    }

    /// Check whether a field identifier is present in the loaded metadata
    pub fn is_known(&self, field: &str) -> bool {
        self.descriptors.contains_key(field)
    }

    /// Get the semantic type for a field, if known
    pub fn kind_of(&self, field: &str) -> Option<FieldKind> {
        self.descriptors.get(field).map(|d| d.kind)
    }

    /// Get the conversion category for a field
    ///
    /// Categories come from the fixed tables, not the metadata file, so a
    /// metadata row cannot opt a field out of its unit conversion.
    pub fn category_of(&self, field: &str) -> FieldCategory {
        if distance_topic(field).is_some() {
            FieldCategory::Distance
        } else if speed_topic(field).is_some() {
            FieldCategory::Speed
        } else if is_temperature_field(field) {
            FieldCategory::Temperature
        } else if is_location_field(field) {
            FieldCategory::Location
        } else {
            FieldCategory::Other
        }
    }

    /// Get the canonical MQTT topic for a field
    ///
    /// Unknown fields get a mechanically derived name. A previously-unseen
    /// identifier is announced once via [`FieldRegistry::record_if_new`].
    pub fn topic_for(&self, field: &str) -> String {
        if !self.is_known(field) && self.record_if_new(field) {
            info!(
                "NEW SENSOR DISCOVERED: '{}' -> MQTT topic: '{}' - add to your automation system",
                field,
                camel_to_snake(field)
            );
        }
        match self.descriptors.get(field) {
            Some(descriptor) => descriptor.topic.clone(),
            None => camel_to_snake(field),
        }
    }

    /// Record a field identifier in the discovery set
    ///
    /// Returns true only the first time an identifier is seen, across all
    /// sessions for the life of the process.
    pub fn record_if_new(&self, field: &str) -> bool {
        let mut discovered = self.discovered.lock();
        if discovered.contains(field) {
            false
        } else {
            discovered.insert(field.to_string());
            debug!("Recorded discovered field: {}", field);
            true
        }
    }
}

// ============================================================================
// Name derivation
// ============================================================================

/// Convert a camelCase field identifier to a snake_case topic name
///
/// Multi-letter acronym runs split before a following capitalized word:
/// `ACChargingPower` → `ac_charging_power`. Deterministic and idempotent
/// over already-converted names.
pub fn camel_to_snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            // Word boundary after a lowercase/digit, or at the tail of an
            // acronym run of at least two capitals.
            let boundary = prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase()
                    && i >= 2
                    && chars[i - 2].is_ascii_uppercase()
                    && chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase()));
            if boundary {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_to_snake() {
        assert_eq!(camel_to_snake("VehicleSpeed"), "vehicle_speed");
        assert_eq!(camel_to_snake("EstBatteryRange"), "est_battery_range");
        assert_eq!(camel_to_snake("ACChargingPower"), "ac_charging_power");
        assert_eq!(camel_to_snake("TestCase"), "test_case");
        assert_eq!(camel_to_snake("simple"), "simple");
    }

    #[test]
    fn test_camel_to_snake_idempotent() {
        for name in ["VehicleSpeed", "ACChargingPower", "HVACStatus", "simple"] {
            let once = camel_to_snake(name);
            assert_eq!(camel_to_snake(&once), once);
            assert_eq!(camel_to_snake(name), once);
        }
    }

    #[test]
    fn test_default_registry_topics() {
        let registry = FieldRegistry::with_defaults();
        assert_eq!(registry.topic_for("EstBatteryRange"), "battery_range_estimated_km");
        assert_eq!(registry.topic_for("VehicleSpeed"), "speed_kmh");
        assert_eq!(registry.topic_for("Location"), "location");
        assert_eq!(registry.topic_for("OutsideTemp"), "outside_temp");
    }

    #[test]
    fn test_unknown_field_derives_topic() {
        let registry = FieldRegistry::with_defaults();
        assert!(!registry.is_known("BrandNewSensor"));
        assert_eq!(registry.topic_for("BrandNewSensor"), "brand_new_sensor");
    }

    #[test]
    fn test_categories_follow_fixed_tables() {
        let registry = FieldRegistry::with_defaults();
        assert_eq!(registry.category_of("Odometer"), FieldCategory::Distance);
        assert_eq!(registry.category_of("VehicleSpeed"), FieldCategory::Speed);
        assert_eq!(registry.category_of("OutsideTemp"), FieldCategory::Temperature);
        assert_eq!(registry.category_of("Location"), FieldCategory::Location);
        assert_eq!(registry.category_of("Soc"), FieldCategory::Other);
    }

    #[test]
    fn test_record_if_new_only_once() {
        let registry = FieldRegistry::with_defaults();
        assert!(registry.record_if_new("UnseenField"));
        assert!(!registry.record_if_new("UnseenField"));
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let registry = FieldRegistry::load(Path::new("/nonexistent/fields.csv"));
        assert!(registry.is_known("VehicleSpeed"));
        assert_eq!(registry.topic_for("Odometer"), "odometer_km");
    }

    #[test]
    fn test_load_malformed_row_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fields.csv");
        std::fs::write(&path, "Field,Vehicle Data Equivalent,Type,Category\nBadRow\n").unwrap();

        let registry = FieldRegistry::load(&path);
        // Fallback table, not the file contents
        assert!(registry.is_known("OutsideTemp"));
        assert!(!registry.is_known("BadRow"));
    }

    #[test]
    fn test_load_well_formed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fields.csv");
        std::fs::write(
            &path,
            "Field,Vehicle Data Equivalent,Type,Category\n\
             \"Soc\",\"charge_state.battery_level\",\"integer\",\"charge\"\n\
             \"VehicleSpeed\",\"drive_state.speed\",\"real\",\"drive\"\n",
        )
        .unwrap();

        let registry = FieldRegistry::load(&path);
        assert_eq!(registry.kind_of("Soc"), Some(FieldKind::Integer));
        // Fixed speed topic wins over anything the file could derive
        assert_eq!(registry.topic_for("VehicleSpeed"), "speed_kmh");
        assert!(!registry.is_known("OutsideTemp"));
    }
}
