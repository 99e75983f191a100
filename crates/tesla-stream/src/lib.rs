//! Tesla telemetry streaming to MQTT
//!
//! This crate bridges the per-vehicle telemetry WebSocket feed to an MQTT
//! broker: for each configured vehicle it keeps a persistent streaming
//! connection, subscribes to all telemetry fields, normalizes each incoming
//! field (unit conversion, naming, typing), and republishes it under the
//! vehicle's MQTT topic tree, alongside the vehicle's connectivity state.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                      BridgeSupervisor                         │
//! ├───────────────────────────────────────────────────────────────┤
//! │                                                               │
//! │  ┌────────────────┐   one per vehicle   ┌─────────────────┐   │
//! │  │ VehicleSession │◄───────────────────►│ MqttPublisher   │   │
//! │  │                │                     │ (shared)        │   │
//! │  │ TeslaConnector │   ┌──────────────┐  └─────────────────┘   │
//! │  │ ReconnectPolicy│   │FieldConverter│                        │
//! │  └────────────────┘   │FieldRegistry │  (shared, read-only)   │
//! │                       └──────────────┘                        │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Per-vehicle lifecycle
//!
//! Each session loops `Connecting → Subscribing → Streaming` with
//! exponential, jittered backoff between cycles and a reset on every
//! successful subscription. Vehicle-reported unavailability
//! (`vehicle_disconnected` / `vehicle_offline`) is republished as vehicle
//! state and triggers a reconnect cycle rather than an error.
//!
//! # Topic layout
//!
//! - `<prefix>/<car>/<field_topic>` - normalized field values
//! - `<prefix>/<car>/state` - connectivity state
//! - `<prefix>/<car>/vin` - vehicle identifier
//!
//! Distance fields publish under fixed `*_km` topics and speed fields under
//! fixed `*_kmh` topics, converted from the feed's imperial units.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod convert;
pub mod error;
pub mod fields;
pub mod publish;
pub mod reconnect;
pub mod session;
pub mod stream;
pub mod supervisor;
pub mod units;

// Testing utilities
pub mod test_utils;

// Re-exports for convenience
pub use config::{
    BridgeConfig, BridgeConfigBuilder, MqttConfig, ReconnectConfig, StreamConfig, VehicleConfig,
};
pub use convert::{FieldConverter, FieldValue, NormalizedValue, RawFieldValue};
pub use error::{BridgeError, Result};
pub use fields::{camel_to_snake, FieldCategory, FieldDescriptor, FieldKind, FieldRegistry};
pub use publish::{MqttPublisher, Publisher, VehicleState};
pub use reconnect::ReconnectPolicy;
pub use session::VehicleSession;
pub use stream::{
    DataField, StreamConnector, StreamMessage, SubscribeAll, TeslaConnector, VehicleStream,
};
pub use supervisor::BridgeSupervisor;

// Configuration constants re-exports
pub use config::{
    DEFAULT_MQTT_HOST, DEFAULT_MQTT_PORT, DEFAULT_STREAM_URI, DEFAULT_TOPIC_PREFIX, MAX_VEHICLES,
    SHUTDOWN_TIMEOUT, SUBSCRIBE_TIMEOUT,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_MQTT_PORT, 1883);
        assert_eq!(DEFAULT_TOPIC_PREFIX, "myteslamate/cars");
        assert_eq!(MAX_VEHICLES, 10);
    }
}
