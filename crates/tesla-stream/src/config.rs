//! Configuration types for the telemetry bridge
//!
//! This module provides configuration structures for the MQTT broker
//! connection, the vehicle streaming endpoint, reconnect behavior, and the
//! per-vehicle identifiers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default MQTT broker host
pub const DEFAULT_MQTT_HOST: &str = "localhost";

/// Default MQTT broker port
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default MQTT topic prefix
pub const DEFAULT_TOPIC_PREFIX: &str = "myteslamate/cars";

/// Default streaming endpoint URI
pub const DEFAULT_STREAM_URI: &str = "wss://streaming.myteslamate.com/streaming/";

/// Maximum number of configured vehicles
pub const MAX_VEHICLES: usize = 10;

/// Wait for a subscription confirmation message
pub const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on the shutdown drain of all sessions
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Main configuration for the bridge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// MQTT broker settings
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Vehicle streaming endpoint settings
    #[serde(default)]
    pub stream: StreamConfig,

    /// Reconnection backoff settings
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Configured vehicles
    #[serde(default)]
    pub vehicles: Vec<VehicleConfig>,
}

/// MQTT broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker hostname
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    /// Broker port
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Optional username
    #[serde(default)]
    pub username: Option<String>,

    /// Optional password
    #[serde(default)]
    pub password: Option<String>,

    /// Topic prefix for all publications
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    /// MQTT keep-alive interval
    #[serde(with = "humantime_serde", default = "default_keep_alive")]
    pub keep_alive: Duration,
}

fn default_mqtt_host() -> String {
    DEFAULT_MQTT_HOST.to_string()
}

fn default_mqtt_port() -> u16 {
    DEFAULT_MQTT_PORT
}

fn default_topic_prefix() -> String {
    DEFAULT_TOPIC_PREFIX.to_string()
}

fn default_keep_alive() -> Duration {
    Duration::from_secs(5)
}

impl Default for MqttConfig {
    fn default() -> Self {
        MqttConfig {
            host: default_mqtt_host(),
            port: DEFAULT_MQTT_PORT,
            username: None,
            password: None,
            topic_prefix: default_topic_prefix(),
            keep_alive: default_keep_alive(),
        }
    }
}

/// Vehicle streaming endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// WebSocket endpoint URI
    #[serde(default = "default_stream_uri")]
    pub uri: String,

    /// Skip TLS certificate validation
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,

    /// Keepalive ping interval
    #[serde(with = "humantime_serde", default = "default_ping_interval")]
    pub ping_interval: Duration,

    /// Give up on an idle stream after this long without a frame
    #[serde(with = "humantime_serde", default = "default_ping_timeout")]
    pub ping_timeout: Duration,

    /// Wait for a subscription confirmation
    #[serde(with = "humantime_serde", default = "default_subscribe_timeout")]
    pub subscribe_timeout: Duration,

    /// Bearer token for the subscribe request
    #[serde(default)]
    pub token: String,

    /// Tag subscriptions with the VIN; otherwise the car number is used
    #[serde(default = "default_use_vin")]
    pub use_vin: bool,
}

fn default_stream_uri() -> String {
    DEFAULT_STREAM_URI.to_string()
}

fn default_accept_invalid_certs() -> bool {
    true
}

fn default_ping_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_ping_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_subscribe_timeout() -> Duration {
    SUBSCRIBE_TIMEOUT
}

fn default_use_vin() -> bool {
    true
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            uri: default_stream_uri(),
            accept_invalid_certs: true,
            ping_interval: default_ping_interval(),
            ping_timeout: default_ping_timeout(),
            subscribe_timeout: SUBSCRIBE_TIMEOUT,
            token: String::new(),
            use_vin: true,
        }
    }
}

/// Reconnection backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt
    #[serde(with = "humantime_serde", default = "default_base_delay")]
    pub base_delay: Duration,

    /// Maximum delay between reconnect attempts
    #[serde(with = "humantime_serde", default = "default_max_delay")]
    pub max_delay: Duration,

    /// Jitter fraction applied to each delay
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_base_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(300)
}

fn default_jitter() -> f64 {
    0.1
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfig {
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            jitter: default_jitter(),
        }
    }
}

/// One configured vehicle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleConfig {
    /// Vehicle identifier (VIN) used to tag the subscription
    pub tag: String,

    /// Car number used in the MQTT topic tree
    pub car_number: u32,
}

impl VehicleConfig {
    /// Create a vehicle entry
    pub fn new(tag: impl Into<String>, car_number: u32) -> Self {
        VehicleConfig {
            tag: tag.into(),
            car_number,
        }
    }

    /// The tag sent in the subscribe request, honoring `use_vin`
    pub fn subscribe_tag(&self, use_vin: bool) -> String {
        if use_vin {
            self.tag.clone()
        } else {
            self.car_number.to_string()
        }
    }
}

/// Builder for BridgeConfig
#[derive(Debug, Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the MQTT broker address
    pub fn mqtt_broker(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.mqtt.host = host.into();
        self.config.mqtt.port = port;
        self
    }

    /// Set MQTT credentials
    pub fn mqtt_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.config.mqtt.username = Some(username.into());
        self.config.mqtt.password = Some(password.into());
        self
    }

    /// Set the topic prefix
    pub fn topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.mqtt.topic_prefix = prefix.into();
        self
    }

    /// Set the streaming endpoint URI
    pub fn stream_uri(mut self, uri: impl Into<String>) -> Self {
        self.config.stream.uri = uri.into();
        self
    }

    /// Set the bearer token
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.stream.token = token.into();
        self
    }

    /// Toggle TLS certificate validation
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.config.stream.accept_invalid_certs = accept;
        self
    }

    /// Set the reconnect base delay
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect.base_delay = delay;
        self
    }

    /// Add a vehicle, up to [`MAX_VEHICLES`]
    pub fn vehicle(mut self, tag: impl Into<String>, car_number: u32) -> Self {
        if self.config.vehicles.len() < MAX_VEHICLES {
            self.config.vehicles.push(VehicleConfig::new(tag, car_number));
        }
        self
    }

    /// Build the configuration
    pub fn build(self) -> BridgeConfig {
        self.config
    }
}

// Custom serde module for Duration with humantime
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.mqtt.host, "localhost");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.topic_prefix, "myteslamate/cars");
        assert_eq!(config.stream.uri, DEFAULT_STREAM_URI);
        assert_eq!(config.reconnect.base_delay, Duration::from_secs(5));
        assert_eq!(config.reconnect.max_delay, Duration::from_secs(300));
        assert!(config.vehicles.is_empty());
    }

    #[test]
    fn test_config_builder() {
        let config = BridgeConfigBuilder::new()
            .mqtt_broker("broker.local", 8883)
            .topic_prefix("fleet/cars")
            .token("abc123")
            .vehicle("5YJ3E1EA7KF000001", 1)
            .vehicle("5YJ3E1EA7KF000002", 2)
            .build();

        assert_eq!(config.mqtt.host, "broker.local");
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.stream.token, "abc123");
        assert_eq!(config.vehicles.len(), 2);
        assert_eq!(config.vehicles[1].car_number, 2);
    }

    #[test]
    fn test_vehicle_cap() {
        let mut builder = BridgeConfigBuilder::new();
        for n in 0..20 {
            builder = builder.vehicle(format!("VIN{}", n), n);
        }
        assert_eq!(builder.build().vehicles.len(), MAX_VEHICLES);
    }

    #[test]
    fn test_subscribe_tag_honors_use_vin() {
        let vehicle = VehicleConfig::new("5YJ3E1EA7KF000001", 3);
        assert_eq!(vehicle.subscribe_tag(true), "5YJ3E1EA7KF000001");
        assert_eq!(vehicle.subscribe_tag(false), "3");
    }

    #[test]
    fn test_durations_roundtrip_humantime() {
        let config = BridgeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"ping_interval\":\"10s\""));
        let parsed: BridgeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.stream.ping_interval, Duration::from_secs(10));
    }
}
