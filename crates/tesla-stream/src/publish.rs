//! MQTT publishing
//!
//! All sessions publish through one shared [`Publisher`]. The trait is the
//! seam for tests; the production implementation wraps a rumqttc
//! `AsyncClient` whose event loop runs on its own task and handles
//! wire-level retry and keepalive on its own.
//!
//! Topic layout: `<prefix>/<car>/<field_topic>`, plus the reserved
//! `state` and `vin` topics per car.

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::fmt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::MqttConfig;
use crate::error::Result;

/// Connectivity state of one vehicle, republished on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleState {
    /// Streaming and receiving data
    Online,
    /// Not currently reachable
    Offline,
    /// The session hit a transport or subscription error
    Error,
    /// The transport closed or the session is shutting down
    Disconnected,
    /// The vehicle reported itself disconnected
    VehicleDisconnected,
    /// The vehicle reported itself offline
    VehicleOffline,
}

impl VehicleState {
    /// Wire string published to the `state` topic
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleState::Online => "online",
            VehicleState::Offline => "offline",
            VehicleState::Error => "error",
            VehicleState::Disconnected => "disconnected",
            VehicleState::VehicleDisconnected => "vehicle_disconnected",
            VehicleState::VehicleOffline => "vehicle_offline",
        }
    }

    /// Parse a vehicle-reported error type into a state
    pub fn from_error_type(error_type: &str) -> Option<VehicleState> {
        match error_type {
            "vehicle_disconnected" => Some(VehicleState::VehicleDisconnected),
            "vehicle_offline" => Some(VehicleState::VehicleOffline),
            _ => None,
        }
    }
}

impl fmt::Display for VehicleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared publishing interface, safe for concurrent use by all sessions
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish a payload under a car's topic tree
    async fn publish(&self, car_number: u32, topic: &str, payload: &str) -> Result<()>;

    /// Publish a car's connectivity state
    async fn publish_state(&self, car_number: u32, state: VehicleState) -> Result<()> {
        self.publish(car_number, "state", state.as_str()).await
    }

    /// Release the broker connection
    async fn disconnect(&self) -> Result<()>;
}

/// MQTT publisher backed by rumqttc
pub struct MqttPublisher {
    client: AsyncClient,
    topic_prefix: String,
    driver: JoinHandle<()>,
}

impl MqttPublisher {
    /// Connect to the broker and spawn the event-loop driver task
    pub fn connect(config: &MqttConfig) -> MqttPublisher {
        let mut options = MqttOptions::new("tesla-mqtt-bridge", &config.host, config.port);
        options.set_keep_alive(config.keep_alive);
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options.set_credentials(user.clone(), pass.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(options, 100);

        let driver = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        info!("Connected to MQTT broker: {:?}", ack.code);
                    }
                    Ok(event) => {
                        debug!("MQTT event: {:?}", event);
                    }
                    Err(e) => {
                        warn!("MQTT connection error: {}", e);
                        // rumqttc reconnects on the next poll; don't spin
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        MqttPublisher {
            client,
            topic_prefix: config.topic_prefix.clone(),
            driver,
        }
    }

    fn full_topic(&self, car_number: u32, topic: &str) -> String {
        format!("{}/{}/{}", self.topic_prefix, car_number, topic)
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, car_number: u32, topic: &str, payload: &str) -> Result<()> {
        let full_topic = self.full_topic(car_number, topic);
        self.client
            .publish(full_topic, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let result = self.client.disconnect().await;
        self.driver.abort();
        result?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_wire_strings() {
        assert_eq!(VehicleState::Online.as_str(), "online");
        assert_eq!(VehicleState::VehicleOffline.as_str(), "vehicle_offline");
        assert_eq!(VehicleState::Disconnected.to_string(), "disconnected");
    }

    #[test]
    fn test_from_error_type() {
        assert_eq!(
            VehicleState::from_error_type("vehicle_disconnected"),
            Some(VehicleState::VehicleDisconnected)
        );
        assert_eq!(
            VehicleState::from_error_type("vehicle_offline"),
            Some(VehicleState::VehicleOffline)
        );
        assert_eq!(VehicleState::from_error_type("rate_limited"), None);
    }
}
