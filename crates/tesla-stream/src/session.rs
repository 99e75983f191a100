//! Per-vehicle session lifecycle
//!
//! One session owns one vehicle's full connect/subscribe/stream/reconnect
//! loop:
//!
//! ```text
//! Connecting ──► Subscribing ──► Streaming ──► (close) ──┐
//!     ▲                                                  │
//!     └───────────────── backoff sleep ◄─────────────────┘
//! ```
//!
//! Every cycle that ends for any reason other than cancellation goes
//! through one backoff delay before the next connect attempt; the backoff
//! counter resets on each successful subscription. Cancellation is
//! observed at every suspension point and always ends with the transport
//! closed and a terminal `disconnected` state publication.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{BridgeConfig, VehicleConfig};
use crate::convert::FieldConverter;
use crate::error::BridgeError;
use crate::fields::FieldRegistry;
use crate::publish::{Publisher, VehicleState};
use crate::reconnect::ReconnectPolicy;
use crate::stream::{
    sanitize_for_log, StreamConnector, StreamMessage, SubscribeAll, VehicleStream,
};

// How one connect/subscribe/stream cycle ended
enum CycleOutcome {
    /// Cancellation observed; the session must not restart
    Cancelled,
    /// The vehicle reported itself unavailable; state already published
    VehicleUnavailable,
    /// The remote endpoint closed the stream
    TransportClosed,
    /// Transport or subscription failure
    Failed(BridgeError),
}

// Decision after dispatching one inbound frame
#[derive(PartialEq)]
enum Dispatch {
    Continue,
    Stop,
}

/// The connection lifecycle for one vehicle
pub struct VehicleSession<C: StreamConnector> {
    vehicle: VehicleConfig,
    connector: C,
    publisher: Arc<dyn Publisher>,
    converter: FieldConverter,
    policy: ReconnectPolicy,
    subscribe_timeout: std::time::Duration,
    token: String,
    use_vin: bool,
    cancel: CancellationToken,
}

impl<C: StreamConnector> VehicleSession<C> {
    /// Create a session for one vehicle
    pub fn new(
        vehicle: VehicleConfig,
        config: &BridgeConfig,
        connector: C,
        publisher: Arc<dyn Publisher>,
        registry: Arc<FieldRegistry>,
        cancel: CancellationToken,
    ) -> Self {
        VehicleSession {
            vehicle,
            connector,
            publisher,
            converter: FieldConverter::new(registry),
            policy: ReconnectPolicy::new(&config.reconnect),
            subscribe_timeout: config.stream.subscribe_timeout,
            token: config.stream.token.clone(),
            use_vin: config.stream.use_vin,
            cancel,
        }
    }

    /// Run the session until cancelled
    pub async fn run(mut self) {
        let car = self.vehicle.car_number;
        info!("Starting session for car {}", car);

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            // Connecting
            let mut stream = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.connector.connect() => match result {
                    Ok(stream) => stream,
                    Err(e) => {
                        error!("Error for car {}: {} [{}]", car, e, e.error_code());
                        self.publish_state(VehicleState::Error).await;
                        if !self.backoff().await {
                            break;
                        }
                        continue;
                    }
                },
            };

            // Subscribing, then Streaming
            let outcome = self.subscribe_and_stream(&mut stream).await;
            stream.close().await;

            match outcome {
                CycleOutcome::Cancelled => break,
                CycleOutcome::VehicleUnavailable => {
                    // State already published from the error frame
                }
                CycleOutcome::TransportClosed => {
                    warn!("Connection closed for car {}", car);
                    self.publish_state(VehicleState::Disconnected).await;
                }
                CycleOutcome::Failed(e) => {
                    error!("Error for car {}: {} [{}]", car, e, e.error_code());
                    self.publish_state(VehicleState::Error).await;
                }
            }

            if !self.backoff().await {
                break;
            }
        }

        // Terminal teardown: always leave a disconnected state behind
        info!("Session for car {} was cancelled", car);
        self.publish_state(VehicleState::Disconnected).await;
    }

    // Subscribe on a fresh connection and pump messages until the cycle ends.
    async fn subscribe_and_stream(&mut self, stream: &mut C::Stream) -> CycleOutcome {
        let car = self.vehicle.car_number;
        let request = SubscribeAll::new(self.vehicle.subscribe_tag(self.use_vin), &self.token);

        info!("Sending subscription for car {}", car);
        let sent = tokio::select! {
            _ = self.cancel.cancelled() => return CycleOutcome::Cancelled,
            result = stream.send(request.to_json()) => result,
        };
        if let Err(e) = sent {
            return CycleOutcome::Failed(e);
        }

        let confirmation = tokio::select! {
            _ = self.cancel.cancelled() => return CycleOutcome::Cancelled,
            result = tokio::time::timeout(self.subscribe_timeout, stream.next_message()) => {
                match result {
                    Err(_) => {
                        return CycleOutcome::Failed(BridgeError::SubscribeTimeout {
                            timeout_secs: self.subscribe_timeout.as_secs(),
                        })
                    }
                    Ok(Ok(Some(text))) => text,
                    Ok(Ok(None)) => return CycleOutcome::Failed(BridgeError::StreamClosed),
                    Ok(Err(e)) => return CycleOutcome::Failed(e),
                }
            }
        };
        info!(
            "Subscription response for car {}: {}",
            car,
            sanitize_for_log(&confirmation)
        );

        self.policy.reset();
        self.publish_state(VehicleState::Online).await;

        // Streaming
        loop {
            let received = tokio::select! {
                _ = self.cancel.cancelled() => return CycleOutcome::Cancelled,
                result = stream.next_message() => result,
            };
            match received {
                Ok(Some(text)) => {
                    if self.dispatch(&text).await == Dispatch::Stop {
                        return CycleOutcome::VehicleUnavailable;
                    }
                }
                Ok(None) => return CycleOutcome::TransportClosed,
                Err(e) => return CycleOutcome::Failed(e),
            }
        }
    }

    // Classify and handle one inbound frame.
    async fn dispatch(&self, text: &str) -> Dispatch {
        let car = self.vehicle.car_number;

        let message = match StreamMessage::classify(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Invalid JSON received for car {}: {}", car, e);
                return Dispatch::Continue;
            }
        };
        debug!("Received for car {}: {}", car, sanitize_for_log(text));

        match message {
            StreamMessage::Error {
                error_type,
                message,
            } => match VehicleState::from_error_type(&error_type) {
                Some(state) => {
                    warn!(
                        "Vehicle {} is {}: {}",
                        self.vehicle.tag, error_type, message
                    );
                    self.publish_state(state).await;
                    Dispatch::Stop
                }
                None => {
                    error!(
                        "Unknown error for car {}: {} - {}",
                        car, error_type, message
                    );
                    Dispatch::Continue
                }
            },
            StreamMessage::Control { .. } => {
                self.publish_state(VehicleState::Online).await;
                Dispatch::Continue
            }
            StreamMessage::Data { fields, vin } => {
                self.publish_state(VehicleState::Online).await;

                for field in fields {
                    if field.key.trim().is_empty() {
                        debug!("Invalid field key for car {}: {:?}", car, field.key);
                        continue;
                    }
                    let normalized = self.converter.normalize(&field.key, &field.value);
                    if !normalized.is_suppressed() {
                        self.publish(&normalized.topic, &normalized.formatted).await;
                    }
                }

                if let Some(vin) = vin {
                    self.publish("vin", &vin).await;
                }
                Dispatch::Continue
            }
            StreamMessage::Other => Dispatch::Continue,
        }
    }

    async fn publish(&self, topic: &str, payload: &str) {
        if let Err(e) = self
            .publisher
            .publish(self.vehicle.car_number, topic, payload)
            .await
        {
            warn!(
                "Failed to publish {} for car {}: {}",
                topic, self.vehicle.car_number, e
            );
        }
    }

    async fn publish_state(&self, state: VehicleState) {
        if let Err(e) = self
            .publisher
            .publish_state(self.vehicle.car_number, state)
            .await
        {
            warn!(
                "Failed to publish state for car {}: {}",
                self.vehicle.car_number, e
            );
        }
    }

    // Sleep out the next backoff delay; false means cancellation fired.
    async fn backoff(&mut self) -> bool {
        let delay = self.policy.next_delay();
        info!(
            "Reconnecting car {} in {:.1} seconds (attempt {})",
            self.vehicle.car_number,
            delay.as_secs_f64(),
            self.policy.attempts()
        );
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
