//! Vehicle streaming transport
//!
//! Wire message types for the streaming feed and the WebSocket transport
//! behind the [`VehicleStream`] seam. The production connector uses
//! tokio-tungstenite with an optionally-unverified TLS connector; tests
//! substitute scripted streams.
//!
//! Inbound frames are JSON text in one of three shapes:
//!
//! - `{"msg_type": "control:hello", ...}` - keepalive/control
//! - `{"error": {"type": ..., "message": ...}}` - vehicle-reported error
//! - `{"data": [{"key": ..., "value": {...}}, ...], "vin": ...}` - telemetry

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::config::StreamConfig;
use crate::convert::RawFieldValue;
use crate::error::{BridgeError, Result};

/// Keys stripped from payloads before they are logged
const SENSITIVE_KEYS: &[&str] = &["token", "auth", "api_key"];

// ============================================================================
// Wire messages
// ============================================================================

/// Outbound subscription request for all telemetry fields
#[derive(Debug, Serialize)]
pub struct SubscribeAll {
    msg_type: &'static str,
    tag: String,
    token: String,
}

impl SubscribeAll {
    /// Build a subscribe-all request for one vehicle
    pub fn new(tag: impl Into<String>, token: impl Into<String>) -> Self {
        SubscribeAll {
            msg_type: "data:subscribe_all",
            tag: tag.into(),
            token: token.into(),
        }
    }

    /// Serialize to the wire form
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("subscribe message serializes")
    }
}

/// One field entry of a data frame
#[derive(Debug, Clone)]
pub struct DataField {
    /// Vendor field identifier
    pub key: String,
    /// Raw tagged value
    pub value: RawFieldValue,
}

/// A classified inbound frame
#[derive(Debug)]
pub enum StreamMessage {
    /// Vehicle-reported error indicator
    Error {
        /// Error type, e.g. `vehicle_offline`
        error_type: String,
        /// Human-readable detail
        message: String,
    },
    /// Keepalive/control message
    Control {
        /// Full message type string
        msg_type: String,
    },
    /// Telemetry data frame
    Data {
        /// Field entries carrying both a key and a value
        fields: Vec<DataField>,
        /// Vehicle identifier, when the frame carries one
        vin: Option<String>,
    },
    /// Any other well-formed shape; ignored
    Other,
}

impl StreamMessage {
    /// Classify a raw frame
    ///
    /// Returns `Err` only for payloads that do not parse as JSON; any
    /// well-formed shape classifies, falling back to [`StreamMessage::Other`].
    pub fn classify(text: &str) -> std::result::Result<StreamMessage, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(text)?;

        if let Some(error) = value.get("error") {
            let error_type = error
                .get("type")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string();
            let message = error
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("No details")
                .to_string();
            return Ok(StreamMessage::Error {
                error_type,
                message,
            });
        }

        if let Some(msg_type) = value.get("msg_type").and_then(|v| v.as_str()) {
            if msg_type.starts_with("control:hello") {
                return Ok(StreamMessage::Control {
                    msg_type: msg_type.to_string(),
                });
            }
        }

        if let Some(items) = value.get("data").and_then(|v| v.as_array()) {
            let fields = items
                .iter()
                .filter_map(|item| {
                    let key = item.get("key")?.as_str()?.to_string();
                    let raw = item.get("value")?;
                    let value = serde_json::from_value(raw.clone()).ok()?;
                    Some(DataField { key, value })
                })
                .collect();
            let vin = value
                .get("vin")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            return Ok(StreamMessage::Data { fields, vin });
        }

        Ok(StreamMessage::Other)
    }
}

/// Redact sensitive keys from a payload before logging it
pub fn sanitize_for_log(text: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(mut value) => {
            if let Some(map) = value.as_object_mut() {
                for key in SENSITIVE_KEYS {
                    map.remove(*key);
                }
            }
            value.to_string()
        }
        Err(_) => text.to_string(),
    }
}

// ============================================================================
// Transport seam
// ============================================================================

/// One open streaming connection
#[async_trait]
pub trait VehicleStream: Send {
    /// Send a text frame
    async fn send(&mut self, text: String) -> Result<()>;

    /// Receive the next text frame
    ///
    /// `Ok(None)` means the remote endpoint closed the stream.
    async fn next_message(&mut self) -> Result<Option<String>>;

    /// Close the connection, ignoring errors on an already-dead transport
    async fn close(&mut self);
}

/// Factory for streaming connections, one connect per reconnect cycle
#[async_trait]
pub trait StreamConnector: Send + Sync {
    /// Concrete stream type produced by this connector
    type Stream: VehicleStream;

    /// Open a new connection to the streaming endpoint
    async fn connect(&self) -> Result<Self::Stream>;
}

// ============================================================================
// Tungstenite transport
// ============================================================================

/// Connects to the vehicle streaming endpoint over WebSocket
pub struct TeslaConnector {
    config: StreamConfig,
}

impl TeslaConnector {
    /// Create a connector from stream configuration
    pub fn new(config: StreamConfig) -> Self {
        TeslaConnector { config }
    }

    fn tls_connector(&self) -> Result<Option<Connector>> {
        if !self.config.accept_invalid_certs {
            return Ok(None);
        }
        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()?;
        Ok(Some(Connector::NativeTls(tls)))
    }
}

#[async_trait]
impl StreamConnector for TeslaConnector {
    type Stream = TeslaStream;

    async fn connect(&self) -> Result<TeslaStream> {
        let connector = self.tls_connector()?;
        let (ws, _response) =
            connect_async_tls_with_config(self.config.uri.as_str(), None, false, connector)
                .await
                .map_err(|e| BridgeError::Connect {
                    uri: self.config.uri.clone(),
                    reason: e.to_string(),
                })?;

        debug!("WebSocket connected to {}", self.config.uri);

        let mut ping = tokio::time::interval(self.config.ping_interval);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        Ok(TeslaStream {
            ws,
            ping,
            idle_timeout: self.config.ping_timeout,
            last_frame: Instant::now(),
        })
    }
}

/// An open tungstenite connection with keepalive pings and an idle window
pub struct TeslaStream {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    ping: tokio::time::Interval,
    idle_timeout: std::time::Duration,
    last_frame: Instant,
}

#[async_trait]
impl VehicleStream for TeslaStream {
    async fn send(&mut self, text: String) -> Result<()> {
        self.ws.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<String>> {
        loop {
            let idle_deadline = self.last_frame + self.idle_timeout;
            tokio::select! {
                _ = self.ping.tick() => {
                    self.ws.send(Message::Ping(Vec::new())).await?;
                }
                _ = tokio::time::sleep_until(idle_deadline) => {
                    return Err(BridgeError::IdleTimeout {
                        idle_secs: self.idle_timeout.as_secs(),
                    });
                }
                frame = self.ws.next() => match frame {
                    None => return Ok(None),
                    Some(Ok(Message::Text(text))) => {
                        self.last_frame = Instant::now();
                        return Ok(Some(text));
                    }
                    Some(Ok(Message::Close(_))) => return Ok(None),
                    Some(Ok(_)) => {
                        // Pong or binary frame; counts as liveness
                        self.last_frame = Instant::now();
                    }
                    Some(Err(e)) => return Err(e.into()),
                }
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_message_shape() {
        let msg = SubscribeAll::new("5YJ3E1EA7KF000001", "secret");
        let value: serde_json::Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(value["msg_type"], "data:subscribe_all");
        assert_eq!(value["tag"], "5YJ3E1EA7KF000001");
        assert_eq!(value["token"], "secret");
    }

    #[test]
    fn test_classify_error() {
        let msg = StreamMessage::classify(
            r#"{"error": {"type": "vehicle_offline", "message": "asleep"}}"#,
        )
        .unwrap();
        match msg {
            StreamMessage::Error {
                error_type,
                message,
            } => {
                assert_eq!(error_type, "vehicle_offline");
                assert_eq!(message, "asleep");
            }
            other => panic!("expected error message, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_error_defaults() {
        let msg = StreamMessage::classify(r#"{"error": {}}"#).unwrap();
        match msg {
            StreamMessage::Error {
                error_type,
                message,
            } => {
                assert_eq!(error_type, "unknown");
                assert_eq!(message, "No details");
            }
            other => panic!("expected error message, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_control() {
        let msg = StreamMessage::classify(r#"{"msg_type": "control:hello"}"#).unwrap();
        assert!(matches!(msg, StreamMessage::Control { .. }));

        // Suffixed control types still match
        let msg =
            StreamMessage::classify(r#"{"msg_type": "control:hello:streaming"}"#).unwrap();
        assert!(matches!(msg, StreamMessage::Control { .. }));
    }

    #[test]
    fn test_classify_data() {
        let msg = StreamMessage::classify(
            r#"{"data": [{"key": "VehicleSpeed", "value": {"stringValue": "60"}},
                         {"key": "NoValue"},
                         {"value": {"intValue": 1}}],
                "vin": "5YJ3E1EA7KF000001"}"#,
        )
        .unwrap();
        match msg {
            StreamMessage::Data { fields, vin } => {
                // Entries without both key and value are dropped
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].key, "VehicleSpeed");
                assert_eq!(vin.as_deref(), Some("5YJ3E1EA7KF000001"));
            }
            other => panic!("expected data message, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_other_and_malformed() {
        assert!(matches!(
            StreamMessage::classify(r#"{"something": "else"}"#).unwrap(),
            StreamMessage::Other
        ));
        assert!(StreamMessage::classify("not json").is_err());
    }

    #[test]
    fn test_error_takes_precedence_over_data() {
        let msg = StreamMessage::classify(
            r#"{"error": {"type": "vehicle_disconnected"}, "data": []}"#,
        )
        .unwrap();
        assert!(matches!(msg, StreamMessage::Error { .. }));
    }

    #[test]
    fn test_sanitize_for_log() {
        let sanitized = sanitize_for_log(
            r#"{"msg_type": "data:update", "token": "secret", "api_key": "k", "data": []}"#,
        );
        assert!(!sanitized.contains("secret"));
        assert!(!sanitized.contains("api_key"));
        assert!(sanitized.contains("msg_type"));

        // Non-JSON passes through untouched
        assert_eq!(sanitize_for_log("plain"), "plain");
    }
}
