//! Error types for bridge operations
//!
//! This module provides error handling for all bridge operations including
//! WebSocket transport, vehicle subscription, and MQTT publishing.

use thiserror::Error;

/// Main error type for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    // ===== Transport Errors =====
    /// WebSocket connect or handshake failure
    #[error("Failed to connect to {uri}: {reason}")]
    Connect {
        /// Streaming endpoint URI
        uri: String,
        /// Failure reason
        reason: String,
    },

    /// TLS setup failure
    #[error("TLS error: {0}")]
    Tls(String),

    /// Error while sending or receiving on an open stream
    #[error("Stream transport error: {0}")]
    Transport(String),

    /// The remote endpoint closed the stream
    #[error("Stream closed by remote endpoint")]
    StreamClosed,

    /// No frame arrived within the keepalive window
    #[error("Stream idle for more than {idle_secs}s")]
    IdleTimeout {
        /// Configured idle window in seconds
        idle_secs: u64,
    },

    // ===== Subscription Errors =====
    /// No confirmation arrived for a subscribe request
    #[error("Timeout waiting for subscription confirmation after {timeout_secs}s")]
    SubscribeTimeout {
        /// Configured confirmation timeout in seconds
        timeout_secs: u64,
    },

    // ===== Publishing Errors =====
    /// MQTT publish failed
    #[error("MQTT publish failed: {0}")]
    Publish(String),

    // ===== Configuration Errors =====
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No vehicles configured at startup
    #[error("No vehicles configured")]
    NoVehicles,

    // ===== General Errors =====
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Check if this error should trigger a reconnect cycle rather than
    /// tearing the session down
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            BridgeError::Connect { .. }
                | BridgeError::Tls(_)
                | BridgeError::Transport(_)
                | BridgeError::StreamClosed
                | BridgeError::IdleTimeout { .. }
                | BridgeError::SubscribeTimeout { .. }
        )
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            BridgeError::Connect { .. } => "CONNECT_FAILED",
            BridgeError::Tls(_) => "TLS_ERROR",
            BridgeError::Transport(_) => "TRANSPORT_ERROR",
            BridgeError::StreamClosed => "STREAM_CLOSED",
            BridgeError::IdleTimeout { .. } => "IDLE_TIMEOUT",
            BridgeError::SubscribeTimeout { .. } => "SUBSCRIBE_TIMEOUT",
            BridgeError::Publish(_) => "PUBLISH_FAILED",
            BridgeError::InvalidConfig(_) => "INVALID_CONFIG",
            BridgeError::NoVehicles => "NO_VEHICLES",
            BridgeError::Internal(_) => "INTERNAL_ERROR",
            BridgeError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

// Conversion from tungstenite errors
impl From<tokio_tungstenite::tungstenite::Error> for BridgeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => BridgeError::StreamClosed,
            other => BridgeError::Transport(other.to_string()),
        }
    }
}

// Conversion from native-tls errors during connector setup
impl From<native_tls::Error> for BridgeError {
    fn from(err: native_tls::Error) -> Self {
        BridgeError::Tls(err.to_string())
    }
}

// Conversion from rumqttc client errors
impl From<rumqttc::ClientError> for BridgeError {
    fn from(err: rumqttc::ClientError) -> Self {
        BridgeError::Publish(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = BridgeError::Connect {
            uri: "wss://example.com/streaming/".to_string(),
            reason: "refused".to_string(),
        };
        assert_eq!(err.error_code(), "CONNECT_FAILED");
        assert_eq!(BridgeError::NoVehicles.error_code(), "NO_VEHICLES");
    }

    #[test]
    fn test_is_retriable() {
        assert!(BridgeError::StreamClosed.is_retriable());
        assert!(BridgeError::SubscribeTimeout { timeout_secs: 10 }.is_retriable());
        assert!(BridgeError::IdleTimeout { idle_secs: 30 }.is_retriable());
        assert!(!BridgeError::NoVehicles.is_retriable());
        assert!(!BridgeError::InvalidConfig("bad".to_string()).is_retriable());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = BridgeError::SubscribeTimeout { timeout_secs: 10 };
        assert!(err.to_string().contains("10"));
    }
}
