//! Testing utilities
//!
//! Mock implementations of the publisher and transport seams, used by the
//! unit tests in this crate and the integration tests under `tests/`.
//! Scripted streams replay canned frames; the mock publisher records every
//! publication for assertions.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{BridgeError, Result};
use crate::publish::Publisher;
use crate::stream::{StreamConnector, VehicleStream};

/// One recorded publication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRecord {
    /// Car number the publication was made under
    pub car_number: u32,
    /// Topic suffix
    pub topic: String,
    /// Payload text
    pub payload: String,
}

/// Publisher that records every publication
#[derive(Default)]
pub struct MockPublisher {
    records: Mutex<Vec<PublishRecord>>,
    disconnected: AtomicBool,
}

impl MockPublisher {
    /// Create an empty recording publisher
    pub fn new() -> Arc<MockPublisher> {
        Arc::new(MockPublisher::default())
    }

    /// All recorded publications in order
    pub fn records(&self) -> Vec<PublishRecord> {
        self.records.lock().clone()
    }

    /// Payloads published to a car's `state` topic, in order
    pub fn states(&self, car_number: u32) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.car_number == car_number && r.topic == "state")
            .map(|r| r.payload.clone())
            .collect()
    }

    /// The most recent payload for one topic of one car
    pub fn last_payload(&self, car_number: u32, topic: &str) -> Option<String> {
        self.records
            .lock()
            .iter()
            .rev()
            .find(|r| r.car_number == car_number && r.topic == topic)
            .map(|r| r.payload.clone())
    }

    /// Whether disconnect was called
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn publish(&self, car_number: u32, topic: &str, payload: &str) -> Result<()> {
        self.records.lock().push(PublishRecord {
            car_number,
            topic: topic.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// One scripted transport event
#[derive(Debug, Clone)]
pub enum ScriptedEvent {
    /// Deliver a text frame
    Frame(String),
    /// Report the stream closed by the remote endpoint
    Closed,
    /// Report a transport error
    Fail(String),
    /// Sleep before the next event
    Delay(Duration),
}

/// A stream that replays scripted events
///
/// When the script runs dry the stream pends forever, so a session blocked
/// on it can still observe cancellation.
pub struct ScriptedStream {
    events: VecDeque<ScriptedEvent>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl ScriptedStream {
    /// Build a stream from a list of events
    pub fn new(events: Vec<ScriptedEvent>) -> ScriptedStream {
        ScriptedStream {
            events: events.into(),
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle onto the frames sent over this stream
    pub fn sent_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.sent)
    }

    /// Handle onto the closed flag
    pub fn closed_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

#[async_trait]
impl VehicleStream for ScriptedStream {
    async fn send(&mut self, text: String) -> Result<()> {
        self.sent.lock().push(text);
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<String>> {
        loop {
            match self.events.pop_front() {
                Some(ScriptedEvent::Frame(text)) => return Ok(Some(text)),
                Some(ScriptedEvent::Closed) => return Ok(None),
                Some(ScriptedEvent::Fail(reason)) => {
                    return Err(BridgeError::Transport(reason));
                }
                Some(ScriptedEvent::Delay(duration)) => {
                    tokio::time::sleep(duration).await;
                }
                None => {
                    // Script exhausted; block until cancelled
                    futures::future::pending::<()>().await;
                }
            }
        }
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector handing out scripted streams, one per connect cycle
///
/// Once the scripts are exhausted every further connect attempt fails,
/// which keeps a session in its backoff loop.
pub struct ScriptedConnector {
    streams: Mutex<VecDeque<ScriptedStream>>,
    attempts: AtomicUsize,
}

impl ScriptedConnector {
    /// Build a connector from per-cycle scripts
    pub fn new(streams: Vec<ScriptedStream>) -> ScriptedConnector {
        ScriptedConnector {
            streams: Mutex::new(streams.into()),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Number of connect attempts observed
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamConnector for ScriptedConnector {
    type Stream = ScriptedStream;

    async fn connect(&self) -> Result<ScriptedStream> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.streams
            .lock()
            .pop_front()
            .ok_or_else(|| BridgeError::Connect {
                uri: "scripted".to_string(),
                reason: "no more scripted streams".to_string(),
            })
    }
}

/// A data frame with one string-valued field, in wire form
pub fn data_frame(key: &str, string_value: &str) -> String {
    format!(
        r#"{{"data": [{{"key": "{}", "value": {{"stringValue": "{}"}}}}]}}"#,
        key, string_value
    )
}

/// A vehicle-reported error frame, in wire form
pub fn error_frame(error_type: &str) -> String {
    format!(
        r#"{{"error": {{"type": "{}", "message": "scripted"}}}}"#,
        error_type
    )
}

/// The control hello frame, in wire form
pub fn hello_frame() -> String {
    r#"{"msg_type": "control:hello"}"#.to_string()
}
