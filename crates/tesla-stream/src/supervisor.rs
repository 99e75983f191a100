//! Bridge supervision
//!
//! Starts one [`VehicleSession`] task per configured vehicle, runs them
//! concurrently and indefinitely, and tears them all down together on
//! shutdown. The shutdown drain is bounded: a session that fails to unwind
//! within the timeout is aborted rather than allowed to block process exit.

use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{BridgeConfig, VehicleConfig, SHUTDOWN_TIMEOUT};
use crate::error::{BridgeError, Result};
use crate::fields::FieldRegistry;
use crate::publish::Publisher;
use crate::session::VehicleSession;
use crate::stream::{StreamConnector, TeslaConnector};

/// Owns all vehicle session tasks for the life of the process
pub struct BridgeSupervisor {
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    publisher: Arc<dyn Publisher>,
}

impl BridgeSupervisor {
    /// Start a session per configured vehicle over the WebSocket transport
    pub fn start(
        config: &BridgeConfig,
        registry: Arc<FieldRegistry>,
        publisher: Arc<dyn Publisher>,
    ) -> Result<BridgeSupervisor> {
        let stream_config = config.stream.clone();
        Self::start_with(config, registry, publisher, move |_vehicle| {
            TeslaConnector::new(stream_config.clone())
        })
    }

    /// Start with a custom connector factory; the seam for tests
    pub fn start_with<C, F>(
        config: &BridgeConfig,
        registry: Arc<FieldRegistry>,
        publisher: Arc<dyn Publisher>,
        mut connector_for: F,
    ) -> Result<BridgeSupervisor>
    where
        C: StreamConnector + 'static,
        C::Stream: 'static,
        F: FnMut(&VehicleConfig) -> C,
    {
        if config.vehicles.is_empty() {
            return Err(BridgeError::NoVehicles);
        }

        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();

        for vehicle in &config.vehicles {
            let session = VehicleSession::new(
                vehicle.clone(),
                config,
                connector_for(vehicle),
                Arc::clone(&publisher),
                Arc::clone(&registry),
                cancel.child_token(),
            );
            tasks.spawn(session.run());
        }

        info!("Starting bridge with {} vehicles", config.vehicles.len());

        Ok(BridgeSupervisor {
            cancel,
            tasks,
            publisher,
        })
    }

    /// Number of live session tasks
    pub fn session_count(&self) -> usize {
        self.tasks.len()
    }

    /// Cancel every session, drain them within the bounded timeout, then
    /// release the MQTT connection
    pub async fn shutdown(mut self) {
        info!("Shutting down {} vehicle sessions", self.tasks.len());
        self.cancel.cancel();

        let drain = async {
            while self.tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
            warn!(
                "Sessions did not stop within {:?}, aborting remaining tasks",
                SHUTDOWN_TIMEOUT
            );
            self.tasks.abort_all();
            while self.tasks.join_next().await.is_some() {}
        }

        if let Err(e) = self.publisher.disconnect().await {
            warn!("Error disconnecting from MQTT broker: {}", e);
        }
        info!("Bridge stopped");
    }
}
