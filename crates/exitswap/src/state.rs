//! Application state and shared resources.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};

use crate::config::AppConfig;
use crate::control::TorControlClient;
use crate::probe::HttpProber;
use crate::rotator::Rotator;
use exitswap_common::{RotationPolicy, RotatorError, RotatorSnapshot};

/// Read-only view of the rotator, refreshed after every rotation
#[derive(Debug, Clone)]
pub struct Published {
    pub snapshot: RotatorSnapshot,
    pub diagnostics: serde_json::Value,
}

impl Published {
    fn from_rotator(rotator: &Rotator) -> Self {
        Self {
            snapshot: rotator.snapshot(),
            diagnostics: rotator.diagnostics_snapshot(),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// The rotator; the mutex serialises rotations on its control session
    pub rotator: Arc<Mutex<Rotator>>,

    /// Last published view; readers never wait on a rotation in progress
    pub published: Arc<RwLock<Published>>,

    /// MaxCircuitDirtiness hint, reported on /status
    pub max_circuit_dirtiness: u64,

    /// Process start, for uptime
    pub started_at: Instant,
}

impl AppState {
    pub fn new(rotator: Rotator, max_circuit_dirtiness: u64) -> Self {
        let published = Published::from_rotator(&rotator);
        Self {
            rotator: Arc::new(Mutex::new(rotator)),
            published: Arc::new(RwLock::new(published)),
            max_circuit_dirtiness,
            started_at: Instant::now(),
        }
    }

    /// Build the rotator from config and wrap it in shared state
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let rotator = build_rotator(config).await?;
        Ok(Self::new(rotator, config.max_circuit_dirtiness))
    }

    /// Rotate under the rotator lock, then publish the new view.
    ///
    /// Failed rotations are published too, since diagnostics change on every attempt.
    pub async fn rotate(
        &self,
        policy: RotationPolicy,
    ) -> Result<(String, RotatorSnapshot), RotatorError> {
        let mut rotator = self.rotator.lock().await;
        let result = rotator.rotate(policy).await;

        let published = Published::from_rotator(&rotator);
        let snapshot = published.snapshot.clone();
        *self.published.write().await = published;

        result.map(|address| (address, snapshot))
    }

    /// Latest published snapshot
    pub async fn snapshot(&self) -> RotatorSnapshot {
        self.published.read().await.snapshot.clone()
    }

    /// Latest published diagnostics
    pub async fn diagnostics(&self) -> serde_json::Value {
        self.published.read().await.diagnostics.clone()
    }
}

/// Wire the Tor control client and HTTP prober into a connected rotator
pub async fn build_rotator(config: &AppConfig) -> Result<Rotator> {
    let rotator_config = config.rotator_config();
    // Reject missing settings before any client is built
    rotator_config.validate()?;

    let controller = Arc::new(TorControlClient::new(
        &config.control_host,
        config.control_port,
        config.control_timeout(),
    ));
    let prober = Arc::new(
        HttpProber::new(&config.socks_url, config.probe_timeout())
            .context("Failed to build HTTP prober")?,
    );

    tracing::debug!(
        control = %controller.addr(),
        socks = %prober.socks_url(),
        "Connecting rotator"
    );

    Rotator::connect(controller, prober, rotator_config)
        .await
        .context("Failed to initialise rotator")
}
