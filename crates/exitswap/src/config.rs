//! Configuration management for exitswap.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::rotator::RotatorConfig;
use exitswap_common::RotationKind;
use exitswap_common::constants::{
    DEFAULT_CONTROL_HOST, DEFAULT_CONTROL_PORT, DEFAULT_CONTROL_TIMEOUT_SECS, DEFAULT_LISTEN_ADDR,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_CIRCUIT_DIRTINESS, DEFAULT_PROBE_TIMEOUT_SECS,
    DEFAULT_SOCKS_URL,
};

/// Application configuration
#[derive(Clone, Deserialize)]
pub struct AppConfig {
    /// Tor control host
    #[serde(default = "default_control_host")]
    pub control_host: String,

    /// Tor control port
    #[serde(default = "default_control_port")]
    pub control_port: u16,

    /// Tor control password (required)
    #[serde(default)]
    pub control_password: Option<String>,

    /// URL answering with the caller's address (required)
    #[serde(default)]
    pub service_url: Option<String>,

    /// SOCKS proxy for requests through Tor
    #[serde(default = "default_socks_url")]
    pub socks_url: String,

    /// MaxCircuitDirtiness hint, reported but not used for rotation
    #[serde(default = "default_max_circuit_dirtiness")]
    pub max_circuit_dirtiness: u64,

    /// Rotation settings
    #[serde(default)]
    pub rotation: RotationSettings,

    /// Admin HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

/// Rotation-specific configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RotationSettings {
    /// Rotation framing (`ip` or `proxy`)
    #[serde(default)]
    pub kind: RotationKind,

    /// Renewal attempts per rotation
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Control-port exchange timeout in seconds
    #[serde(default = "default_control_timeout")]
    pub control_timeout_secs: u64,

    /// HTTP probe timeout in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Delay between attempts in milliseconds
    #[serde(default)]
    pub retry_backoff_ms: u64,

    /// Background rotation interval in seconds (0 disables)
    #[serde(default)]
    pub auto_rotate_secs: u64,

    /// Background rotations require never-seen addresses
    #[serde(default)]
    pub unique: bool,

    /// Background rotations reject the local address
    #[serde(default = "default_true")]
    pub prevent_local_match: bool,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            kind: RotationKind::default(),
            max_attempts: default_max_attempts(),
            control_timeout_secs: default_control_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            retry_backoff_ms: 0,
            auto_rotate_secs: 0,
            unique: false,
            prevent_local_match: default_true(),
        }
    }
}

/// Values taken from CLI flags and their environment variables
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub control_port: Option<u16>,
    pub control_password: Option<String>,
    pub service_url: Option<String>,
    pub socks_url: Option<String>,
    pub max_circuit_dirtiness: Option<u64>,
    pub max_attempts: Option<u32>,
    pub listen_addr: Option<String>,
}

// Default value functions
fn default_control_host() -> String { DEFAULT_CONTROL_HOST.to_string() }
fn default_control_port() -> u16 { DEFAULT_CONTROL_PORT }
fn default_socks_url() -> String { DEFAULT_SOCKS_URL.to_string() }
fn default_max_circuit_dirtiness() -> u64 { DEFAULT_MAX_CIRCUIT_DIRTINESS }
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_max_attempts() -> u32 { DEFAULT_MAX_ATTEMPTS }
fn default_control_timeout() -> u64 { DEFAULT_CONTROL_TIMEOUT_SECS }
fn default_probe_timeout() -> u64 { DEFAULT_PROBE_TIMEOUT_SECS }
fn default_true() -> bool { true }

impl AppConfig {
    /// Load configuration from file and `EXITSWAP_*` variables, with CLI overrides
    pub fn load(config_path: &str, overrides: &Overrides) -> Result<Self> {
        let mut builder = config::Config::builder();

        if Path::new(config_path).exists() {
            builder = builder.add_source(config::File::with_name(config_path));
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
        }

        let settings = builder
            .add_source(config::Environment::with_prefix("EXITSWAP").separator("__"))
            .build()
            .context("Failed to load config")?;

        let mut config: AppConfig = settings
            .try_deserialize()
            .context("Failed to parse config")?;

        config.apply(overrides);
        Ok(config)
    }

    /// Apply CLI overrides on top of loaded values
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(port) = overrides.control_port {
            self.control_port = port;
        }
        if let Some(ref password) = overrides.control_password {
            self.control_password = Some(password.clone());
        }
        if let Some(ref url) = overrides.service_url {
            self.service_url = Some(url.clone());
        }
        if let Some(ref socks) = overrides.socks_url {
            self.socks_url = socks.clone();
        }
        if let Some(dirtiness) = overrides.max_circuit_dirtiness {
            self.max_circuit_dirtiness = dirtiness;
        }
        if let Some(max_attempts) = overrides.max_attempts {
            self.rotation.max_attempts = max_attempts;
        }
        if let Some(ref listen) = overrides.listen_addr {
            self.listen_addr = listen.clone();
        }
    }

    /// Core rotator settings. Missing values stay empty so the rotator rejects them.
    pub fn rotator_config(&self) -> RotatorConfig {
        RotatorConfig {
            kind: self.rotation.kind,
            max_attempts: self.rotation.max_attempts,
            control_credential: self.control_password.clone().unwrap_or_default(),
            probe_target: self.service_url.clone().unwrap_or_default(),
            retry_backoff: Duration::from_millis(self.rotation.retry_backoff_ms),
        }
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_secs(self.rotation.control_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.rotation.probe_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            control_host: default_control_host(),
            control_port: default_control_port(),
            control_password: None,
            service_url: None,
            socks_url: default_socks_url(),
            max_circuit_dirtiness: default_max_circuit_dirtiness(),
            rotation: RotationSettings::default(),
            listen_addr: default_listen_addr(),
        }
    }
}
