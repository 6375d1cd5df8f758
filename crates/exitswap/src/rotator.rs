//! Identity rotation state machine.
//!
//! A rotation renews the Tor identity, probes the resulting exit address,
//! and applies the acceptance policy, retrying up to `max_attempts` times.
//!
//! ## Acceptance policy (evaluated in order)
//! 1. With `prevent_baseline_match`, an address equal to the baseline
//!    (non-anonymized) address is rejected.
//! 2. With `unique`, an address already in the history is rejected. If the
//!    history already holds `max_attempts` addresses the rotation gives up
//!    at once, since the usable address space is considered spent.
//! 3. Anything else is accepted and appended to the history.
//!
//! A probe failure inside the loop is logged and counts as a spent attempt.
//! Controller failures abort the rotation immediately.

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::control::Controller;
use crate::probe::Prober;
use exitswap_common::constants::{CIRCUIT_STATUS_KEY, DEFAULT_MAX_ATTEMPTS, diagnostics_keys};
use exitswap_common::{Exhaustion, RotationKind, RotationPolicy, RotatorError, RotatorSnapshot};

/// Rotator settings, built once at startup
#[derive(Clone)]
pub struct RotatorConfig {
    /// Label for logs and errors
    pub kind: RotationKind,
    /// Renewal attempts allowed per rotation
    pub max_attempts: u32,
    /// Tor control port password
    pub control_credential: String,
    /// URL that answers with the caller's address
    pub probe_target: String,
    /// Fixed delay between attempts (zero retries immediately)
    pub retry_backoff: Duration,
}

impl RotatorConfig {
    pub fn new(control_credential: impl Into<String>, probe_target: impl Into<String>) -> Self {
        Self {
            kind: RotationKind::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            control_credential: control_credential.into(),
            probe_target: probe_target.into(),
            retry_backoff: Duration::ZERO,
        }
    }

    /// Check required settings. Never touches the network.
    pub fn validate(&self) -> Result<(), RotatorError> {
        if self.control_credential.is_empty() {
            return Err(RotatorError::Config(
                "Tor control password is not set (PASSWORD)".to_string(),
            ));
        }

        if self.probe_target.trim().is_empty() {
            return Err(RotatorError::Config(
                "Probe service URL is not set (SERVICE_URL)".to_string(),
            ));
        }

        let url = reqwest::Url::parse(&self.probe_target).map_err(|e| {
            RotatorError::Config(format!("Invalid probe URL {:?}: {}", self.probe_target, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RotatorError::Config(format!(
                "Probe URL must be http or https, got {}",
                url.scheme()
            )));
        }

        if self.max_attempts == 0 {
            return Err(RotatorError::Config(
                "max_attempts must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

impl fmt::Debug for RotatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotatorConfig")
            .field("kind", &self.kind)
            .field("max_attempts", &self.max_attempts)
            .field("control_credential", &"<redacted>")
            .field("probe_target", &self.probe_target)
            .field("retry_backoff", &self.retry_backoff)
            .finish()
    }
}

/// Rotates the Tor exit identity and tracks accepted addresses.
///
/// `rotate` takes `&mut self`: one instance owns one control session, so
/// concurrent rotations must be serialised by the caller (the service keeps
/// the rotator behind a mutex).
pub struct Rotator {
    controller: Arc<dyn Controller>,
    prober: Arc<dyn Prober>,
    config: RotatorConfig,
    baseline_address: String,
    current_address: String,
    history: Vec<String>,
    diagnostics: Map<String, Value>,
    last_rotated_at: Option<i64>,
}

impl Rotator {
    /// Validate `config`, then record the baseline and initial Tor addresses
    pub async fn connect(
        controller: Arc<dyn Controller>,
        prober: Arc<dyn Prober>,
        config: RotatorConfig,
    ) -> Result<Self, RotatorError> {
        config.validate()?;

        let mut rotator = Self {
            controller,
            prober,
            config,
            baseline_address: String::new(),
            current_address: String::new(),
            history: Vec::new(),
            diagnostics: Map::new(),
            last_rotated_at: None,
        };

        rotator.baseline_address = rotator.check_local_address().await?;
        rotator.current_address = rotator.check_tor_address().await?;

        tracing::info!(
            kind = %rotator.config.kind,
            baseline = %rotator.baseline_address,
            tor = %rotator.current_address,
            "Rotator ready"
        );

        Ok(rotator)
    }

    /// Rotate using the configured kind
    pub async fn rotate(&mut self, policy: RotationPolicy) -> Result<String, RotatorError> {
        self.rotate_as(self.config.kind, policy).await
    }

    /// Rotate the exit IP address
    pub async fn rotate_ip(&mut self, policy: RotationPolicy) -> Result<String, RotatorError> {
        self.rotate_as(RotationKind::Ip, policy).await
    }

    /// Rotate the proxy identity
    pub async fn rotate_proxy(&mut self, policy: RotationPolicy) -> Result<String, RotatorError> {
        self.rotate_as(RotationKind::Proxy, policy).await
    }

    async fn rotate_as(
        &mut self,
        kind: RotationKind,
        policy: RotationPolicy,
    ) -> Result<String, RotatorError> {
        let max_attempts = self.config.max_attempts;
        let mut probe_failures = 0;

        for attempt in 1..=max_attempts {
            if attempt > 1 && !self.config.retry_backoff.is_zero() {
                tokio::time::sleep(self.config.retry_backoff).await;
            }

            let candidate = match self.generate_new_address(attempt).await {
                Ok(address) => address,
                Err(RotatorError::Probe(e)) => {
                    probe_failures += 1;
                    tracing::warn!(%kind, attempt, error = %e, "Exit probe failed");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if policy.prevent_baseline_match && candidate == self.baseline_address {
                tracing::debug!(%kind, attempt, "Exit matches baseline address, retrying");
                continue;
            }

            if policy.unique && self.history.contains(&candidate) {
                if self.history.len() >= max_attempts as usize {
                    return Err(RotatorError::Exhausted {
                        kind,
                        reason: Exhaustion::AddressSpace {
                            used: self.history.len(),
                        },
                    });
                }
                tracing::debug!(%kind, attempt, address = %candidate, "Exit already used, retrying");
                continue;
            }

            self.accept(candidate.clone());
            tracing::info!(%kind, attempt, address = %candidate, "Rotated exit identity");

            return Ok(candidate);
        }

        Err(RotatorError::Exhausted {
            kind,
            reason: Exhaustion::AttemptsSpent {
                attempts: max_attempts,
                probe_failures,
            },
        })
    }

    /// GET `url` through the Tor transport (current circuit)
    pub async fn make_anonymized_request(&self, url: &str) -> Result<String, RotatorError> {
        self.prober
            .fetch_via_tor(url)
            .await
            .map_err(RotatorError::Request)
    }

    /// Diagnostics recorded by the most recent renewal attempt
    pub fn diagnostics_snapshot(&self) -> Value {
        Value::Object(self.diagnostics.clone())
    }

    /// Diagnostics as indented JSON text
    pub fn diagnostics_dump(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.diagnostics)
    }

    pub fn baseline_address(&self) -> &str {
        &self.baseline_address
    }

    pub fn current_address(&self) -> &str {
        &self.current_address
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn kind(&self) -> RotationKind {
        self.config.kind
    }

    pub fn config(&self) -> &RotatorConfig {
        &self.config
    }

    pub fn snapshot(&self) -> RotatorSnapshot {
        RotatorSnapshot {
            kind: self.config.kind,
            baseline_address: self.baseline_address.clone(),
            current_address: self.current_address.clone(),
            history: self.history.clone(),
            rotations: self.history.len(),
            max_attempts: self.config.max_attempts,
            last_rotated_at: self.last_rotated_at,
        }
    }

    fn accept(&mut self, address: String) {
        self.current_address = address.clone();
        self.history.push(address);
        self.last_rotated_at = Some(chrono::Utc::now().timestamp());
    }

    async fn generate_new_address(&mut self, attempt: u32) -> Result<String, RotatorError> {
        self.renew_circuit(attempt).await?;
        self.check_tor_address().await
    }

    async fn renew_circuit(&mut self, attempt: u32) -> Result<(), RotatorError> {
        self.controller
            .authenticate_and_renew(&self.config.control_credential)
            .await?;

        self.diagnostics.clear();
        self.diagnostics
            .insert(diagnostics_keys::ATTEMPT.to_string(), Value::from(attempt));
        self.diagnostics.insert(
            diagnostics_keys::RENEWED_AT.to_string(),
            Value::from(chrono::Utc::now().to_rfc3339()),
        );

        match self.controller.query_status(CIRCUIT_STATUS_KEY).await {
            Ok(status) => {
                let lines: Vec<Value> = status.lines().map(Value::from).collect();
                self.diagnostics
                    .insert(diagnostics_keys::CIRCUIT_STATUS.to_string(), Value::Array(lines));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Circuit status unavailable");
                self.diagnostics.insert(
                    diagnostics_keys::CIRCUIT_STATUS_ERROR.to_string(),
                    Value::from(e.to_string()),
                );
            }
        }

        Ok(())
    }

    async fn check_local_address(&self) -> Result<String, RotatorError> {
        self.prober
            .fetch_direct(&self.config.probe_target)
            .await
            .map(|body| body.trim().to_string())
            .map_err(RotatorError::Probe)
    }

    async fn check_tor_address(&self) -> Result<String, RotatorError> {
        self.prober
            .fetch_via_tor(&self.config.probe_target)
            .await
            .map(|body| body.trim().to_string())
            .map_err(RotatorError::Probe)
    }
}

impl fmt::Debug for Rotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rotator")
            .field("kind", &self.config.kind)
            .field("tor_address", &self.current_address)
            .field("local_address", &self.baseline_address)
            .field("max_attempts", &self.config.max_attempts)
            .field("rotations", &self.history.len())
            .finish()
    }
}
