//! Core types shared across exitswap components.

use serde::{Deserialize, Serialize};

/// What the rotated value is framed as.
///
/// Both framings run the same rotation; the kind only labels logs,
/// errors, and snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationKind {
    /// Rotating the exit IP address
    #[default]
    Ip,
    /// Rotating the proxy identity used for outbound requests
    Proxy,
}

impl std::fmt::Display for RotationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ip => f.write_str("IP"),
            Self::Proxy => f.write_str("proxy"),
        }
    }
}

/// Acceptance policy for a single rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationPolicy {
    /// Reject addresses already present in the history
    #[serde(default)]
    pub unique: bool,

    /// Reject addresses equal to the non-anonymized baseline
    #[serde(default = "default_prevent_baseline_match")]
    pub prevent_baseline_match: bool,
}

fn default_prevent_baseline_match() -> bool {
    true
}

impl RotationPolicy {
    /// Policy requiring a never-before-accepted address
    pub fn unique() -> Self {
        Self {
            unique: true,
            ..Self::default()
        }
    }

    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn with_prevent_baseline_match(mut self, prevent: bool) -> Self {
        self.prevent_baseline_match = prevent;
        self
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            unique: false,
            prevent_baseline_match: default_prevent_baseline_match(),
        }
    }
}

/// Read-only view of a rotator's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotatorSnapshot {
    /// Rotation framing
    pub kind: RotationKind,

    /// Non-anonymized address observed at construction
    pub baseline_address: String,

    /// Latest confirmed anonymized address
    pub current_address: String,

    /// Every accepted address, oldest first
    pub history: Vec<String>,

    /// Number of successful rotations
    pub rotations: usize,

    /// Renewal attempts allowed per rotation
    pub max_attempts: u32,

    /// Unix timestamp of the last successful rotation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_rotated_at: Option<i64>,
}
