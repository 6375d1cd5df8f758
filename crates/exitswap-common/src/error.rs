//! Error types for exitswap components.

use thiserror::Error;

use crate::types::RotationKind;

/// Errors surfaced by the identity rotator
#[derive(Debug, Error)]
pub enum RotatorError {
    /// Missing or invalid configuration, detected before any network call
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tor controller authentication or renewal failure
    #[error("Tor controller error: {0}")]
    Controller(#[from] ControlError),

    /// Address probe failure
    #[error("Address probe failed: {0}")]
    Probe(#[source] TransportError),

    /// The acceptance policy was never satisfied
    #[error("{kind} rotation exhausted: {reason}")]
    Exhausted {
        kind: RotationKind,
        reason: Exhaustion,
    },

    /// A request routed through Tor failed
    #[error("Failed to make a request through Tor: {0}")]
    Request(#[source] TransportError),
}

impl RotatorError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config(_) => 500,
            Self::Controller(ControlError::Timeout(_)) => 504,
            Self::Controller(_) => 502,
            Self::Probe(TransportError::Timeout(_)) => 504,
            Self::Probe(_) => 502,
            Self::Exhausted { .. } => 503,
            Self::Request(TransportError::Timeout(_)) => 504,
            Self::Request(_) => 502,
        }
    }

    /// Returns true if the caller may reasonably retry the operation
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Config(_) => false,
            Self::Controller(err) => err.is_retryable(),
            Self::Probe(_) | Self::Request(_) => true,
            Self::Exhausted { reason, .. } => {
                matches!(reason, Exhaustion::AttemptsSpent { .. })
            }
        }
    }
}

/// Why a rotation gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhaustion {
    /// A repeat was seen after the history already filled the attempt budget
    AddressSpace { used: usize },

    /// Every attempt was spent without an acceptable address
    AttemptsSpent { attempts: u32, probe_failures: u32 },
}

impl std::fmt::Display for Exhaustion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AddressSpace { used } => {
                write!(f, "all possible addresses have been used ({} recorded)", used)
            }
            Self::AttemptsSpent {
                attempts,
                probe_failures: 0,
            } => write!(
                f,
                "max rotations ({}) reached without obtaining an acceptable address",
                attempts
            ),
            Self::AttemptsSpent {
                attempts,
                probe_failures,
            } => write!(
                f,
                "max rotations ({}) reached without obtaining an acceptable address ({} probe failures)",
                attempts, probe_failures
            ),
        }
    }
}

/// Tor control-port failures
#[derive(Debug, Error)]
pub enum ControlError {
    /// Socket-level failure
    #[error("control connection I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The control port did not answer in time
    #[error("control operation timed out: {0}")]
    Timeout(String),

    /// Tor rejected the credential (reply 515)
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Any other non-250 reply or malformed framing
    #[error("unexpected reply {code}: {message}")]
    Protocol { code: u16, message: String },

    /// A status query was issued without an authenticated session
    #[error("no authenticated control session; renew first")]
    NoSession,
}

impl ControlError {
    /// Returns true if a later attempt could succeed without a config change
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Timeout(_))
    }
}

/// HTTP transport failures, shared by direct and Tor-routed requests
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server answered with a non-2xx status
    #[error("{url} returned HTTP {status}")]
    Status { status: u16, url: String },

    /// The request did not complete in time
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The connection (or proxy handshake) could not be established
    #[error("connection failed: {0}")]
    Connect(String),

    /// Anything else the client reported
    #[error("{0}")]
    Other(String),
}
