//! Tor controller capability.
//!
//! The rotator only needs two things from Tor: a fresh identity on demand
//! and a diagnostic status read. `TorControlClient` provides both over the
//! control port's line protocol.

mod client;

use async_trait::async_trait;
use exitswap_common::ControlError;

pub use client::{ControlConnection, ControlReply, TorControlClient, quote_string};

/// Opaque handle to the anonymizing network's control interface
#[async_trait]
pub trait Controller: Send + Sync {
    /// Authenticate with `credential` and request a new identity (NEWNYM)
    async fn authenticate_and_renew(&self, credential: &str) -> Result<(), ControlError>;

    /// Fetch a GETINFO value as multi-line text
    async fn query_status(&self, key: &str) -> Result<String, ControlError>;
}
