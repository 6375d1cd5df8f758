//! # exitswap
//!
//! Rotates the Tor exit identity: sends NEWNYM on the control port, probes
//! the new exit address over HTTP, and accepts it only if it passes the
//! rotation policy.
//!
//! ## Architecture
//! ```text
//! Rotator ──► Controller (Tor control port: AUTHENTICATE, SIGNAL NEWNYM, GETINFO)
//!    │
//!    └─────► Prober (HTTP: direct, and via Tor SOCKS)
//! ```

pub mod config;
pub mod control;
pub mod probe;
pub mod rotator;
pub mod routes;
pub mod state;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::AppConfig;
pub use control::{Controller, TorControlClient};
pub use probe::{HttpProber, Prober};
pub use rotator::{Rotator, RotatorConfig};
pub use state::AppState;
