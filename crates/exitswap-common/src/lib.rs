//! # exitswap Common
//!
//! Shared types, errors, and defaults used across exitswap components.
//!
//! ## Modules
//! - `types` - Core data structures (RotationKind, RotationPolicy, RotatorSnapshot)
//! - `error` - Error taxonomy for rotation, control-port, and transport failures
//! - `constants` - Shared configuration defaults

pub mod constants;
pub mod error;
pub mod types;

pub use error::{ControlError, Exhaustion, RotatorError, TransportError};
pub use types::*;
