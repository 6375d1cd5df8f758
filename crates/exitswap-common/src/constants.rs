//! Shared constants for exitswap components.

/// Default Tor control port
pub const DEFAULT_CONTROL_PORT: u16 = 9051;

/// Default Tor control host
pub const DEFAULT_CONTROL_HOST: &str = "127.0.0.1";

/// Default SOCKS proxy for the anonymized transport (remote DNS)
pub const DEFAULT_SOCKS_URL: &str = "socks5h://127.0.0.1:9050";

/// Default admin HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8899";

/// Default ceiling on renewal attempts per rotation
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default MaxCircuitDirtiness hint (seconds)
pub const DEFAULT_MAX_CIRCUIT_DIRTINESS: u64 = 10;

/// Control-port exchange timeout (seconds)
pub const DEFAULT_CONTROL_TIMEOUT_SECS: u64 = 10;

/// HTTP probe timeout (seconds)
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 30;

/// GETINFO key used for circuit diagnostics
pub const CIRCUIT_STATUS_KEY: &str = "circuit-status";

/// Diagnostics keys written on every renewal attempt
pub mod diagnostics_keys {
    /// 1-based attempt number within the current rotation
    pub const ATTEMPT: &str = "attempt";

    /// RFC 3339 timestamp of the renewal
    pub const RENEWED_AT: &str = "renewed_at";

    /// Circuit status lines reported by the controller
    pub const CIRCUIT_STATUS: &str = "circuit_status";

    /// Set instead of `circuit_status` when the status query failed
    pub const CIRCUIT_STATUS_ERROR: &str = "circuit_status_error";
}
