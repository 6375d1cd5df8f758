//! Scripted capabilities shared by unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::control::Controller;
use crate::probe::Prober;
use exitswap_common::{ControlError, TransportError};

pub const PROBE_URL: &str = "https://ip.example.test/";
pub const LOCAL: &str = "198.51.100.1";
pub const PASSWORD: &str = "secret";

/// Controller spy: counts renewals, reports a numbered status each time
#[derive(Default)]
pub struct SpyController {
    pub renewals: AtomicUsize,
    pub queries: AtomicUsize,
    pub fail_renewal: bool,
    pub fail_status: bool,
}

impl SpyController {
    pub fn renewals(&self) -> usize {
        self.renewals.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Controller for SpyController {
    async fn authenticate_and_renew(&self, credential: &str) -> Result<(), ControlError> {
        assert_eq!(credential, PASSWORD);
        self.renewals.fetch_add(1, Ordering::SeqCst);
        if self.fail_renewal {
            return Err(ControlError::Authentication("Password did not match".into()));
        }
        Ok(())
    }

    async fn query_status(&self, key: &str) -> Result<String, ControlError> {
        assert_eq!(key, "circuit-status");
        let n = self.queries.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_status {
            return Err(ControlError::NoSession);
        }
        Ok(format!("{n} BUILT $AAAA~guard{n},$BBBB~exit{n}\n{n}0 BUILDING"))
    }
}

/// Prober spy: fixed direct address, scripted Tor addresses
pub struct ScriptedProber {
    direct_calls: AtomicUsize,
    tor_calls: AtomicUsize,
    tor_delay_ms: AtomicU64,
    tor: Mutex<VecDeque<Result<String, TransportError>>>,
}

impl ScriptedProber {
    pub fn new(tor: Vec<Result<&str, TransportError>>) -> Self {
        Self {
            direct_calls: AtomicUsize::new(0),
            tor_calls: AtomicUsize::new(0),
            tor_delay_ms: AtomicU64::new(0),
            tor: Mutex::new(tor.into_iter().map(|r| r.map(|s| format!("{s}\n"))).collect()),
        }
    }

    /// Endless supply of distinct exits after the initial reading
    pub fn counting(count: usize) -> Self {
        let exits: Vec<String> = (1..=count).map(|i| format!("10.0.0.{i}")).collect();
        let mut script = vec![Ok("203.0.113.5")];
        script.extend(exits.iter().map(|s| Ok(s.as_str())));
        Self::new(script)
    }

    /// Slow down every later fetch through Tor
    pub fn set_tor_delay(&self, delay: Duration) {
        self.tor_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.direct_calls.load(Ordering::SeqCst) + self.tor_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn fetch_direct(&self, _url: &str) -> Result<String, TransportError> {
        self.direct_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{LOCAL}\n"))
    }

    async fn fetch_via_tor(&self, _url: &str) -> Result<String, TransportError> {
        self.tor_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.tor_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.tor
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Other("script exhausted".into())))
    }
}
