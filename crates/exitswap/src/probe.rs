//! Address probing over HTTP, directly and through Tor.

use async_trait::async_trait;
use std::time::Duration;

use exitswap_common::TransportError;

/// Opaque HTTP capability used to observe egress addresses
#[async_trait]
pub trait Prober: Send + Sync {
    /// GET `url` without the anonymizing transport
    async fn fetch_direct(&self, url: &str) -> Result<String, TransportError>;

    /// GET `url` through the anonymizing transport
    async fn fetch_via_tor(&self, url: &str) -> Result<String, TransportError>;
}

/// reqwest-backed prober with a SOCKS proxy for the Tor path
pub struct HttpProber {
    direct: reqwest::Client,
    tor: reqwest::Client,
    socks_url: String,
    timeout: Duration,
}

impl HttpProber {
    /// Build both clients. The Tor client routes every scheme through `socks_url`.
    pub fn new(socks_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let direct = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| TransportError::Other(format!("Failed to build HTTP client: {}", e)))?;

        let proxy = reqwest::Proxy::all(socks_url)
            .map_err(|e| TransportError::Other(format!("Invalid SOCKS proxy {}: {}", socks_url, e)))?;
        let tor = reqwest::Client::builder()
            .timeout(timeout)
            .proxy(proxy)
            .build()
            .map_err(|e| TransportError::Other(format!("Failed to build Tor client: {}", e)))?;

        Ok(Self {
            direct,
            tor,
            socks_url: socks_url.to_string(),
            timeout,
        })
    }

    pub fn socks_url(&self) -> &str {
        &self.socks_url
    }

    async fn get_text(&self, client: &reqwest::Client, url: &str) -> Result<String, TransportError> {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response.text().await.map_err(|e| self.map_reqwest_error(e))
    }

    fn map_reqwest_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(format!("no response within {:?}: {}", self.timeout, e))
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn fetch_direct(&self, url: &str) -> Result<String, TransportError> {
        self.get_text(&self.direct, url).await
    }

    async fn fetch_via_tor(&self, url: &str) -> Result<String, TransportError> {
        self.get_text(&self.tor, url).await
    }
}
