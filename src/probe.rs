use async_trait::async_trait;
use reqwest::{redirect, Client, Proxy, Url};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::Status;

pub const USER_AGENT: &str = concat!("portal-status/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Invalid proxy address {0:?}: {1}")]
    InvalidProxy(String, String),

    #[error("Failed to build probe client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyScheme {
    Socks5,
    /// SOCKS5 with name resolution done by the proxy. Required for onion addresses.
    Socks5h,
    Http,
}

impl ProxyScheme {
    fn as_str(self) -> &'static str {
        match self {
            ProxyScheme::Socks5 => "socks5",
            ProxyScheme::Socks5h => "socks5h",
            ProxyScheme::Http => "http",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
}

impl ProxyConfig {
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

impl fmt::Display for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

impl FromStr for ProxyConfig {
    type Err = ProbeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| ProbeError::InvalidProxy(raw.to_string(), why.to_string());

        let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
        let scheme = match url.scheme() {
            "socks5" => ProxyScheme::Socks5,
            "socks5h" => ProxyScheme::Socks5h,
            "http" => ProxyScheme::Http,
            other => return Err(invalid(&format!("unsupported scheme {other}"))),
        };
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host"))?
            .to_string();
        let port = url
            .port_or_known_default()
            .or(match scheme {
                ProxyScheme::Socks5 | ProxyScheme::Socks5h => Some(1080),
                ProxyScheme::Http => None,
            })
            .ok_or_else(|| invalid("missing port"))?;

        Ok(Self { scheme, host, port })
    }
}

/// Answers one question: is the target reachable right now.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target: &str) -> Status;
}

/// Reachability check over HTTP, optionally through a SOCKS proxy such as a
/// local Tor daemon.
pub struct TorProber {
    client: Client,
    proxy: Option<ProxyConfig>,
    timeout: Duration,
}

impl TorProber {
    pub fn new(proxy: Option<ProxyConfig>, timeout: Duration) -> Result<Self, ProbeError> {
        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect::Policy::none())
            .timeout(timeout)
            .connect_timeout(timeout)
            .pool_max_idle_per_host(0);

        builder = match &proxy {
            Some(proxy) => builder.proxy(Proxy::all(proxy.url())?),
            None => builder.no_proxy(),
        };

        Ok(Self {
            client: builder.build()?,
            proxy,
            timeout,
        })
    }
}

#[async_trait]
impl Prober for TorProber {
    async fn probe(&self, target: &str) -> Status {
        let start = Instant::now();
        let via = self.proxy.as_ref().map_or("direct".to_string(), ProxyConfig::url);
        info!("Checking {} via {}...", target, via);

        // Dropping the send future on timeout tears down the pending connection.
        let request = self.client.head(target).send();
        let status = match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(response)) => {
                let code = response.status();
                if code.is_success() || code.is_redirection() {
                    Status::Online
                } else {
                    info!("Probe of {} answered {}", target, code);
                    Status::Offline
                }
            }
            Ok(Err(e)) => {
                info!("Probe of {} failed: {}", target, e);
                Status::Offline
            }
            Err(_) => {
                info!("Probe of {} timed out after {:?}", target, self.timeout);
                Status::Offline
            }
        };

        debug!(
            "Probe of {} -> {} in {:.1}ms",
            target,
            status,
            start.elapsed().as_secs_f64() * 1000.0
        );
        status
    }
}
