use async_trait::async_trait;
use log::debug;
use std::time::Duration;
use tokio::net::TcpStream;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Answers whether the network constraint of a registration is currently met.
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_online(&self) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnline;

#[async_trait]
impl Connectivity for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }
}

/// Online when a TCP connection to `address` opens within the timeout.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Probe the host and port an HTTP endpoint would connect to.
    pub fn for_endpoint(endpoint: &reqwest::Url) -> Option<Self> {
        let host = endpoint.host_str()?;
        let port = endpoint.port_or_known_default()?;
        Some(Self::new(format!("{}:{}", host, port)))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl Connectivity for TcpProbe {
    async fn is_online(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("probe {} failed: {}", self.address, e);
                false
            }
            Err(_) => {
                debug!("probe {} timed out after {:?}", self.address, self.timeout);
                false
            }
        }
    }
}
