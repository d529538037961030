//! Probes: one readiness check against one endpoint.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Boxed future returned by [`Probe::check`].
///
/// `Err` carries a short reason used only for logging.
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'a>>;

/// A single readiness check.
pub trait Probe: Send + Sync {
    /// Human-readable description of what is probed.
    fn target(&self) -> &str;

    /// Run the check once.
    fn check(&self) -> ProbeFuture<'_>;
}

/// Time allowed for one HTTP request or TCP connect.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Ready when `GET url` answers 200.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    /// Probe `url` using `client`.
    #[must_use]
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl Probe for HttpProbe {
    fn target(&self) -> &str {
        &self.url
    }

    fn check(&self) -> ProbeFuture<'_> {
        Box::pin(async move {
            let response = self
                .client
                .get(&self.url)
                .timeout(ATTEMPT_TIMEOUT)
                .send()
                .await
                .map_err(|error| error.to_string())?;

            match response.status() {
                StatusCode::OK => Ok(()),
                other => Err(format!("answered {other}")),
            }
        })
    }
}

/// Ready when the server behind `address` answers on a fresh connection.
///
/// A bare connect is not enough: the engine's port proxy accepts
/// connections before the server inside the container listens, then closes
/// them. The probe sends `request` (possibly nothing, for protocols where
/// the server speaks first) and needs at least one byte back.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: String,
    request: &'static [u8],
}

impl TcpProbe {
    /// Probe `host:port`, waiting for the server to speak first.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            request: &[],
        }
    }

    /// Probe a port on the loopback interface.
    #[must_use]
    pub fn localhost(port: u16) -> Self {
        Self::new(format!("127.0.0.1:{port}"))
    }

    /// Send `request` after connecting and wait for any reply to it.
    #[must_use]
    pub const fn with_request(mut self, request: &'static [u8]) -> Self {
        self.request = request;
        self
    }

    async fn exchange(&self) -> Result<(), String> {
        let mut stream = TcpStream::connect(&self.address)
            .await
            .map_err(|error| error.to_string())?;
        if !self.request.is_empty() {
            stream
                .write_all(self.request)
                .await
                .map_err(|error| error.to_string())?;
        }

        let mut reply = [0_u8; 1];
        match stream.read(&mut reply).await {
            Ok(0) => Err(String::from("closed without answering")),
            Ok(_) => Ok(()),
            Err(error) => Err(error.to_string()),
        }
    }
}

impl Probe for TcpProbe {
    fn target(&self) -> &str {
        &self.address
    }

    fn check(&self) -> ProbeFuture<'_> {
        Box::pin(async move {
            tokio::time::timeout(ATTEMPT_TIMEOUT, self.exchange())
                .await
                .unwrap_or_else(|_| Err(String::from("no answer in time")))
        })
    }
}
