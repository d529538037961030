//! Container engine endpoint resolution and connection.
//!
//! The endpoint comes from the first non-empty source in this order:
//!
//! 1. `engine_socket` (CLI `--engine-socket`, config file, `METASHIP_ENGINE_SOCKET`)
//! 2. `DOCKER_HOST`, `CONTAINER_HOST`, `PODMAN_HOST`
//! 3. The platform default socket
//!
//! Connections are made with `Bollard`, which speaks the Docker-compatible
//! API that both Docker and Podman expose.

use std::time::Duration;

use bollard::Docker;

use crate::error::ContainerError;

/// Environment variables consulted after the configured socket.
const ENGINE_HOST_VARS: &[&str] = &["DOCKER_HOST", "CONTAINER_HOST", "PODMAN_HOST"];

/// Request timeout in seconds for engine API calls.
///
/// Image pulls go through the same client, so this is generous.
const REQUEST_TIMEOUT_SECS: u64 = 600;

/// Time allowed for the engine to answer a ping.
const PING_TIMEOUT: Duration = Duration::from_secs(10);

#[cfg(unix)]
const DEFAULT_ENDPOINT: &str = "unix:///var/run/docker.sock";

#[cfg(windows)]
const DEFAULT_ENDPOINT: &str = "npipe:////./pipe/docker_engine";

/// Transport implied by an endpoint string.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Transport {
    /// `unix://` or `npipe://` URI, passed through unchanged.
    Socket(String),
    /// `http://`, `https://` or `tcp://` (rewritten to `http://`).
    Http(String),
}

impl Transport {
    fn parse(endpoint: &str) -> Self {
        if endpoint.starts_with("unix://") || endpoint.starts_with("npipe://") {
            return Self::Socket(endpoint.to_owned());
        }
        if let Some(address) = endpoint.strip_prefix("tcp://") {
            return Self::Http(format!("http://{address}"));
        }
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return Self::Http(endpoint.to_owned());
        }
        // Bare paths: `//./pipe/...` and `\\.\pipe\...` are named pipes,
        // anything else is a Unix socket path.
        if endpoint.starts_with("//") || endpoint.starts_with("\\\\") {
            Self::Socket(format!("npipe://{endpoint}"))
        } else {
            Self::Socket(format!("unix://{endpoint}"))
        }
    }
}

/// Pick the engine endpoint from configuration, environment and platform
/// defaults.
#[must_use]
pub fn resolve_endpoint<E: mockable::Env>(configured: Option<&str>, env: &E) -> String {
    configured
        .filter(|value| !value.is_empty())
        .map(String::from)
        .or_else(|| {
            ENGINE_HOST_VARS
                .iter()
                .filter_map(|name| env.string(name))
                .find(|value| !value.is_empty())
        })
        .unwrap_or_else(|| String::from(DEFAULT_ENDPOINT))
}

/// Open a client for the engine at `endpoint`.
///
/// The client is lazy: no request is made until the first API call.
///
/// # Errors
///
/// Returns `ContainerError::ConnectionFailed` when `Bollard` rejects the
/// endpoint.
pub fn connect(endpoint: &str) -> Result<Docker, ContainerError> {
    let client = match Transport::parse(endpoint) {
        Transport::Socket(uri) => {
            Docker::connect_with_socket(&uri, REQUEST_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
        }
        Transport::Http(uri) => {
            Docker::connect_with_http(&uri, REQUEST_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
        }
    };

    client.map_err(|error| ContainerError::ConnectionFailed {
        message: format!("{endpoint}: {error}"),
    })
}

/// Confirm the engine answers before doing real work.
///
/// # Errors
///
/// Returns `ContainerError::ConnectionFailed` when the ping fails or does not
/// complete within ten seconds.
pub async fn ping(docker: &Docker) -> Result<(), ContainerError> {
    match tokio::time::timeout(PING_TIMEOUT, docker.ping()).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(error)) => Err(ContainerError::ConnectionFailed {
            message: error.to_string(),
        }),
        Err(_) => Err(ContainerError::ConnectionFailed {
            message: format!(
                "engine did not answer a ping within {} seconds",
                PING_TIMEOUT.as_secs()
            ),
        }),
    }
}
