//! Setup clients for the tools metaship launches.
//!
//! A freshly started Metabase or `CloudBeaver` container is unconfigured.
//! The clients here drive each tool's HTTP API from that state to a usable
//! one: admin account, display name, registered data sources and API keys.
//!
//! Every call is a single request. Nothing is retried and nothing is rolled
//! back; a failing step is reported to the caller with the upstream status
//! and body.

pub mod cloudbeaver;
pub mod metabase;

use std::fmt;
use std::time::Duration;

use reqwest::header::SET_COOKIE;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;

pub use cloudbeaver::{CloudBeaverClient, Connection, ConsoleSession};
pub use metabase::{DataSource, MetabaseClient, Session, export_curl};

use crate::error::BootstrapError;

/// Time allowed for one setup request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Progress of a Metabase bootstrap sequence.
///
/// Transitions are strictly forward, one external exchange each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootstrapStage {
    /// Nothing has been sent yet.
    #[default]
    NotStarted,
    /// The one-time setup token has been obtained.
    LoggedIn,
    /// The admin account and site exist.
    Initialized,
    /// A session is open and the instance is labelled.
    Ready,
}

impl BootstrapStage {
    /// Stable lowercase name used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::LoggedIn => "logged-in",
            Self::Initialized => "initialized",
            Self::Ready => "ready",
        }
    }

    /// The following stage; `Ready` is terminal.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::NotStarted => Self::LoggedIn,
            Self::LoggedIn => Self::Initialized,
            Self::Initialized | Self::Ready => Self::Ready,
        }
    }

    /// Wrap the failure of the step after this stage.
    #[must_use]
    pub fn halt(self, error: BootstrapError) -> BootstrapError {
        BootstrapError::Halted {
            stage: self,
            source: Box::new(error),
        }
    }
}

impl fmt::Display for BootstrapStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP client shared by the setup clients and readiness probes.
#[must_use]
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("metaship/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

/// Send a request, mapping transport failures.
pub(crate) async fn send(
    endpoint: &str,
    request: RequestBuilder,
) -> Result<Response, BootstrapError> {
    request
        .send()
        .await
        .map_err(|error| BootstrapError::Request {
            endpoint: endpoint.to_owned(),
            message: error.to_string(),
        })
}

/// Pass a 2xx response through; turn anything else into
/// `BootstrapError::UnexpectedStatus` carrying the body.
pub(crate) async fn expect_success(
    endpoint: &str,
    response: Response,
) -> Result<Response, BootstrapError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(BootstrapError::UnexpectedStatus {
        endpoint: endpoint.to_owned(),
        status: status.as_u16(),
        body,
    })
}

/// Send a request and require a 2xx reply.
pub(crate) async fn call(endpoint: &str, request: RequestBuilder) -> Result<Response, BootstrapError> {
    expect_success(endpoint, send(endpoint, request).await?).await
}

/// Send a request, require a 2xx reply and decode its JSON body.
pub(crate) async fn call_json<T: DeserializeOwned>(
    endpoint: &str,
    request: RequestBuilder,
) -> Result<T, BootstrapError> {
    read_json(endpoint, call(endpoint, request).await?).await
}

/// Decode a JSON body.
pub(crate) async fn read_json<T: DeserializeOwned>(
    endpoint: &str,
    response: Response,
) -> Result<T, BootstrapError> {
    response
        .json::<T>()
        .await
        .map_err(|error| BootstrapError::UnexpectedResponse {
            endpoint: endpoint.to_owned(),
            message: error.to_string(),
        })
}

/// The `Cookie` header value that replays every cookie a response set.
///
/// Attributes such as `Path` or `HttpOnly` are dropped.
pub(crate) fn session_cookie(response: &Response) -> Option<String> {
    let pairs: Vec<&str> = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .collect();

    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}


#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(BootstrapStage::NotStarted, BootstrapStage::LoggedIn)]
    #[case(BootstrapStage::LoggedIn, BootstrapStage::Initialized)]
    #[case(BootstrapStage::Initialized, BootstrapStage::Ready)]
    #[case(BootstrapStage::Ready, BootstrapStage::Ready)]
    fn stages_only_move_forward(#[case] from: BootstrapStage, #[case] to: BootstrapStage) {
        assert_eq!(from.next(), to);
    }

    #[rstest]
    fn halt_records_last_completed_stage() {
        let error = BootstrapStage::Initialized.halt(BootstrapError::Request {
            endpoint: String::from("/api/session"),
            message: String::from("connection reset"),
        });

        assert!(matches!(
            error,
            BootstrapError::Halted {
                stage: BootstrapStage::Initialized,
                ..
            }
        ));
    }

    #[rstest]
    fn stage_display_is_kebab_case() {
        assert_eq!(BootstrapStage::NotStarted.to_string(), "not-started");
        assert_eq!(BootstrapStage::LoggedIn.to_string(), "logged-in");
    }
}
