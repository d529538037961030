//! Metabase setup client.
//!
//! A new Metabase instance exposes a one-time setup token. [`MetabaseClient::bootstrap`]
//! exchanges it for an admin account, opens a session and labels the
//! instance after its container. The remaining operations work on an open
//! [`Session`]: registering database containers as data sources and minting
//! API keys.

mod payload;

use std::fmt;

use chrono::{SecondsFormat, Utc};
use reqwest::header::COOKIE;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{BootstrapStage, call, call_json, read_json, send};
use crate::config::{AppConfig, DatabaseConfig, MetabaseConfig};
use crate::engine::ContainerName;
use crate::error::BootstrapError;

const SESSION_PROPERTIES: &str = "/api/session/properties";
const SETUP: &str = "/api/setup";
const SESSION: &str = "/api/session";
const APPLICATION_NAME: &str = "/api/setting/application-name";
const DATABASE: &str = "/api/database";
const API_KEY: &str = "/api/api-key";
const SERIALIZATION_EXPORT: &str = "/api/ee/serialization/export";

/// An authenticated Metabase session.
#[derive(Clone, PartialEq, Eq)]
pub struct Session(String);

impl Session {
    /// Wrap a session id returned by `POST /api/session`.
    #[must_use]
    pub const fn new(id: String) -> Self {
        Self(id)
    }

    /// The session id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.0
    }

    fn cookie(&self) -> String {
        format!("metabase.SESSION={}", self.0)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Session(..)")
    }
}

/// A database registered in Metabase.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DataSource {
    /// Metabase's identifier, when the listing includes it.
    #[serde(default)]
    pub id: Option<i64>,
    /// Display name.
    pub name: String,
    /// Driver name, e.g. `postgres`.
    #[serde(default)]
    pub engine: Option<String>,
}

/// `GET /api/database` answers either `{"data": [...]}` or a bare array,
/// depending on the Metabase version.
#[derive(Deserialize)]
#[serde(untagged)]
enum DatabaseListing {
    Wrapped { data: Vec<DataSource> },
    Bare(Vec<DataSource>),
}

impl DatabaseListing {
    fn into_sources(self) -> Vec<DataSource> {
        match self {
            Self::Wrapped { data } | Self::Bare(data) => data,
        }
    }
}

#[derive(Deserialize)]
struct SessionProperties {
    #[serde(rename = "setup-token")]
    setup_token: Option<String>,
}

#[derive(Deserialize)]
struct SessionResponse {
    id: String,
}

#[derive(Deserialize)]
struct ApiKeyResponse {
    unmasked_key: String,
}

/// Client for one Metabase instance.
#[derive(Debug, Clone)]
pub struct MetabaseClient {
    http: reqwest::Client,
    base_url: String,
    admin: MetabaseConfig,
    database: DatabaseConfig,
}

impl MetabaseClient {
    /// Client for the instance at `base_url`, using the admin account and
    /// database credentials from `config`.
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, config: &AppConfig) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            admin: config.metabase.clone(),
            database: config.database.clone(),
        }
    }

    /// Client for a container published on the loopback interface.
    #[must_use]
    pub fn for_container(
        http: reqwest::Client,
        container: &ContainerName,
        config: &AppConfig,
    ) -> Self {
        Self::new(http, format!("http://localhost:{}", container.port()), config)
    }

    /// Root URL of the instance.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Read the one-time setup token.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapError::UnexpectedResponse` when the instance has
    /// already been set up and no longer publishes a token.
    pub async fn setup_token(&self) -> Result<String, BootstrapError> {
        let properties: SessionProperties =
            call_json(SESSION_PROPERTIES, self.http.get(self.url(SESSION_PROPERTIES))).await?;

        properties
            .setup_token
            .ok_or_else(|| BootstrapError::UnexpectedResponse {
                endpoint: String::from(SESSION_PROPERTIES),
                message: String::from("no setup token; the instance is already set up"),
            })
    }

    /// Create the admin account and name the site.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapError::UnexpectedStatus` when setup is refused.
    pub async fn setup(&self, token: &str, site_name: &str) -> Result<(), BootstrapError> {
        let body = payload::setup(token, site_name, &self.admin);
        call(SETUP, self.http.post(self.url(SETUP)).json(&body)).await?;
        Ok(())
    }

    /// Open a session as the admin account.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapError::UnexpectedStatus` for rejected credentials.
    pub async fn login(&self) -> Result<Session, BootstrapError> {
        let body = json!({
            "username": self.admin.admin_email,
            "password": self.admin.admin_password,
            "remember": true,
        });
        let session: SessionResponse =
            call_json(SESSION, self.http.post(self.url(SESSION)).json(&body)).await?;
        Ok(Session::new(session.id))
    }

    /// Set the application name shown in the UI.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapError::UnexpectedStatus` when the setting is
    /// refused, as community builds do.
    pub async fn set_application_name(
        &self,
        session: &Session,
        value: &str,
    ) -> Result<(), BootstrapError> {
        let request = self
            .http
            .put(self.url(APPLICATION_NAME))
            .header(COOKIE, session.cookie())
            .json(&json!({ "value": value }));
        call(APPLICATION_NAME, request).await?;
        Ok(())
    }

    /// Bring a fresh instance from unconfigured to ready.
    ///
    /// The site is named after the container and the application after its
    /// logical name and port. A refused application name is logged and
    /// tolerated.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapError::Halted` carrying the last completed stage and
    /// the failure of the following step. Steps already applied stay applied.
    pub async fn bootstrap(&self, container: &ContainerName) -> Result<Session, BootstrapError> {
        let mut stage = BootstrapStage::NotStarted;

        let token = self.setup_token().await.map_err(|error| stage.halt(error))?;
        stage = stage.next();
        debug!(url = %self.base_url, %stage, "setup token obtained");

        self.setup(&token, &container.encode())
            .await
            .map_err(|error| stage.halt(error))?;
        stage = stage.next();
        debug!(url = %self.base_url, %stage, "admin account created");

        let session = self.login().await.map_err(|error| stage.halt(error))?;
        let application_name = format!("metabase-{}-{}", container.name(), container.port());
        match self.set_application_name(&session, &application_name).await {
            Ok(()) => {}
            Err(error @ BootstrapError::UnexpectedStatus { .. }) => {
                warn!(%error, "application name refused; community builds do not support it");
            }
            Err(error) => return Err(stage.halt(error)),
        }
        stage = stage.next();

        info!(url = %self.base_url, %stage, application = %application_name, "metabase bootstrapped");
        Ok(session)
    }

    /// Data sources currently registered.
    ///
    /// # Errors
    ///
    /// Returns a `BootstrapError` when the listing fails or is not understood.
    pub async fn list_databases(&self, session: &Session) -> Result<Vec<DataSource>, BootstrapError> {
        let request = self
            .http
            .get(self.url(DATABASE))
            .header(COOKIE, session.cookie());
        let listing: DatabaseListing = call_json(DATABASE, request).await?;
        Ok(listing.into_sources())
    }

    /// Register a database container as a data source named
    /// `<engine>-<port>`.
    ///
    /// The current listing is checked first; a duplicate name is refused
    /// without sending the creation request.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapError::DuplicateDataSource` when the name is taken
    /// and `BootstrapError::RegistrationRejected` with the upstream body when
    /// Metabase refuses the registration.
    pub async fn register_data_source(
        &self,
        session: &Session,
        database: &ContainerName,
    ) -> Result<DataSource, BootstrapError> {
        let name = payload::data_source_name(database);
        let existing = self.list_databases(session).await?;
        if existing.iter().any(|source| source.name == name) {
            return Err(BootstrapError::DuplicateDataSource { name });
        }

        let body = payload::data_source(database, &self.database);
        let request = self
            .http
            .post(self.url(DATABASE))
            .header(COOKIE, session.cookie())
            .json(&body);
        let response = send(DATABASE, request).await?;
        if !response.status().is_success() {
            let upstream = response.text().await.unwrap_or_default();
            return Err(BootstrapError::RegistrationRejected {
                name,
                body: upstream,
            });
        }

        let created: DataSource = read_json(DATABASE, response).await?;
        info!(url = %self.base_url, data_source = %created.name, "data source registered");
        Ok(created)
    }

    /// Mint an API key in the configured permission group.
    ///
    /// The key is only ever shown once.
    ///
    /// # Errors
    ///
    /// Returns a `BootstrapError` when the key cannot be created.
    pub async fn create_api_key(&self, session: &Session) -> Result<String, BootstrapError> {
        let body = json!({
            "name": format!("apikey-{}", Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            "group_id": self.admin.api_key_group_id,
        });
        let request = self
            .http
            .post(self.url(API_KEY))
            .header(COOKIE, session.cookie())
            .json(&body);
        let key: ApiKeyResponse = call_json(API_KEY, request).await?;
        Ok(key.unmasked_key)
    }
}

/// `curl` command exporting the instance's content with an API key.
#[must_use]
pub fn export_curl(base_url: &str, api_key: &str) -> String {
    format!(
        "curl --location --request POST '{}{SERIALIZATION_EXPORT}' --header 'X-API-KEY: {api_key}'",
        base_url.trim_end_matches('/')
    )
}

#[cfg(test)]
mod tests;
