//! `CloudBeaver` GraphQL client.
//!
//! The console is shared by every database container. Its server is
//! configured once after launch; afterwards each database is registered as
//! a global connection named after its container.

use reqwest::RequestBuilder;
use reqwest::header::COOKIE;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{call, read_json, send, session_cookie};
use crate::config::{AppConfig, CloudBeaverConfig, DatabaseConfig};
use crate::engine::ContainerName;
use crate::error::BootstrapError;

const GRAPHQL: &str = "/api/gql";
const GLOBAL_PROJECT: &str = "g_GlobalConfiguration";

const LOGIN: &str = include_str!("queries/login.graphql");
const CONFIGURE_SERVER: &str = include_str!("queries/configure_server.graphql");
const CONNECTIONS: &str = include_str!("queries/connections.graphql");
const CREATE_CONNECTION: &str = include_str!("queries/create_connection.graphql");
const DELETE_CONNECTION: &str = include_str!("queries/delete_connection.graphql");

/// A connection registered in the console.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Console identifier.
    pub id: String,
    /// Display name; metaship uses the container name.
    pub name: String,
    /// Driver, e.g. `postgresql:postgres-jdbc`.
    #[serde(default)]
    pub driver_id: Option<String>,
}

#[derive(Deserialize)]
struct GraphqlReply {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlMessage>,
}

#[derive(Deserialize)]
struct GraphqlMessage {
    message: String,
}

impl GraphqlReply {
    /// The `data` member, or the joined error messages.
    fn into_data<T: DeserializeOwned>(self) -> Result<T, String> {
        if !self.errors.is_empty() {
            let messages: Vec<String> = self.errors.into_iter().map(|error| error.message).collect();
            return Err(messages.join("; "));
        }
        let data = self
            .data
            .ok_or_else(|| String::from("reply carried no data"))?;
        serde_json::from_value(data).map_err(|error| error.to_string())
    }
}

#[derive(Deserialize)]
struct ConnectionsData {
    connections: Vec<Connection>,
}

#[derive(Deserialize)]
struct CreatedConnection {
    connection: Connection,
}

/// Cookie header value for a logged-in console session.
#[derive(Clone, PartialEq, Eq)]
pub struct ConsoleSession(String);

impl std::fmt::Debug for ConsoleSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ConsoleSession(..)")
    }
}

/// Driver used for a database, chosen by substring of its logical name.
fn driver_for(logical_name: &str) -> Option<&'static str> {
    if logical_name.contains("postgres") {
        Some("postgresql:postgres-jdbc")
    } else if logical_name.contains("mysql") || logical_name.contains("mariadb") {
        Some("mysql:mariaDB")
    } else if logical_name.contains("clickhouse") {
        Some("clickhouse:com_clickhouse")
    } else {
        None
    }
}

/// Client for the shared console.
#[derive(Debug, Clone)]
pub struct CloudBeaverClient {
    http: reqwest::Client,
    base_url: String,
    console: CloudBeaverConfig,
    database: DatabaseConfig,
}

impl CloudBeaverClient {
    /// Client for the console at `base_url`.
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, config: &AppConfig) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            console: config.cloudbeaver.clone(),
            database: config.database.clone(),
        }
    }

    /// Client for the console on its configured loopback port.
    #[must_use]
    pub fn localhost(http: reqwest::Client, config: &AppConfig) -> Self {
        Self::new(
            http,
            format!("http://localhost:{}", config.cloudbeaver.port),
            config,
        )
    }

    /// Root URL of the console.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether the console answers at all.
    pub async fn is_running(&self) -> bool {
        self.http
            .get(&self.base_url)
            .send()
            .await
            .is_ok_and(|response| response.status().is_success())
    }

    fn graphql_request(
        &self,
        session: Option<&ConsoleSession>,
        query: &str,
        variables: &Value,
    ) -> RequestBuilder {
        let request = self
            .http
            .post(format!("{}{GRAPHQL}", self.base_url))
            .json(&json!({ "query": query, "variables": variables }));
        match session {
            Some(cookie) => request.header(COOKIE, cookie.0.as_str()),
            None => request,
        }
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        session: Option<&ConsoleSession>,
        query: &str,
        variables: &Value,
    ) -> Result<T, BootstrapError> {
        let reply: GraphqlReply = read_json(
            GRAPHQL,
            call(GRAPHQL, self.graphql_request(session, query, variables)).await?,
        )
        .await?;
        reply
            .into_data()
            .map_err(|message| BootstrapError::UnexpectedResponse {
                endpoint: String::from(GRAPHQL),
                message,
            })
    }

    /// Create the administrator and apply the server settings.
    ///
    /// # Errors
    ///
    /// Returns a `BootstrapError` when the console refuses the configuration.
    pub async fn configure_server(&self) -> Result<(), BootstrapError> {
        let variables = json!({
            "configuration": {
                "adminName": self.console.admin_name,
                "adminPassword": self.console.admin_password,
                "serverName": self.console.server_name,
                "serverURL": self.base_url,
                "sessionExpireTime": 1_200_000_000_u64,
                "adminCredentialsSaveEnabled": true,
                "publicCredentialsSaveEnabled": true,
                "customConnectionsEnabled": false,
                "disabledDrivers": [],
                "enabledAuthProviders": ["local"],
                "anonymousAccessEnabled": true,
                "enabledFeatures": [],
                "resourceManagerEnabled": true,
                "secretManagerEnabled": false,
            }
        });
        let _configured: Value = self.execute(None, CONFIGURE_SERVER, &variables).await?;
        info!(url = %self.base_url, admin = %self.console.admin_name, "cloudbeaver configured");
        Ok(())
    }

    /// Log in as the administrator.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapError::UnexpectedResponse` when the login is
    /// refused or no session cookie is set.
    pub async fn login(&self) -> Result<ConsoleSession, BootstrapError> {
        let variables = json!({
            "provider": "local",
            "credentials": {
                "user": self.console.admin_name,
                "password": self.console.admin_password_hash(),
            },
            "linkUser": false,
            "forceSessionsLogout": false,
        });
        let response = call(GRAPHQL, self.graphql_request(None, LOGIN, &variables)).await?;
        let cookie = session_cookie(&response);
        let reply: GraphqlReply = read_json(GRAPHQL, response).await?;
        reply
            .into_data::<Value>()
            .map_err(|message| BootstrapError::UnexpectedResponse {
                endpoint: String::from(GRAPHQL),
                message,
            })?;

        cookie
            .map(ConsoleSession)
            .ok_or_else(|| BootstrapError::UnexpectedResponse {
                endpoint: String::from(GRAPHQL),
                message: String::from("login set no session cookie"),
            })
    }

    /// Connections visible to the session.
    ///
    /// # Errors
    ///
    /// Returns a `BootstrapError` when the listing fails.
    pub async fn list_connections(
        &self,
        session: &ConsoleSession,
    ) -> Result<Vec<Connection>, BootstrapError> {
        let listed: ConnectionsData = self
            .execute(Some(session), CONNECTIONS, &json!({}))
            .await?;
        Ok(listed.connections)
    }

    /// The connection named `name`, if registered.
    ///
    /// # Errors
    ///
    /// As [`CloudBeaverClient::list_connections`].
    pub async fn find_by_name(
        &self,
        session: &ConsoleSession,
        name: &str,
    ) -> Result<Option<Connection>, BootstrapError> {
        Ok(self
            .list_connections(session)
            .await?
            .into_iter()
            .find(|connection| connection.name == name))
    }

    /// Register a database container as a global connection named after
    /// the container.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapError::RegistrationRejected` when no driver matches
    /// the engine or the console refuses the connection.
    pub async fn create_connection(
        &self,
        session: &ConsoleSession,
        database: &ContainerName,
    ) -> Result<Connection, BootstrapError> {
        let name = database.encode();
        let driver = driver_for(database.name()).ok_or_else(|| {
            BootstrapError::RegistrationRejected {
                name: name.clone(),
                body: format!("no CloudBeaver driver for '{}'", database.name()),
            }
        })?;
        let port = database.port().to_string();
        let variables = json!({
            "projectId": GLOBAL_PROJECT,
            "config": {
                "configurationType": "MANUAL",
                "credentials": {
                    "userName": self.database.user,
                    "userPassword": self.database.password,
                },
                "mainPropertyValues": {
                    "database": "",
                    "host": self.database.host_alias,
                    "port": port,
                },
                "networkHandlersConfig": [],
                "properties": {},
                "providerProperties": {},
                "driverId": driver,
                "name": name,
                "host": self.database.host_alias,
                "port": port,
                "databaseName": "",
                "authModelId": "native",
                "saveCredentials": true,
            },
        });

        let response = send(
            GRAPHQL,
            self.graphql_request(Some(session), CREATE_CONNECTION, &variables),
        )
        .await?;
        if !response.status().is_success() {
            let upstream = response.text().await.unwrap_or_default();
            return Err(BootstrapError::RegistrationRejected {
                name,
                body: upstream,
            });
        }
        let reply: GraphqlReply = read_json(GRAPHQL, response).await?;
        let created: CreatedConnection = reply
            .into_data()
            .map_err(|body| BootstrapError::RegistrationRejected {
                name: name.clone(),
                body,
            })?;

        info!(connection = %created.connection.name, driver, "cloudbeaver connection created");
        Ok(created.connection)
    }

    /// Log in and register `database` unless a connection with its
    /// container name already exists.
    ///
    /// # Errors
    ///
    /// As [`CloudBeaverClient::login`] and
    /// [`CloudBeaverClient::create_connection`].
    pub async fn open_database(&self, database: &ContainerName) -> Result<Connection, BootstrapError> {
        let session = self.login().await?;
        if let Some(existing) = self.find_by_name(&session, &database.encode()).await? {
            debug!(connection = %existing.name, "cloudbeaver connection already present");
            return Ok(existing);
        }
        self.create_connection(&session, database).await
    }

    /// Log in and delete the connection named `name`.
    ///
    /// Returns whether a connection was found and deleted.
    ///
    /// # Errors
    ///
    /// Returns a `BootstrapError` when any call fails.
    pub async fn delete_connection_by_name(&self, name: &str) -> Result<bool, BootstrapError> {
        let session = self.login().await?;
        let Some(connection) = self.find_by_name(&session, name).await? else {
            debug!(connection = name, "no cloudbeaver connection to delete");
            return Ok(false);
        };

        let variables = json!({
            "projectId": GLOBAL_PROJECT,
            "connectionId": connection.id,
        });
        let _deleted: Value = self
            .execute(Some(&session), DELETE_CONNECTION, &variables)
            .await?;
        info!(connection = name, id = %connection.id, "cloudbeaver connection deleted");
        Ok(true)
    }
}
