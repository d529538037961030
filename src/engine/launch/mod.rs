//! Container launch requests for every service metaship manages.
//!
//! A [`ServiceRequest`] is turned into a [`LaunchPlan`] (port allocated,
//! name encoded, image, environment and command resolved) and the plan is
//! then executed against a [`ContainerRuntime`]. Launching does not wait
//! for the service to come up; that is the readiness prober's job.

mod plan;

use std::fmt;
use std::str::FromStr;

use tracing::{debug, info};

pub use plan::LaunchPlan;

use super::naming::{CLOUDBEAVER_CONTAINER, ContainerKind, ContainerName};
use super::ports::find_free_port;
use super::runtime::ContainerRuntime;
use crate::config::{AppConfig, DatabaseConfig};
use crate::error::ContainerError;

/// Port Metabase listens on inside its container.
pub const METABASE_CONTAINER_PORT: u16 = 3000;

/// Port `CloudBeaver` listens on inside its container.
pub const CLOUDBEAVER_CONTAINER_PORT: u16 = 8978;

/// Postgres `SSLRequest`: length 8, request code 80877103.
const POSTGRES_SSL_REQUEST: &[u8] = &[0, 0, 0, 8, 0x04, 0xd2, 0x16, 0x2f];

/// Database engines metaship can start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseEngine {
    /// `PostgreSQL` 16.
    Postgres,
    /// `MariaDB` 10.11.
    MariaDb,
    /// `MySQL` 8.0.
    MySql,
    /// `ClickHouse` server.
    ClickHouse,
}

impl DatabaseEngine {
    /// Every supported engine.
    pub const ALL: [Self; 4] = [Self::Postgres, Self::MariaDb, Self::MySql, Self::ClickHouse];

    /// The identifier used on the command line and in container names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MariaDb => "mariadb",
            Self::MySql => "mysql",
            Self::ClickHouse => "clickhouse",
        }
    }

    /// Image reference.
    #[must_use]
    pub const fn image(self) -> &'static str {
        match self {
            Self::Postgres => "postgres:16",
            Self::MariaDb => "mariadb:10.11",
            Self::MySql => "mysql:8.0",
            Self::ClickHouse => "clickhouse/clickhouse-server:latest",
        }
    }

    /// Port the engine listens on inside the container.
    #[must_use]
    pub const fn container_port(self) -> u16 {
        match self {
            Self::Postgres => 5432,
            Self::MariaDb | Self::MySql => 3306,
            Self::ClickHouse => 8123,
        }
    }

    /// HTTP path answering 200 once the engine is up, for engines that
    /// speak HTTP on their published port.
    #[must_use]
    pub const fn health_path(self) -> Option<&'static str> {
        match self {
            Self::ClickHouse => Some("/ping"),
            Self::Postgres | Self::MariaDb | Self::MySql => None,
        }
    }

    /// Bytes to send on a fresh connection so the server answers.
    ///
    /// `MySQL` and `MariaDB` greet first. Postgres replies `S` or `N` to an
    /// `SSLRequest`.
    #[must_use]
    pub const fn hello(self) -> &'static [u8] {
        match self {
            Self::Postgres => POSTGRES_SSL_REQUEST,
            Self::MariaDb | Self::MySql | Self::ClickHouse => &[],
        }
    }

    /// The engine this container runs, read from its logical name.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::UnsupportedKind` when the name is not an
    /// engine identifier.
    pub fn of_container(container: &ContainerName) -> Result<Self, ContainerError> {
        container.name().parse()
    }

    fn env(self, database: &DatabaseConfig) -> Vec<(String, String)> {
        let pairs: Vec<(&str, &str)> = match self {
            Self::Postgres => vec![
                ("POSTGRES_USER", database.user.as_str()),
                ("POSTGRES_PASSWORD", database.password.as_str()),
            ],
            Self::MariaDb => vec![
                ("MARIADB_USER", database.user.as_str()),
                ("MARIADB_PASSWORD", database.password.as_str()),
                ("MARIADB_DATABASE", database.name.as_str()),
                ("MARIADB_ROOT_PASSWORD", database.password.as_str()),
            ],
            Self::MySql => vec![
                ("MYSQL_ROOT_PASSWORD", database.password.as_str()),
                ("MYSQL_DATABASE", database.name.as_str()),
                ("MYSQL_USER", database.user.as_str()),
                ("MYSQL_PASSWORD", database.password.as_str()),
            ],
            Self::ClickHouse => vec![
                ("CLICKHOUSE_USER", database.user.as_str()),
                ("CLICKHOUSE_PASSWORD", database.password.as_str()),
                ("CLICKHOUSE_DB", database.name.as_str()),
            ],
        };
        pairs
            .into_iter()
            .map(|(key, value)| (String::from(key), String::from(value)))
            .collect()
    }

    fn cmd(self) -> Vec<String> {
        match self {
            Self::Postgres => [
                "-c",
                "log_statement=all",
                "-c",
                "max_locks_per_transaction=1000",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            Self::MariaDb | Self::MySql | Self::ClickHouse => Vec::new(),
        }
    }

    /// `MB_DB_TYPE` and URI scheme when this engine can hold Metabase's
    /// application database.
    const fn metabase_app_db_type(self) -> Option<&'static str> {
        match self {
            Self::Postgres => Some("postgres"),
            Self::MariaDb | Self::MySql => Some("mysql"),
            Self::ClickHouse => None,
        }
    }
}

impl fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseEngine {
    type Err = ContainerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|engine| engine.as_str() == value)
            .ok_or_else(|| ContainerError::UnsupportedKind {
                kind: value.to_owned(),
            })
    }
}

/// Which Metabase image family to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetabaseEdition {
    /// `metabase/metabase`.
    Community,
    /// `metabase/metabase-enterprise`.
    #[default]
    Enterprise,
}

impl MetabaseEdition {
    /// The tag as published for this edition.
    ///
    /// Enterprise releases carry a `v1.` major where community releases
    /// carry `v0.`.
    #[must_use]
    pub fn image_tag(self, tag: &str) -> String {
        match self {
            Self::Community => tag.to_owned(),
            Self::Enterprise => tag.replacen("v0.", "v1.", 1),
        }
    }

    /// The edition a running instance was started with, read from the tag
    /// in its container name.
    #[must_use]
    pub fn of_tag(tag: &str) -> Self {
        if tag.starts_with("v1") {
            Self::Enterprise
        } else {
            Self::Community
        }
    }

    const fn repository(self) -> &'static str {
        match self {
            Self::Community => "metabase/metabase",
            Self::Enterprise => "metabase/metabase-enterprise",
        }
    }
}

impl fmt::Display for MetabaseEdition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Community => "oss",
            Self::Enterprise => "enterprise",
        })
    }
}

/// A Metabase launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetabaseRequest {
    /// Release tag as listed, e.g. `v0.50.1`.
    pub tag: String,
    /// Image family.
    pub edition: MetabaseEdition,
    /// Running database container to hold Metabase's own state.
    pub app_database: Option<ContainerName>,
}

/// Something metaship can start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceRequest {
    /// A database engine.
    Database(DatabaseEngine),
    /// A Metabase instance.
    Metabase(MetabaseRequest),
    /// The shared `CloudBeaver` console.
    CloudBeaver,
}

/// A started container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    /// Container name.
    pub name: String,
    /// Decoded identifier; `None` for the console, which has a fixed name.
    pub identifier: Option<ContainerName>,
    /// Engine-assigned container ID.
    pub id: String,
    /// Published host port.
    pub port: u16,
    /// Equivalent `docker run` command.
    pub command: String,
}

/// Plans and starts containers.
pub struct Launcher<'a, R> {
    runtime: &'a R,
    config: &'a AppConfig,
}

impl<'a, R: ContainerRuntime> Launcher<'a, R> {
    /// Create a launcher using `config` for credentials, ports and images.
    #[must_use]
    pub const fn new(runtime: &'a R, config: &'a AppConfig) -> Self {
        Self { runtime, config }
    }

    /// Resolve a request into a plan, allocating a host port.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::NoFreePort` when the configured range is
    /// exhausted, `ContainerError::UnsupportedKind` for a companion database
    /// Metabase cannot use, or `ContainerError::CreateFailed` when the name
    /// cannot be encoded.
    pub fn plan(&self, request: &ServiceRequest) -> Result<LaunchPlan, ContainerError> {
        match request {
            ServiceRequest::Database(engine) => self.plan_database(*engine),
            ServiceRequest::Metabase(metabase) => self.plan_metabase(metabase),
            ServiceRequest::CloudBeaver => Ok(self.plan_cloudbeaver()),
        }
    }

    /// The `docker run` command a launch would perform.
    ///
    /// # Errors
    ///
    /// As [`Launcher::plan`].
    pub fn dry_run(&self, request: &ServiceRequest) -> Result<String, ContainerError> {
        self.plan(request).map(|plan| plan.command_line())
    }

    /// Plan and start a container.
    ///
    /// # Errors
    ///
    /// As [`Launcher::plan`] and [`Launcher::execute`].
    pub async fn launch(&self, request: &ServiceRequest) -> Result<ContainerHandle, ContainerError> {
        let plan = self.plan(request)?;
        self.execute(&plan).await
    }

    /// Create and start the container a plan describes.
    ///
    /// A missing image is pulled and the create retried once.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::CreateFailed`, `ImagePullFailed` or
    /// `StartFailed` for the step the engine rejected.
    pub async fn execute(&self, plan: &LaunchPlan) -> Result<ContainerHandle, ContainerError> {
        info!(container = %plan.name, image = %plan.image, port = plan.host_port, "launching container");

        let id = match self
            .runtime
            .create_container(plan.create_options(), plan.create_body())
            .await
        {
            Ok(id) => id,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                info!(image = %plan.image, "image not present locally, pulling");
                self.runtime
                    .pull_image(&plan.image)
                    .await
                    .map_err(|error| ContainerError::ImagePullFailed {
                        image: plan.image.clone(),
                        message: error.to_string(),
                    })?;
                self.runtime
                    .create_container(plan.create_options(), plan.create_body())
                    .await
                    .map_err(|error| create_failed(plan, &error))?
            }
            Err(error) => return Err(create_failed(plan, &error)),
        };
        debug!(container = %plan.name, id = %id, "container created");

        self.runtime
            .start_container(&id)
            .await
            .map_err(|error| ContainerError::StartFailed {
                container_id: id.clone(),
                message: error.to_string(),
            })?;

        Ok(ContainerHandle {
            name: plan.name.clone(),
            identifier: plan.name.parse().ok(),
            id,
            port: plan.host_port,
            command: plan.command_line(),
        })
    }

    fn plan_database(&self, engine: DatabaseEngine) -> Result<LaunchPlan, ContainerError> {
        let database = &self.config.database;
        let host_port = find_free_port(database.port_range())?;
        let name = encode_name(ContainerKind::Database, engine.as_str(), host_port)?;

        Ok(LaunchPlan {
            name,
            image: String::from(engine.image()),
            host_port,
            container_port: engine.container_port(),
            env: engine.env(database),
            cmd: engine.cmd(),
            extra_hosts: Vec::new(),
        })
    }

    fn plan_metabase(&self, request: &MetabaseRequest) -> Result<LaunchPlan, ContainerError> {
        let mut env = Vec::new();
        if let Some(app_database) = request.app_database.as_ref() {
            env.extend(self.app_database_env(app_database)?);
        }
        if request.edition == MetabaseEdition::Enterprise
            && let Some(token) = self.config.metabase.enterprise_token.as_ref()
        {
            env.push((String::from("MB_PREMIUM_EMBEDDING_TOKEN"), token.clone()));
        }

        let host_port = find_free_port(self.config.metabase.port_range())?;
        let tag = request.edition.image_tag(&request.tag);
        let name = encode_name(ContainerKind::Metabase, &tag, host_port)?;

        Ok(LaunchPlan {
            name,
            image: format!("{}:{tag}", request.edition.repository()),
            host_port,
            container_port: METABASE_CONTAINER_PORT,
            env,
            cmd: Vec::new(),
            extra_hosts: vec![self.host_gateway_entry()],
        })
    }

    fn plan_cloudbeaver(&self) -> LaunchPlan {
        let console = &self.config.cloudbeaver;
        LaunchPlan {
            name: String::from(CLOUDBEAVER_CONTAINER),
            image: console.image.clone(),
            host_port: console.port,
            container_port: CLOUDBEAVER_CONTAINER_PORT,
            env: Vec::new(),
            cmd: Vec::new(),
            extra_hosts: vec![self.host_gateway_entry()],
        }
    }

    fn app_database_env(
        &self,
        app_database: &ContainerName,
    ) -> Result<Vec<(String, String)>, ContainerError> {
        let engine = DatabaseEngine::of_container(app_database)?;
        let db_type =
            engine
                .metabase_app_db_type()
                .ok_or_else(|| ContainerError::UnsupportedKind {
                    kind: format!("{engine} as Metabase application database"),
                })?;
        let database = &self.config.database;
        let uri = format!(
            "{db_type}://{host}:{port}/{name}?user={user}&password={password}",
            host = database.host_alias,
            port = app_database.port(),
            name = database.name,
            user = database.user,
            password = database.password,
        );

        Ok(vec![
            (String::from("MB_DB_TYPE"), String::from(db_type)),
            (String::from("MB_DB_CONNECTION_URI"), uri),
        ])
    }

    fn host_gateway_entry(&self) -> String {
        format!("{}:host-gateway", self.config.database.host_alias)
    }
}

fn encode_name(kind: ContainerKind, name: &str, port: u16) -> Result<String, ContainerError> {
    ContainerName::new(kind, name, port)
        .map(|container| container.encode())
        .map_err(|error| ContainerError::CreateFailed {
            name: format!("{kind} '{name}'"),
            message: error.to_string(),
        })
}

fn create_failed(plan: &LaunchPlan, error: &bollard::errors::Error) -> ContainerError {
    ContainerError::CreateFailed {
        name: plan.name.clone(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests;
