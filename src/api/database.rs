//! Database container workflows and the shared `CloudBeaver` console.

use tracing::{debug, info, warn};

use super::Context;
use crate::bootstrap::{CloudBeaverClient, Connection};
use crate::engine::{
    CLOUDBEAVER_CONTAINER, ContainerHandle, ContainerKind, ContainerName, ContainerRuntime,
    DatabaseEngine, ServiceRequest,
};
use crate::error::{ContainerError, Result as MetashipResult};
use crate::readiness::{HttpProbe, Probe, TcpProbe};

/// Result of removing a database container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseRemoval {
    /// The removed container.
    pub name: String,
    /// Whether a console connection for it was also deleted.
    pub console_connection_removed: bool,
}

/// Where to browse a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLink {
    /// Console URL.
    pub url: String,
    /// The connection registered for the database.
    pub connection: Connection,
}

/// Probe matching how the engine answers on its published port.
///
/// Non-HTTP engines must answer a protocol hello, so a port that is only
/// mapped does not count as ready.
fn readiness_probe(http: &reqwest::Client, engine: DatabaseEngine, port: u16) -> Box<dyn Probe> {
    match engine.health_path() {
        Some(path) => Box::new(HttpProbe::new(
            http.clone(),
            format!("http://localhost:{port}{path}"),
        )),
        None => Box::new(TcpProbe::localhost(port).with_request(engine.hello())),
    }
}

/// Start a database container and wait until it accepts connections.
///
/// # Errors
///
/// Returns launch errors from the engine and `ReadinessError` when the
/// engine does not come up in time or the wait is cancelled.
pub async fn create_database<R: ContainerRuntime>(
    ctx: &Context<'_, R>,
    engine: DatabaseEngine,
) -> MetashipResult<ContainerHandle> {
    let handle = ctx.launcher().launch(&ServiceRequest::Database(engine)).await?;
    let probe = readiness_probe(&ctx.http, engine, handle.port);
    let report = ctx.wait_for(probe.as_ref()).await?;
    info!(
        container = %handle.name,
        attempts = report.attempts,
        "database ready"
    );
    Ok(handle)
}

/// Running database containers.
///
/// # Errors
///
/// Returns `ContainerError::ListFailed` when the engine cannot be queried.
pub async fn list_databases<R: ContainerRuntime>(
    ctx: &Context<'_, R>,
) -> MetashipResult<Vec<ContainerName>> {
    Ok(ctx.inventory().databases().await?)
}

/// Remove a database container and, when the console is up, its console
/// connection.
///
/// The console cleanup is best effort: failures are logged, not returned.
///
/// # Errors
///
/// Returns `NameError` for a malformed name, `ContainerError::WrongKind` or
/// `NotRunning` when the name is not a running database, and
/// `ContainerError::RemoveFailed` when the engine refuses.
pub async fn remove_database<R: ContainerRuntime>(
    ctx: &Context<'_, R>,
    name: &str,
) -> MetashipResult<DatabaseRemoval> {
    let container = ctx.running_container(name, ContainerKind::Database).await?;
    let container_name = container.encode();
    let inventory = ctx.inventory();
    inventory.remove(&container_name).await?;
    if inventory.is_running(&container_name).await? {
        warn!(container = %container_name, "container still listed after removal");
    }

    let console = CloudBeaverClient::localhost(ctx.http.clone(), ctx.config);
    let console_connection_removed = if console.is_running().await {
        console
            .delete_connection_by_name(&container_name)
            .await
            .unwrap_or_else(|error| {
                warn!(%error, container = %container_name, "console connection not removed");
                false
            })
    } else {
        debug!("console not running, no connection to remove");
        false
    };

    Ok(DatabaseRemoval {
        name: container_name,
        console_connection_removed,
    })
}

/// Make sure the console is up and configured.
///
/// A console that already answers is reused. Otherwise any stale container
/// with the console's name is removed, a new one launched, awaited and
/// configured with the administrator account.
///
/// # Errors
///
/// Returns launch, readiness or `BootstrapError`s from the configuration
/// call.
pub async fn ensure_cloudbeaver<R: ContainerRuntime>(
    ctx: &Context<'_, R>,
) -> MetashipResult<CloudBeaverClient> {
    let console = CloudBeaverClient::localhost(ctx.http.clone(), ctx.config);
    if console.is_running().await {
        debug!(url = console.base_url(), "console already running");
        return Ok(console);
    }

    info!("console not running, starting it");
    match ctx.runtime.remove_container(CLOUDBEAVER_CONTAINER).await {
        Ok(()) => debug!("removed stale console container"),
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        }) => {}
        Err(error) => {
            return Err(ContainerError::RemoveFailed {
                name: String::from(CLOUDBEAVER_CONTAINER),
                message: error.to_string(),
            }
            .into());
        }
    }

    ctx.launcher().launch(&ServiceRequest::CloudBeaver).await?;
    let probe = HttpProbe::new(ctx.http.clone(), console.base_url());
    ctx.wait_for(&probe).await?;
    console.configure_server().await?;
    info!(
        url = console.base_url(),
        admin = %ctx.config.cloudbeaver.admin_name,
        "console started"
    );
    Ok(console)
}

/// Register a running database in the console and return where to open it.
///
/// # Errors
///
/// As [`ensure_cloudbeaver`], plus name and registration errors.
pub async fn open_database<R: ContainerRuntime>(
    ctx: &Context<'_, R>,
    name: &str,
) -> MetashipResult<ConsoleLink> {
    let container = ctx.running_container(name, ContainerKind::Database).await?;
    let console = ensure_cloudbeaver(ctx).await?;
    let connection = console.open_database(&container).await?;

    Ok(ConsoleLink {
        url: console.base_url().to_owned(),
        connection,
    })
}
