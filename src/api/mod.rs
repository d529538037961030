//! Orchestration API for metaship commands.
//!
//! Each command of the CLI is a function here: it launches, probes,
//! bootstraps and removes containers through the engine seam and the setup
//! clients, then returns a typed outcome. Nothing in this module prints or
//! exits; the binary renders outcomes.
//!
//! After a create or remove the inventory is queried again instead of
//! waiting a fixed delay.

mod database;
mod metabase;

use tokio_util::sync::CancellationToken;

pub use database::{
    ConsoleLink, DatabaseRemoval, create_database, ensure_cloudbeaver, list_databases,
    open_database, remove_database,
};
pub use metabase::{
    ApiKey, MetabaseInstance, MetabaseRun, RunMetabaseParams, add_database, create_api_key,
    list_metabases, list_tags, remove_metabase, run_metabase,
};

use crate::bootstrap::http_client;
use crate::config::AppConfig;
use crate::engine::{ContainerKind, ContainerName, ContainerRuntime, Inventory, Launcher};
use crate::error::{ContainerError, Result as MetashipResult};
use crate::readiness::{Probe, ReadinessPolicy, ReadyReport, wait_until_ready};

/// Dependencies shared by every command.
///
/// Groups the engine, configuration, HTTP client and cancellation token so
/// workflow functions take a single context argument.
pub struct Context<'a, R> {
    /// Container engine.
    pub runtime: &'a R,
    /// Merged configuration.
    pub config: &'a AppConfig,
    /// Client for readiness probes and setup calls.
    pub http: reqwest::Client,
    /// Cancels readiness waits, e.g. on Ctrl-C.
    pub cancel: CancellationToken,
}

impl<'a, R: ContainerRuntime> Context<'a, R> {
    /// Context with the default HTTP client.
    #[must_use]
    pub fn new(runtime: &'a R, config: &'a AppConfig, cancel: CancellationToken) -> Self {
        Self {
            runtime,
            config,
            http: http_client(),
            cancel,
        }
    }

    fn launcher(&self) -> Launcher<'a, R> {
        Launcher::new(self.runtime, self.config)
    }

    fn inventory(&self) -> Inventory<'a, R> {
        Inventory::new(self.runtime)
    }

    async fn wait_for(&self, probe: &dyn Probe) -> MetashipResult<ReadyReport> {
        let policy = ReadinessPolicy::from_config(&self.config.readiness);
        Ok(wait_until_ready(probe, &policy, &self.cancel).await?)
    }

    /// Decode `name`, check its role, and check that it is running.
    async fn running_container(
        &self,
        name: &str,
        kind: ContainerKind,
    ) -> MetashipResult<ContainerName> {
        let container: ContainerName = name.parse()?;
        if container.kind() != kind {
            return Err(ContainerError::WrongKind {
                name: name.to_owned(),
                expected: kind.segment().to_owned(),
            }
            .into());
        }
        if !self.inventory().is_running(&container.encode()).await? {
            return Err(ContainerError::NotRunning {
                name: name.to_owned(),
            }
            .into());
        }
        Ok(container)
    }
}
