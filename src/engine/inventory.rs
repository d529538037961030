//! Running containers owned by metaship.
//!
//! The engine's process list is the only record of what metaship started.
//! Nothing is cached: every call asks the engine again.

use std::collections::BTreeSet;

use tracing::{debug, info};

use super::naming::{ContainerKind, ContainerName, decode};
use super::runtime::ContainerRuntime;
use crate::error::ContainerError;

/// Queries and removes metaship containers.
pub struct Inventory<'a, R> {
    runtime: &'a R,
}

impl<'a, R: ContainerRuntime> Inventory<'a, R> {
    /// Create an inventory backed by `runtime`.
    #[must_use]
    pub const fn new(runtime: &'a R) -> Self {
        Self { runtime }
    }

    /// Names of running containers containing `prefix`.
    ///
    /// The engine's name filter is a substring match; names are re-checked
    /// here so the result never depends on how loosely an engine filters.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::ListFailed` when the engine cannot be queried.
    pub async fn list_running(&self, prefix: &str) -> Result<BTreeSet<String>, ContainerError> {
        let names = self
            .runtime
            .running_container_names(prefix)
            .await
            .map_err(|error| ContainerError::ListFailed {
                message: error.to_string(),
            })?;

        Ok(names
            .into_iter()
            .filter(|name| name.contains(prefix))
            .collect())
    }

    /// Running containers of `kind`, decoded.
    ///
    /// Names that carry the kind prefix but do not decode are skipped.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::ListFailed` when the engine cannot be queried.
    pub async fn running(&self, kind: ContainerKind) -> Result<Vec<ContainerName>, ContainerError> {
        let names = self.list_running(&kind.name_prefix()).await?;

        Ok(names
            .iter()
            .filter_map(|name| match decode(name) {
                Ok(container) if container.kind() == kind => Some(container),
                Ok(_) => None,
                Err(error) => {
                    debug!(%error, "skipping container with undecodable name");
                    None
                }
            })
            .collect())
    }

    /// Running database containers.
    ///
    /// # Errors
    ///
    /// As [`Inventory::running`].
    pub async fn databases(&self) -> Result<Vec<ContainerName>, ContainerError> {
        self.running(ContainerKind::Database).await
    }

    /// Running Metabase containers.
    ///
    /// # Errors
    ///
    /// As [`Inventory::running`].
    pub async fn metabases(&self) -> Result<Vec<ContainerName>, ContainerError> {
        self.running(ContainerKind::Metabase).await
    }

    /// Whether a container named exactly `name` is running.
    ///
    /// # Errors
    ///
    /// As [`Inventory::list_running`].
    pub async fn is_running(&self, name: &str) -> Result<bool, ContainerError> {
        Ok(self.list_running(name).await?.contains(name))
    }

    /// Force-remove a container.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::RemoveFailed` when the engine refuses.
    pub async fn remove(&self, name: &str) -> Result<(), ContainerError> {
        info!(container = name, "removing container");
        self.runtime
            .remove_container(name)
            .await
            .map_err(|error| ContainerError::RemoveFailed {
                name: name.to_owned(),
                message: error.to_string(),
            })
    }
}
