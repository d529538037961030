//! The narrow slice of the engine API metaship uses.
//!
//! Launch and inventory code talk to [`ContainerRuntime`] rather than to
//! `Bollard` directly so they can be exercised against a mock engine.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use bollard::Docker;
use bollard::models::ContainerCreateBody;
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use futures_util::TryStreamExt;

/// Boxed future returned by [`ContainerRuntime`] implementors.
pub type EngineFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, bollard::errors::Error>> + Send + 'a>>;

/// Container lifecycle calls needed by the launcher and inventory.
pub trait ContainerRuntime {
    /// Create a container and return its engine ID.
    fn create_container(
        &self,
        options: CreateContainerOptions,
        body: ContainerCreateBody,
    ) -> EngineFuture<'_, String>;

    /// Start a created container.
    fn start_container(&self, id: &str) -> EngineFuture<'_, ()>;

    /// Pull `image` and wait for the pull to finish.
    fn pull_image(&self, image: &str) -> EngineFuture<'_, ()>;

    /// Force-remove a container by name or ID.
    fn remove_container(&self, name: &str) -> EngineFuture<'_, ()>;

    /// Names of running containers whose name contains `name_filter`,
    /// without the engine's leading `/`.
    fn running_container_names(&self, name_filter: &str) -> EngineFuture<'_, Vec<String>>;
}

impl ContainerRuntime for Docker {
    fn create_container(
        &self,
        options: CreateContainerOptions,
        body: ContainerCreateBody,
    ) -> EngineFuture<'_, String> {
        Box::pin(async move {
            let response = Self::create_container(self, Some(options), body).await?;
            Ok(response.id)
        })
    }

    fn start_container(&self, id: &str) -> EngineFuture<'_, ()> {
        let container_id = id.to_owned();
        Box::pin(async move {
            Self::start_container(self, &container_id, None::<StartContainerOptions>).await
        })
    }

    fn pull_image(&self, image: &str) -> EngineFuture<'_, ()> {
        let reference = image.to_owned();
        Box::pin(async move {
            let options = CreateImageOptions {
                from_image: Some(reference),
                ..Default::default()
            };
            self.create_image(Some(options), None, None)
                .try_collect::<Vec<_>>()
                .await?;
            Ok(())
        })
    }

    fn remove_container(&self, name: &str) -> EngineFuture<'_, ()> {
        let container_name = name.to_owned();
        Box::pin(async move {
            let options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };
            Self::remove_container(self, &container_name, Some(options)).await
        })
    }

    fn running_container_names(&self, name_filter: &str) -> EngineFuture<'_, Vec<String>> {
        let filters = HashMap::from([(String::from("name"), vec![name_filter.to_owned()])]);
        Box::pin(async move {
            let options = ListContainersOptions {
                filters: Some(filters),
                ..Default::default()
            };
            let summaries = self.list_containers(Some(options)).await?;

            Ok(summaries
                .into_iter()
                .filter_map(|summary| summary.names)
                .filter_map(|names| names.into_iter().next())
                .map(|name| name.trim_start_matches('/').to_owned())
                .collect())
        })
    }
}
