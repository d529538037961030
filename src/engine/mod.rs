//! Container engine connection and management.
//!
//! Everything metaship asks of Docker or Podman goes through this module:
//! resolving and connecting to the engine socket, allocating host ports,
//! naming containers, launching them and finding them again.
//!
//! The engine socket is resolved through a fallback chain:
//!
//! 1. CLI argument (`--engine-socket`)
//! 2. Config file (`engine_socket` in TOML)
//! 3. `METASHIP_ENGINE_SOCKET` environment variable
//! 4. `DOCKER_HOST`, `CONTAINER_HOST`, `PODMAN_HOST`
//! 5. Platform default (`/var/run/docker.sock` on Unix)

mod connection;
mod inventory;
mod launch;
mod naming;
mod ports;
mod runtime;

pub use connection::{connect, ping, resolve_endpoint};
pub use inventory::Inventory;
pub use launch::{
    CLOUDBEAVER_CONTAINER_PORT, ContainerHandle, DatabaseEngine, LaunchPlan, Launcher,
    METABASE_CONTAINER_PORT, MetabaseEdition, MetabaseRequest, ServiceRequest,
};
pub use naming::{
    CLOUDBEAVER_CONTAINER, CONTAINER_PREFIX, ContainerKind, ContainerName, decode, encode,
};
pub use ports::{find_free_port, is_port_free};
pub use runtime::{ContainerRuntime, EngineFuture};

#[cfg(test)]
pub(crate) use runtime::mock;
