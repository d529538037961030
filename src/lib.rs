//! Disposable databases and Metabase instances, wired together.
//!
//! `metaship` starts database engines (Postgres, MariaDB, MySQL, Clickhouse)
//! and Metabase instances as local containers, waits for them to answer, and
//! configures them through their HTTP APIs: the Metabase setup wizard, data
//! source registration and API keys, plus `CloudBeaver` connections for
//! browsing a database.
//!
//! The container engine is the only record of what is running. Containers
//! carry everything needed to find them again in their names, see
//! [`engine::ContainerName`].
//!
//! # Modules
//!
//! - [`api`]: one function per command, returning typed outcomes
//! - [`bootstrap`]: Metabase and `CloudBeaver` setup clients
//! - [`config`]: Configuration with layered precedence (CLI > env > file > defaults)
//! - [`engine`]: Container engine connection, naming, ports and launches
//! - [`error`]: Semantic error types for the application
//! - [`readiness`]: Polling a started service until it answers
//! - [`tags`]: Metabase release tags and their cache

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod engine;
pub mod error;
pub mod readiness;
pub mod tags;
