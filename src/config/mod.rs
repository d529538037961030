//! Configuration system for metaship.
//!
//! This module provides the configuration structures and CLI definitions for
//! metaship. Layer merging is handled by `ortho_config`: CLI flags override
//! environment variables, which override configuration files, which override
//! defaults.
//!
//! The configuration file is expected at `~/.config/metaship/config.toml` by
//! default.
//!
//! # Example Configuration
//!
//! ```toml
//! engine_socket = "unix:///run/user/1000/podman/podman.sock"
//!
//! [database]
//! user = "db"
//! password = "db"
//! port_start = 5432
//!
//! [metabase]
//! admin_email = "admin@metabase.test"
//! enterprise_token = "mb_dev_token"
//! api_key_group_id = 2
//!
//! [readiness]
//! interval_ms = 1000
//! max_interval_ms = 5000
//! timeout_secs = 300
//!
//! [tags]
//! source = "docker-hub"
//! cache_ttl_hours = 24
//! ```

mod cli;
mod loader;
mod types;


pub use cli::{
    AddDbArgs, ApiKeyArgs, Cli, Commands, ContainerArgs, CreateDbArgs, DbCommand,
    MetabaseCommand, OpenDbArgs, RunMetabaseArgs, TagsArgs,
};
pub use loader::{env_var_names, load_config, load_config_with_env};
pub use types::{
    AppConfig, CloudBeaverConfig, DatabaseConfig, MetabaseConfig, ReadinessConfig, TagSourceKind,
    TagsConfig,
};
