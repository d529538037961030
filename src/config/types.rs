//! Configuration data types for metaship.

use std::ops::RangeInclusive;
use std::time::Duration;

use clap::ValueEnum;
use md5::{Digest, Md5};
use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

use crate::error::ConfigError;

/// Where release tags are listed from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TagSourceKind {
    /// The Docker Hub repository tag listing.
    #[default]
    DockerHub,
    /// The GitHub repository tag listing.
    Github,
}

/// Credentials and port range for database containers.
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database user created in every engine.
    #[default("db")]
    pub user: String,

    /// Password for `user` (and the root account where the engine has one).
    #[default("db")]
    pub password: String,

    /// Database created in every engine.
    #[default("db")]
    pub name: String,

    /// First host port tried for new databases.
    #[default(5432)]
    pub port_start: u16,

    /// Last host port tried for new databases.
    #[default(65535)]
    pub port_end: u16,

    /// Hostname other containers use to reach ports published on the host.
    #[default("host.docker.internal")]
    pub host_alias: String,
}

impl DatabaseConfig {
    /// Host ports available to databases.
    #[must_use]
    pub const fn port_range(&self) -> RangeInclusive<u16> {
        self.port_start..=self.port_end
    }
}

/// Metabase container and bootstrap settings.
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct MetabaseConfig {
    /// First host port tried for new instances.
    #[default(3001)]
    pub port_start: u16,

    /// Last host port tried for new instances.
    #[default(3999)]
    pub port_end: u16,

    /// Admin account created during first-run setup.
    #[default("admin@metabase.test")]
    pub admin_email: String,

    /// Password for the admin account.
    #[default("metabot1")]
    pub admin_password: String,

    /// Given name for the admin account.
    #[default("Meta")]
    pub admin_first_name: String,

    /// Family name for the admin account.
    #[default("Ship")]
    pub admin_last_name: String,

    /// Locale chosen during setup.
    #[default("en")]
    pub site_locale: String,

    /// Token passed to enterprise images as `MB_PREMIUM_EMBEDDING_TOKEN`.
    pub enterprise_token: Option<String>,

    /// Permission group that new API keys join.
    #[default(2)]
    pub api_key_group_id: u64,
}

impl MetabaseConfig {
    /// Host ports available to Metabase instances.
    #[must_use]
    pub const fn port_range(&self) -> RangeInclusive<u16> {
        self.port_start..=self.port_end
    }
}

/// `CloudBeaver` console settings.
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct CloudBeaverConfig {
    /// Image reference for the console.
    #[default("dbeaver/cloudbeaver:latest")]
    pub image: String,

    /// Host port the console is published on.
    #[default(8978)]
    pub port: u16,

    /// Administrator created by the server configuration call.
    #[default("cbadmin")]
    pub admin_name: String,

    /// Administrator password.
    #[default("Cbadmin1")]
    pub admin_password: String,

    /// Server name shown in the console.
    #[default("CloudBeaver CE Server")]
    pub server_name: String,
}

impl CloudBeaverConfig {
    /// Upper-case hex MD5 of `admin_password`, the form the login call
    /// expects.
    #[must_use]
    pub fn admin_password_hash(&self) -> String {
        hex::encode_upper(Md5::digest(self.admin_password.as_bytes()))
    }
}

/// Readiness polling settings.
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Delay before the second probe, in milliseconds.
    #[default(1000)]
    pub interval_ms: u64,

    /// Upper bound for the doubling backoff, in milliseconds.
    #[default(5000)]
    pub max_interval_ms: u64,

    /// Overall deadline, in seconds.
    #[default(300)]
    pub timeout_secs: u64,
}

impl ReadinessConfig {
    /// Initial probe interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Backoff ceiling.
    #[must_use]
    pub const fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    /// Overall deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Release tag listing settings.
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Deserialize, Serialize)]
#[serde(default)]
pub struct TagsConfig {
    /// Registry queried for tags.
    pub source: TagSourceKind,

    /// Docker Hub repository, `namespace/name`.
    #[default("metabase/metabase-enterprise")]
    pub docker_hub_repository: String,

    /// GitHub repository, `owner/name`.
    #[default("metabase/metabase")]
    pub github_repository: String,

    /// Number of pages requested.
    #[default(9)]
    pub pages: u32,

    /// Tags per page.
    #[default(100)]
    pub page_size: u32,

    /// Hours a fetched tag list stays fresh.
    #[default(24)]
    pub cache_ttl_hours: u64,

    /// Mirror the cache to a file in the user cache directory.
    #[default(true)]
    pub persist_cache: bool,
}

/// Root application configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment variables,
/// command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `METASHIP_CONFIG_PATH` environment variable
/// 2. `.metaship.toml` in the current working directory
/// 3. `.metaship.toml` in the home directory
/// 4. `~/.config/metaship/config.toml` (XDG default)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "METASHIP",
    post_merge_hook,
    discovery(
        app_name = "metaship",
        env_var = "METASHIP_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".metaship.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// The container engine socket path or URL.
    pub engine_socket: Option<String>,

    /// Database container settings.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub database: DatabaseConfig,

    /// Metabase settings.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub metabase: MetabaseConfig,

    /// `CloudBeaver` settings.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub cloudbeaver: CloudBeaverConfig,

    /// Readiness polling settings.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub readiness: ReadinessConfig,

    /// Release tag settings.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub tags: TagsConfig,
}

impl AppConfig {
    /// Check cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "database.port_start",
            self.database.port_start,
            self.database.port_end,
        )?;
        check_range(
            "metabase.port_start",
            self.metabase.port_start,
            self.metabase.port_end,
        )?;
        check_positive("readiness.interval_ms", self.readiness.interval_ms)?;
        check_positive("readiness.timeout_secs", self.readiness.timeout_secs)?;
        if self.readiness.max_interval_ms < self.readiness.interval_ms {
            return Err(invalid(
                "readiness.max_interval_ms",
                "must not be smaller than readiness.interval_ms",
            ));
        }
        check_positive("tags.pages", u64::from(self.tags.pages))?;
        check_positive("tags.page_size", u64::from(self.tags.page_size))?;
        Ok(())
    }
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        // Treat empty strings from env or file layers as unset.
        self.engine_socket = self.engine_socket.take().filter(|value| !value.is_empty());
        self.metabase.enterprise_token = self
            .metabase
            .enterprise_token
            .take()
            .filter(|value| !value.is_empty());
        Ok(())
    }
}

fn check_range(field: &str, start: u16, end: u16) -> Result<(), ConfigError> {
    if start > end {
        let end_field = field.replace("port_start", "port_end");
        return Err(invalid(field, &format!("must not exceed {end_field}")));
    }
    Ok(())
}

fn check_positive(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(invalid(field, "must be positive"));
    }
    Ok(())
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: String::from(field),
        reason: String::from(reason),
    }
}
