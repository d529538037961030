//! Command-line argument definitions for metaship.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Command-line interface for metaship.
#[derive(Debug, Parser)]
#[command(name = "metaship")]
#[command(
    author,
    version,
    about = "Disposable databases and Metabase instances, wired together"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Container engine socket path or URL.
    #[arg(long, global = true)]
    pub engine_socket: Option<String>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage database containers.
    #[command(subcommand)]
    Db(DbCommand),

    /// Manage Metabase containers.
    #[command(subcommand)]
    Metabase(MetabaseCommand),
}

impl Commands {
    /// Whether the command talks to the container engine.
    ///
    /// Tag listing and dry runs never do, so they work with the engine down.
    #[must_use]
    pub const fn requires_engine(&self) -> bool {
        !matches!(
            self,
            Self::Metabase(
                MetabaseCommand::Tags(_)
                    | MetabaseCommand::Run(RunMetabaseArgs { dry_run: true, .. })
            )
        )
    }
}

/// `metaship db ...`
#[derive(Debug, Subcommand)]
pub enum DbCommand {
    /// Start a database container.
    Create(CreateDbArgs),

    /// List running database containers.
    List,

    /// Remove a database container.
    Rm(ContainerArgs),

    /// Register a database in `CloudBeaver` and open the console.
    Open(OpenDbArgs),
}

/// `metaship metabase ...`
#[derive(Debug, Subcommand)]
pub enum MetabaseCommand {
    /// List available Metabase release tags.
    Tags(TagsArgs),

    /// Start and configure a Metabase instance.
    Run(RunMetabaseArgs),

    /// List running Metabase containers.
    List,

    /// Remove a Metabase container.
    Rm(ContainerArgs),

    /// Register a running database as a data source.
    AddDb(AddDbArgs),

    /// Create an API key on a running instance.
    ApiKey(ApiKeyArgs),
}

/// Arguments for `db create`.
#[derive(Debug, Parser)]
pub struct CreateDbArgs {
    /// Engine to start: postgres, mariadb, mysql or clickhouse.
    #[arg(required = true)]
    pub engine: String,
}

/// Arguments naming an existing container.
#[derive(Debug, Parser)]
pub struct ContainerArgs {
    /// Container name, e.g. `metaship-db-postgres-5432`.
    #[arg(required = true)]
    pub name: String,
}

/// Arguments for `db open`.
#[derive(Debug, Parser)]
pub struct OpenDbArgs {
    /// Database container name.
    #[arg(required = true)]
    pub name: String,

    /// Print the console URL without launching a browser.
    #[arg(long)]
    pub no_browser: bool,
}

/// Arguments for `metabase tags`.
#[derive(Debug, Parser)]
pub struct TagsArgs {
    /// Ignore cached tags and fetch again.
    #[arg(long)]
    pub refresh: bool,
}

/// Arguments for `metabase run`.
#[derive(Debug, Parser)]
pub struct RunMetabaseArgs {
    /// Release tag, e.g. `v0.50.1`.
    #[arg(required = true)]
    pub tag: String,

    /// Database container to use as the application database.
    #[arg(long)]
    pub db: Option<String>,

    /// Use the open-source image instead of the enterprise one.
    #[arg(long)]
    pub oss: bool,

    /// Print the `docker run` command instead of starting anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the instance URL without launching a browser.
    #[arg(long)]
    pub no_browser: bool,
}

/// Arguments for `metabase add-db`.
#[derive(Debug, Parser)]
pub struct AddDbArgs {
    /// Metabase container name.
    #[arg(required = true)]
    pub metabase: String,

    /// Database container name.
    #[arg(required = true)]
    pub database: String,
}

/// Arguments for `metabase api-key`.
#[derive(Debug, Parser)]
pub struct ApiKeyArgs {
    /// Metabase container name.
    #[arg(required = true)]
    pub metabase: String,

    /// Print a serialization-export `curl` command using the key.
    #[arg(long)]
    pub export_curl: bool,
}
