//! `metaship` application entry point.
//!
//! Uses `eyre` for opaque error handling at the application boundary,
//! converting domain-specific errors into human-readable reports.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/metaship/config.toml` or path from `METASHIP_CONFIG_PATH`)
//! 3. Environment variables (`METASHIP_*`)
//! 4. Command-line arguments
//!
//! Logs go to stderr and are filtered with `RUST_LOG`; stdout carries only
//! command output.

use bollard::Docker;
use clap::Parser;
use eyre::{Report, Result as EyreResult};
use metaship::api::{
    self, Context, MetabaseRun, RunMetabaseParams, add_database, create_api_key, create_database,
    list_metabases, open_database, remove_database, remove_metabase, run_metabase,
};
use metaship::bootstrap::http_client;
use metaship::config::{
    AddDbArgs, ApiKeyArgs, AppConfig, Cli, Commands, DbCommand, MetabaseCommand, OpenDbArgs,
    RunMetabaseArgs, TagsArgs, load_config,
};
use metaship::engine::{DatabaseEngine, MetabaseEdition, connect, ping, resolve_endpoint};
use metaship::error::Result as MetashipResult;
use metaship::tags::{CacheFile, SystemClock, TagCache, TagLister, ttl_from_hours};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "metaship=info";

#[tokio::main]
async fn main() -> EyreResult<()> {
    init_tracing();

    // Parse CLI first (for subcommand dispatch and global options).
    let cli = Cli::parse();

    // Load configuration with layered precedence: defaults < file < env < CLI.
    let config = load_config(&cli).map_err(Report::from)?;

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    run(&cli, &config, cancel).await.map_err(Report::from)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Cancel readiness waits on Ctrl-C.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            cancel.cancel();
        }
    });
}

/// Execute the CLI command, returning domain-specific errors.
///
/// Keeps semantic errors inside the run loop so the CLI boundary owns
/// conversion to `eyre::Report`.
async fn run(cli: &Cli, config: &AppConfig, cancel: CancellationToken) -> MetashipResult<()> {
    let endpoint = resolve_endpoint(config.engine_socket.as_deref(), &mockable::DefaultEnv::new());
    debug!(%endpoint, "opening container engine client");
    let docker = connect(&endpoint)?;
    if cli.command.requires_engine() {
        ping(&docker).await?;
    }

    let ctx = Context::new(&docker, config, cancel);
    match &cli.command {
        Commands::Db(command) => run_db(&ctx, command).await,
        Commands::Metabase(command) => run_metabase_command(&ctx, command).await,
    }
}

async fn run_db(ctx: &Context<'_, Docker>, command: &DbCommand) -> MetashipResult<()> {
    match command {
        DbCommand::Create(args) => {
            let engine: DatabaseEngine = args.engine.parse()?;
            let handle = create_database(ctx, engine).await?;
            print_line(&format!("{} listening on localhost:{}", handle.name, handle.port));
        }
        DbCommand::List => {
            for container in api::list_databases(ctx).await? {
                print_line(&container.encode());
            }
        }
        DbCommand::Rm(args) => {
            let removal = remove_database(ctx, &args.name).await?;
            print_line(&format!("removed {}", removal.name));
            if removal.console_connection_removed {
                print_line("removed its CloudBeaver connection");
            }
        }
        DbCommand::Open(args) => open_in_console(ctx, args).await?,
    }
    Ok(())
}

async fn open_in_console(ctx: &Context<'_, Docker>, args: &OpenDbArgs) -> MetashipResult<()> {
    let link = open_database(ctx, &args.name).await?;
    print_line(&format!("{} -> {}", link.connection.name, link.url));
    if !args.no_browser {
        launch_browser(&link.url);
    }
    Ok(())
}

async fn run_metabase_command(
    ctx: &Context<'_, Docker>,
    command: &MetabaseCommand,
) -> MetashipResult<()> {
    match command {
        MetabaseCommand::Tags(args) => list_tags(ctx.config, args).await?,
        MetabaseCommand::Run(args) => start_metabase(ctx, args).await?,
        MetabaseCommand::List => {
            for instance in list_metabases(ctx).await? {
                print_line(&format!(
                    "{}\t{}\t{}",
                    instance.container.encode(),
                    instance.edition,
                    instance.url()
                ));
            }
        }
        MetabaseCommand::Rm(args) => {
            let removed = remove_metabase(ctx, &args.name).await?;
            print_line(&format!("removed {removed}"));
        }
        MetabaseCommand::AddDb(args) => register_database(ctx, args).await?,
        MetabaseCommand::ApiKey(args) => mint_api_key(ctx, args).await?,
    }
    Ok(())
}

async fn list_tags(config: &AppConfig, args: &TagsArgs) -> MetashipResult<()> {
    let lister = TagLister::from_config(http_client(), &config.tags);
    let mut cache = TagCache::new(SystemClock, ttl_from_hours(config.tags.cache_ttl_hours));
    if config.tags.persist_cache {
        match CacheFile::default_location() {
            Some(file) => cache = cache.with_file(file),
            None => warn!("no cache directory on this platform, tags are not persisted"),
        }
    }

    for tag in api::list_tags(&mut cache, &lister, args.refresh).await? {
        print_line(&tag);
    }
    Ok(())
}

async fn start_metabase(ctx: &Context<'_, Docker>, args: &RunMetabaseArgs) -> MetashipResult<()> {
    let params = RunMetabaseParams {
        tag: &args.tag,
        edition: if args.oss {
            MetabaseEdition::Community
        } else {
            MetabaseEdition::Enterprise
        },
        app_database: args.db.as_deref(),
        dry_run: args.dry_run,
    };

    match run_metabase(ctx, &params).await? {
        MetabaseRun::Planned { command } => print_line(&command),
        MetabaseRun::Started { handle, url } => {
            print_line(&format!("{} ready at {url}", handle.name));
            print_line(&format!(
                "log in as {} / {}",
                ctx.config.metabase.admin_email, ctx.config.metabase.admin_password
            ));
            if !args.no_browser {
                launch_browser(&url);
            }
        }
    }
    Ok(())
}

async fn register_database(ctx: &Context<'_, Docker>, args: &AddDbArgs) -> MetashipResult<()> {
    let data_source = add_database(ctx, &args.metabase, &args.database).await?;
    match data_source.id {
        Some(id) => print_line(&format!("registered {} as database {id}", data_source.name)),
        None => print_line(&format!("registered {}", data_source.name)),
    }
    Ok(())
}

async fn mint_api_key(ctx: &Context<'_, Docker>, args: &ApiKeyArgs) -> MetashipResult<()> {
    let api_key = create_api_key(ctx, &args.metabase).await?;
    print_line(&api_key.key);
    if args.export_curl {
        print_line(&api_key.export_curl);
    }
    Ok(())
}

fn launch_browser(url: &str) {
    if let Err(error) = open::that_detached(url) {
        warn!(%error, %url, "could not open a browser");
    }
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn print_line(line: &str) {
    println!("{line}");
}
