//! Metabase workflows: tags, launch and bootstrap, data sources, API keys.

use tracing::{info, warn};

use super::Context;
use crate::bootstrap::{DataSource, MetabaseClient, export_curl};
use crate::engine::{
    ContainerHandle, ContainerKind, ContainerName, ContainerRuntime, MetabaseEdition,
    MetabaseRequest, ServiceRequest,
};
use crate::error::Result as MetashipResult;
use crate::readiness::HttpProbe;
use crate::tags::{Clock, TagCache, TagLister};

/// Parameters for [`run_metabase`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunMetabaseParams<'a> {
    /// Release tag as listed.
    pub tag: &'a str,
    /// Image family.
    pub edition: MetabaseEdition,
    /// Running database container to hold Metabase's own state.
    pub app_database: Option<&'a str>,
    /// Only render the `docker run` command.
    pub dry_run: bool,
}

/// Outcome of [`run_metabase`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetabaseRun {
    /// Dry run: the command that would be executed.
    Planned {
        /// Equivalent `docker run` command.
        command: String,
    },
    /// A bootstrapped instance.
    Started {
        /// The started container.
        handle: ContainerHandle,
        /// Where the instance answers.
        url: String,
    },
}

/// A running Metabase instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetabaseInstance {
    /// Decoded container identifier.
    pub container: ContainerName,
    /// Image family, read from the tag.
    pub edition: MetabaseEdition,
}

impl MetabaseInstance {
    /// Where the instance answers.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://localhost:{}", self.container.port())
    }
}

/// A freshly minted API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKey {
    /// The key; Metabase shows it only once.
    pub key: String,
    /// `curl` command exporting the instance's content with the key.
    pub export_curl: String,
}

/// Release tags, from the cache while fresh.
///
/// # Errors
///
/// Returns `TagError` when a fetch is needed and fails.
pub async fn list_tags<C: Clock>(
    cache: &mut TagCache<C>,
    lister: &TagLister,
    refresh: bool,
) -> MetashipResult<Vec<String>> {
    let tags = if refresh {
        cache.refresh(lister).await?
    } else {
        cache.get_or_fetch(lister).await?
    };
    Ok(tags)
}

/// Launch Metabase, wait for `/api/health` and bootstrap it.
///
/// With `dry_run` nothing is started and the planned command is returned.
///
/// # Errors
///
/// Returns name or container errors for a bad application database, launch
/// errors, `ReadinessError` and `BootstrapError::Halted`.
pub async fn run_metabase<R: ContainerRuntime>(
    ctx: &Context<'_, R>,
    params: &RunMetabaseParams<'_>,
) -> MetashipResult<MetabaseRun> {
    let app_database = match params.app_database {
        Some(name) if params.dry_run => Some(name.parse::<ContainerName>()?),
        Some(name) => Some(ctx.running_container(name, ContainerKind::Database).await?),
        None => None,
    };
    let request = ServiceRequest::Metabase(MetabaseRequest {
        tag: params.tag.to_owned(),
        edition: params.edition,
        app_database,
    });

    let launcher = ctx.launcher();
    if params.dry_run {
        return Ok(MetabaseRun::Planned {
            command: launcher.dry_run(&request)?,
        });
    }

    let handle = launcher.launch(&request).await?;
    let url = format!("http://localhost:{}", handle.port);
    let probe = HttpProbe::new(ctx.http.clone(), format!("{url}/api/health"));
    ctx.wait_for(&probe).await?;

    let Some(identifier) = handle.identifier.as_ref() else {
        warn!(container = %handle.name, "started container has no decodable name; skipping setup");
        return Ok(MetabaseRun::Started { handle, url });
    };
    MetabaseClient::new(ctx.http.clone(), url.as_str(), ctx.config)
        .bootstrap(identifier)
        .await?;

    info!(container = %handle.name, %url, "metabase ready");
    Ok(MetabaseRun::Started { handle, url })
}

/// Running Metabase instances.
///
/// # Errors
///
/// Returns `ContainerError::ListFailed` when the engine cannot be queried.
pub async fn list_metabases<R: ContainerRuntime>(
    ctx: &Context<'_, R>,
) -> MetashipResult<Vec<MetabaseInstance>> {
    let containers = ctx.inventory().metabases().await?;
    Ok(containers
        .into_iter()
        .map(|container| MetabaseInstance {
            edition: MetabaseEdition::of_tag(container.name()),
            container,
        })
        .collect())
}

/// Remove a Metabase container.
///
/// # Errors
///
/// Returns name errors, `ContainerError::WrongKind` or `NotRunning`, and
/// `ContainerError::RemoveFailed`.
pub async fn remove_metabase<R: ContainerRuntime>(
    ctx: &Context<'_, R>,
    name: &str,
) -> MetashipResult<String> {
    let container = ctx.running_container(name, ContainerKind::Metabase).await?;
    let container_name = container.encode();
    let inventory = ctx.inventory();
    inventory.remove(&container_name).await?;
    if inventory.is_running(&container_name).await? {
        warn!(container = %container_name, "container still listed after removal");
    }
    Ok(container_name)
}

/// Register a running database in a running Metabase instance.
///
/// # Errors
///
/// Returns name or container errors for either argument,
/// `BootstrapError::DuplicateDataSource` and
/// `BootstrapError::RegistrationRejected`.
pub async fn add_database<R: ContainerRuntime>(
    ctx: &Context<'_, R>,
    metabase: &str,
    database: &str,
) -> MetashipResult<DataSource> {
    let instance = ctx.running_container(metabase, ContainerKind::Metabase).await?;
    let target = ctx.running_container(database, ContainerKind::Database).await?;

    let client = MetabaseClient::for_container(ctx.http.clone(), &instance, ctx.config);
    let session = client.login().await?;
    Ok(client.register_data_source(&session, &target).await?)
}

/// Mint an API key on a running Metabase instance.
///
/// # Errors
///
/// Returns name or container errors and `BootstrapError`s from the login
/// or key creation.
pub async fn create_api_key<R: ContainerRuntime>(
    ctx: &Context<'_, R>,
    metabase: &str,
) -> MetashipResult<ApiKey> {
    let instance = ctx.running_container(metabase, ContainerKind::Metabase).await?;
    let client = MetabaseClient::for_container(ctx.http.clone(), &instance, ctx.config);
    let session = client.login().await?;
    let key = client.create_api_key(&session).await?;

    Ok(ApiKey {
        export_curl: export_curl(client.base_url(), &key),
        key,
    })
}
