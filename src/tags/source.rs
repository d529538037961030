//! Registries that publish Metabase release tags.

use std::future::Future;
use std::pin::Pin;

use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::{TagSourceKind, TagsConfig};
use crate::error::TagError;

/// Boxed future returned by [`TagSource::fetch_page`].
pub type TagFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<String>, TagError>> + Send + 'a>>;

/// A paginated tag listing.
pub trait TagSource: Send + Sync {
    /// Short description for logs.
    fn describe(&self) -> &str;

    /// Tag names on page `page` (1-based). A page past the end is empty.
    fn fetch_page(&self, page: u32, page_size: u32) -> TagFuture<'_>;
}

const DOCKER_HUB_URL: &str = "https://hub.docker.com";
const GITHUB_API_URL: &str = "https://api.github.com";

#[derive(Deserialize)]
struct NamedTag {
    name: String,
}

#[derive(Deserialize)]
struct DockerHubPage {
    #[serde(default)]
    results: Vec<NamedTag>,
}

/// Fetch one page; a 404 means the listing has no such page.
async fn get_page<T: DeserializeOwned>(
    http: &reqwest::Client,
    url: String,
) -> Result<Option<T>, TagError> {
    let fetch_failed = |message: String| TagError::FetchFailed {
        url: url.clone(),
        message,
    };

    let response = http
        .get(&url)
        .send()
        .await
        .map_err(|error| fetch_failed(error.to_string()))?;
    match response.status() {
        StatusCode::NOT_FOUND => {
            debug!(%url, "page past the end of the listing");
            Ok(None)
        }
        status if status.is_success() => response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|error| fetch_failed(error.to_string())),
        status => Err(fetch_failed(format!("answered {status}"))),
    }
}

/// Docker Hub repository tags.
#[derive(Debug, Clone)]
pub struct DockerHubSource {
    http: reqwest::Client,
    base_url: String,
    repository: String,
}

impl DockerHubSource {
    /// Tags of `repository` (`namespace/name`) on Docker Hub.
    #[must_use]
    pub fn new(http: reqwest::Client, repository: impl Into<String>) -> Self {
        Self::with_base_url(http, DOCKER_HUB_URL, repository)
    }

    /// Tags served from another Docker Hub compatible host.
    #[must_use]
    pub fn with_base_url(
        http: reqwest::Client,
        base_url: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            repository: repository.into(),
        }
    }
}

impl TagSource for DockerHubSource {
    fn describe(&self) -> &str {
        &self.repository
    }

    fn fetch_page(&self, page: u32, page_size: u32) -> TagFuture<'_> {
        let url = format!(
            "{}/v2/repositories/{}/tags/?page_size={page_size}&page={page}",
            self.base_url, self.repository
        );
        Box::pin(async move {
            let listing: Option<DockerHubPage> = get_page(&self.http, url).await?;
            Ok(listing
                .map(|found| found.results.into_iter().map(|tag| tag.name).collect())
                .unwrap_or_default())
        })
    }
}

/// GitHub repository tags.
#[derive(Debug, Clone)]
pub struct GitHubSource {
    http: reqwest::Client,
    base_url: String,
    repository: String,
}

impl GitHubSource {
    /// Tags of `repository` (`owner/name`) on GitHub.
    #[must_use]
    pub fn new(http: reqwest::Client, repository: impl Into<String>) -> Self {
        Self::with_base_url(http, GITHUB_API_URL, repository)
    }

    /// Tags served from another GitHub API host.
    #[must_use]
    pub fn with_base_url(
        http: reqwest::Client,
        base_url: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            repository: repository.into(),
        }
    }
}

impl TagSource for GitHubSource {
    fn describe(&self) -> &str {
        &self.repository
    }

    fn fetch_page(&self, page: u32, page_size: u32) -> TagFuture<'_> {
        let url = format!(
            "{}/repos/{}/tags?per_page={page_size}&page={page}",
            self.base_url, self.repository
        );
        Box::pin(async move {
            let listing: Option<Vec<NamedTag>> = get_page(&self.http, url).await?;
            Ok(listing
                .map(|found| found.into_iter().map(|tag| tag.name).collect())
                .unwrap_or_default())
        })
    }
}

/// The source selected by `[tags]` configuration.
#[must_use]
pub fn source_for(http: reqwest::Client, config: &TagsConfig) -> Box<dyn TagSource> {
    match config.source {
        TagSourceKind::DockerHub => Box::new(DockerHubSource::new(
            http,
            config.docker_hub_repository.clone(),
        )),
        TagSourceKind::Github => Box::new(GitHubSource::new(http, config.github_repository.clone())),
    }
}
