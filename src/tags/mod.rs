//! Metabase release tags.
//!
//! [`TagLister`] pages through a registry listing, keeps release tags only
//! and orders them newest first. The listing has no reliable last-page
//! signal, so a fixed number of pages is requested; older releases beyond
//! that ceiling are not listed.
//!
//! Ordering compares the version remainder as plain strings. That is not
//! semantic-version ordering: `49.2` sorts above `49.10`.

mod cache;
mod source;

use tracing::{debug, info};

pub use cache::{CacheFile, CachedTags, Clock, SystemClock, TagCache, ttl_from_hours};
pub use source::{DockerHubSource, GitHubSource, TagFuture, TagSource, source_for};

use crate::config::TagsConfig;
use crate::error::TagError;

/// Markers of pre-release or moving tags.
const DENYLIST: [&str; 7] = ["beta", "alpha", "RC", "rc", "nightly", "latest", "HEAD"];

/// Whether `tag` names a stable release.
#[must_use]
pub fn is_release_tag(tag: &str) -> bool {
    !DENYLIST.iter().any(|marker| tag.contains(marker))
        && !tag.ends_with(".x")
        && !tag.starts_with("1.")
}

/// The tag as listed to users: enterprise `v1.` majors shown as `v0.`.
#[must_use]
pub fn display_tag(tag: &str) -> String {
    tag.replacen("v1", "v0", 1)
}

fn sort_key(tag: &str) -> String {
    tag.replacen("v0", "", 1)
}

/// Order tags newest first by plain string comparison of their version
/// remainder.
pub fn sort_tags(tags: &mut [String]) {
    tags.sort_by_cached_key(|tag| std::cmp::Reverse(sort_key(tag)));
}

/// Filter, rename and order a raw listing. Duplicates left by the rename
/// are dropped.
#[must_use]
pub fn release_tags<I>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut tags: Vec<String> = raw
        .into_iter()
        .filter(|tag| is_release_tag(tag))
        .map(|tag| display_tag(&tag))
        .collect();
    sort_tags(&mut tags);
    tags.dedup();
    tags
}

/// Lists release tags from one source.
pub struct TagLister {
    source: Box<dyn TagSource>,
    pages: u32,
    page_size: u32,
}

impl TagLister {
    /// Request `pages` pages of `page_size` tags from `source`.
    #[must_use]
    pub fn new(source: Box<dyn TagSource>, pages: u32, page_size: u32) -> Self {
        Self {
            source,
            pages,
            page_size,
        }
    }

    /// Lister for the configured source and paging.
    #[must_use]
    pub fn from_config(http: reqwest::Client, config: &TagsConfig) -> Self {
        Self::new(source_for(http, config), config.pages, config.page_size)
    }

    /// Fetch up to the page ceiling and return release tags, newest first.
    ///
    /// Paging stops early at the first empty page.
    ///
    /// # Errors
    ///
    /// Returns `TagError::FetchFailed` when any page fails to load.
    pub async fn list_tags(&self) -> Result<Vec<String>, TagError> {
        let mut raw = Vec::new();
        for page in 1..=self.pages {
            let names = self.source.fetch_page(page, self.page_size).await?;
            if names.is_empty() {
                debug!(source = self.source.describe(), page, "empty page, stopping");
                break;
            }
            raw.extend(names);
        }

        let fetched = raw.len();
        let tags = release_tags(raw);
        info!(
            source = self.source.describe(),
            fetched,
            releases = tags.len(),
            "release tags listed"
        );
        Ok(tags)
    }
}
