//! Time-bounded cache for the release tag list.
//!
//! The cache is an explicit object owning its clock, so the freshness
//! window can be exercised with a fake clock. A [`CacheFile`] optionally
//! mirrors the entry to disk so that separate invocations share it.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::TagLister;
use crate::error::TagError;

/// Source of the current time.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A fetched tag list and when it was fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedTags {
    /// Fetch time.
    pub fetched_at: DateTime<Utc>,
    /// Filtered, sorted tags.
    pub tags: Vec<String>,
}

/// JSON file holding one [`CachedTags`] entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheFile {
    path: Utf8PathBuf,
}

impl CacheFile {
    /// Cache file at `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<user cache dir>/metaship/tags.json`, when the platform has one.
    #[must_use]
    pub fn default_location() -> Option<Self> {
        let cache_dir = dirs::cache_dir()?;
        let base = Utf8PathBuf::from_path_buf(cache_dir).ok()?;
        Some(Self::new(base.join("metaship").join("tags.json")))
    }

    /// Location of the file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn split(&self) -> (&Utf8Path, &str) {
        let parent = self
            .path
            .parent()
            .filter(|dir| !dir.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let file_name = self.path.file_name().unwrap_or(self.path.as_str());
        (parent, file_name)
    }

    fn io_error(&self, error: &impl ToString) -> TagError {
        TagError::CacheIo {
            path: self.path.clone(),
            message: error.to_string(),
        }
    }

    /// Read the stored entry. A missing or unreadable file is no entry.
    ///
    /// # Errors
    ///
    /// Returns `TagError::CacheIo` when the file exists but cannot be read.
    pub fn load(&self) -> Result<Option<CachedTags>, TagError> {
        let (parent, file_name) = self.split();
        let dir = match Dir::open_ambient_dir(parent, ambient_authority()) {
            Ok(dir) => dir,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(self.io_error(&error)),
        };
        let content = match dir.read_to_string(file_name) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(self.io_error(&error)),
        };

        match serde_json::from_str(&content) {
            Ok(entry) => Ok(Some(entry)),
            Err(error) => {
                warn!(path = %self.path, %error, "ignoring unreadable tag cache");
                Ok(None)
            }
        }
    }

    /// Write `entry`, creating the parent directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `TagError::CacheIo` when the file cannot be written.
    pub fn store(&self, entry: &CachedTags) -> Result<(), TagError> {
        let (parent, file_name) = self.split();
        Dir::create_ambient_dir_all(parent, ambient_authority())
            .map_err(|error| self.io_error(&error))?;
        let dir = Dir::open_ambient_dir(parent, ambient_authority())
            .map_err(|error| self.io_error(&error))?;
        let content = serde_json::to_string(entry).map_err(|error| self.io_error(&error))?;
        dir.write(file_name, content)
            .map_err(|error| self.io_error(&error))
    }
}

/// Convert configured hours into a freshness window.
#[must_use]
pub fn ttl_from_hours(hours: u64) -> TimeDelta {
    i64::try_from(hours)
        .ok()
        .and_then(TimeDelta::try_hours)
        .unwrap_or(TimeDelta::MAX)
}

/// Serves the tag list from memory or disk while it is fresh.
pub struct TagCache<C> {
    clock: C,
    ttl: TimeDelta,
    entry: Option<CachedTags>,
    file: Option<CacheFile>,
}

impl<C: Clock> TagCache<C> {
    /// An empty in-memory cache.
    #[must_use]
    pub const fn new(clock: C, ttl: TimeDelta) -> Self {
        Self {
            clock,
            ttl,
            entry: None,
            file: None,
        }
    }

    /// Mirror the cache to `file`.
    #[must_use]
    pub fn with_file(mut self, file: CacheFile) -> Self {
        self.file = Some(file);
        self
    }

    fn is_fresh(&self, entry: &CachedTags) -> bool {
        let age = self.clock.now().signed_duration_since(entry.fetched_at);
        age >= TimeDelta::zero() && age < self.ttl
    }

    fn fresh_entry(&mut self) -> Option<Vec<String>> {
        if let Some(entry) = self.entry.as_ref().filter(|entry| self.is_fresh(entry)) {
            return Some(entry.tags.clone());
        }

        let stored = match self.file.as_ref().map(CacheFile::load).transpose() {
            Ok(stored) => stored.flatten(),
            Err(error) => {
                warn!(%error, "tag cache file unusable");
                None
            }
        };
        let loaded = stored.filter(|entry| self.is_fresh(entry))?;
        let tags = loaded.tags.clone();
        self.entry = Some(loaded);
        Some(tags)
    }

    /// The cached tags while fresh, otherwise a new listing.
    ///
    /// # Errors
    ///
    /// Returns the lister's error when a fetch is needed and fails.
    pub async fn get_or_fetch(&mut self, lister: &TagLister) -> Result<Vec<String>, TagError> {
        if let Some(tags) = self.fresh_entry() {
            debug!(count = tags.len(), "tag list served from cache");
            return Ok(tags);
        }
        self.refresh(lister).await
    }

    /// Fetch a new listing regardless of freshness.
    ///
    /// # Errors
    ///
    /// Returns the lister's error when the fetch fails.
    pub async fn refresh(&mut self, lister: &TagLister) -> Result<Vec<String>, TagError> {
        let tags = lister.list_tags().await?;
        let entry = CachedTags {
            fetched_at: self.clock.now(),
            tags: tags.clone(),
        };
        if let Some(file) = self.file.as_ref() {
            match file.store(&entry) {
                Ok(()) => info!(path = %file.path(), count = tags.len(), "tag cache written"),
                Err(error) => warn!(%error, "tag cache not written"),
            }
        }
        self.entry = Some(entry);
        Ok(tags)
    }
}
