//! Given/when steps for release tag scenarios.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use metaship::tags::{Clock, TagCache, TagFuture, TagLister, TagSource};
use rstest_bdd_macros::{given, when};

use super::StepResult;
use super::state::TagsState;

const PAGE_CEILING: u32 = 9;

/// A registry serving fixed pages and counting requests.
struct FakeRegistry {
    pages: Vec<Vec<String>>,
    requests: Arc<AtomicU32>,
}

impl TagSource for FakeRegistry {
    fn describe(&self) -> &str {
        "fake registry"
    }

    fn fetch_page(&self, page: u32, _page_size: u32) -> TagFuture<'_> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let names = usize::try_from(page)
            .ok()
            .and_then(|index| self.pages.get(index.saturating_sub(1)))
            .cloned()
            .unwrap_or_default();
        Box::pin(async move { Ok(names) })
    }
}

/// A clock that only moves when told to.
#[derive(Clone)]
struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

impl ManualClock {
    fn advance(&self, by: TimeDelta) {
        let mut now = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lister(tags_state: &TagsState) -> StepResult<TagLister> {
    let pages = tags_state
        .pages
        .get()
        .ok_or_else(|| String::from("pages should be set"))?;
    let requests = tags_state
        .requests
        .get()
        .ok_or_else(|| String::from("request counter should be set"))?;
    let registry = FakeRegistry { pages, requests };
    Ok(TagLister::new(Box::new(registry), PAGE_CEILING, 100))
}

fn block_on<F: Future>(future: F) -> StepResult<F::Output> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|error| format!("failed to create tokio runtime: {error}"))?;
    Ok(runtime.block_on(future))
}

#[given("a registry page listing {tags}")]
fn registry_page(tags_state: &TagsState, tags: String) -> StepResult<()> {
    let mut pages = tags_state
        .pages
        .get()
        .ok_or_else(|| String::from("pages should be set"))?;
    pages.push(tags.split(", ").map(String::from).collect());
    tags_state.pages.set(pages);
    Ok(())
}

#[when("release tags are listed")]
fn release_tags_are_listed(tags_state: &TagsState) -> StepResult<()> {
    let tag_lister = lister(tags_state)?;
    let tags = block_on(tag_lister.list_tags())?.map_err(|error| error.to_string())?;
    tags_state.tags.set(tags);
    Ok(())
}

#[when("tags are requested twice {hours} hours apart")]
fn tags_requested_twice(tags_state: &TagsState, hours: i64) -> StepResult<()> {
    let tag_lister = lister(tags_state)?;
    let start = Utc
        .with_ymd_and_hms(2026, 10, 1, 12, 0, 0)
        .single()
        .ok_or_else(|| String::from("start instant should be valid"))?;
    let clock = ManualClock(Arc::new(Mutex::new(start)));
    let mut cache = TagCache::new(clock.clone(), TimeDelta::hours(24));

    let tags = block_on(async {
        cache.get_or_fetch(&tag_lister).await?;
        clock.advance(TimeDelta::hours(hours));
        cache.get_or_fetch(&tag_lister).await
    })?
    .map_err(|error| error.to_string())?;
    tags_state.tags.set(tags);
    Ok(())
}
