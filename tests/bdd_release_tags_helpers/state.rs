//! Scenario state for release tag behavioural tests.

use std::sync::Arc;
use std::sync::atomic::AtomicU32;

use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;

#[derive(Default, ScenarioState)]
pub(crate) struct TagsState {
    /// Pages the fake registry serves, in order.
    pub(crate) pages: Slot<Vec<Vec<String>>>,
    /// Page requests seen by the fake registry.
    pub(crate) requests: Slot<Arc<AtomicU32>>,
    /// Tags returned by the last listing.
    pub(crate) tags: Slot<Vec<String>>,
}

#[fixture]
pub(crate) fn tags_state() -> TagsState {
    let state = TagsState::default();
    state.pages.set(Vec::new());
    state.requests.set(Arc::new(AtomicU32::new(0)));
    state
}
