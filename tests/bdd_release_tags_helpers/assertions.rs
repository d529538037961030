//! Assertion helpers for release tag behavioural tests.

use std::sync::atomic::Ordering;

use rstest_bdd_macros::then;

use super::StepResult;
use super::state::TagsState;

#[then("the tags are {expected}")]
fn tags_are(tags_state: &TagsState, expected: String) -> StepResult<()> {
    let tags = tags_state
        .tags
        .get()
        .ok_or_else(|| String::from("tags should be listed"))?;
    let wanted: Vec<&str> = expected.split(", ").collect();

    if tags == wanted {
        Ok(())
    } else {
        Err(format!("expected {wanted:?}, got {tags:?}"))
    }
}

#[then("the registry was asked for {count} pages")]
fn registry_was_asked(tags_state: &TagsState, count: u32) -> StepResult<()> {
    let requests = tags_state
        .requests
        .get()
        .ok_or_else(|| String::from("request counter should be set"))?;
    let seen = requests.load(Ordering::SeqCst);

    if seen == count {
        Ok(())
    } else {
        Err(format!("expected {count} page requests, got {seen}"))
    }
}
