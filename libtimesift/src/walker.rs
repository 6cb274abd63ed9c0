//! Time-filtered timeline walk
//!
//! The walker pulls pages from a [`Pager`] newest first and keeps the posts
//! that fall inside the requested [`TimeWindow`](crate::types::TimeWindow).
//! Timelines are strictly reverse-chronological, so the first post older
//! than the window's start ends the walk: nothing on later pages can
//! qualify and no further page is requested.
//!
//! A walk always returns what it collected. [`StopReason`] tells a
//! satisfied walk (window, cap, end of timeline) apart from one cut short
//! by an error.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::error::PlatformError;
use crate::normalize::normalize;
use crate::pager::Pager;
use crate::types::{PostRecord, ScrapeRequest, UserIdentifier, WindowPosition};

/// Posts between progress log lines
const PROGRESS_INTERVAL: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Paged past the window's start
    Window,
    /// Collected the requested number of posts
    Cap,
    /// The timeline has no more pages
    Exhausted,
    /// A fetch failed permanently or ran out of retries
    Error(PlatformError),
}

impl StopReason {
    pub fn is_error(&self) -> bool {
        matches!(self, StopReason::Error(_))
    }
}

/// Records collected by one walk and why it ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOutcome {
    /// Newest first, unique by post id
    pub records: Vec<PostRecord>,
    pub stop: StopReason,
    pub pages_fetched: usize,
}

impl WalkOutcome {
    /// An outcome for a walk that never started because of `error`.
    pub fn failed(error: PlatformError) -> Self {
        Self {
            records: Vec::new(),
            stop: StopReason::Error(error),
            pages_fetched: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.stop.is_error()
    }

    pub fn error(&self) -> Option<&PlatformError> {
        match &self.stop {
            StopReason::Error(e) => Some(e),
            _ => None,
        }
    }
}

/// Walk `pager` until the window, the cap, the timeline or an error ends it.
///
/// `tag` is copied into every record's `user_identifier`.
pub async fn walk(
    mut pager: Pager<'_>,
    request: &ScrapeRequest,
    tag: Option<&UserIdentifier>,
) -> WalkOutcome {
    let user_id = pager.user_id();
    let mut state = Walk {
        records: Vec::new(),
        seen: HashSet::new(),
        request,
        tag,
    };

    if request.max_posts == Some(0) {
        debug!("Cap of 0 for user {}, nothing to fetch", user_id);
        return state.finish(StopReason::Cap, &pager);
    }

    loop {
        let page = match pager.next_page().await {
            Ok(Some(page)) => page,
            Ok(None) => {
                info!(
                    "Reached end of timeline for user {} ({} posts)",
                    user_id,
                    state.records.len()
                );
                return state.finish(StopReason::Exhausted, &pager);
            }
            Err(e) => {
                warn!(
                    "Stopping walk of user {} after {} posts: {}",
                    user_id,
                    state.records.len(),
                    e
                );
                return state.finish(StopReason::Error(e), &pager);
            }
        };

        for post in page.posts {
            match request.window.position(post.created_at) {
                WindowPosition::TooNew => continue,
                WindowPosition::TooOld => {
                    info!(
                        "Passed window start for user {} at post {} ({} posts)",
                        user_id,
                        post.id,
                        state.records.len()
                    );
                    return state.finish(StopReason::Window, &pager);
                }
                WindowPosition::Inside => {
                    if !state.seen.insert(post.id.clone()) {
                        debug!("Skipping duplicate post {}", post.id);
                        continue;
                    }
                    state.records.push(normalize(post, state.tag));

                    let collected = state.records.len();
                    if collected % PROGRESS_INTERVAL == 0 {
                        info!("Collected {} posts from user {}", collected, user_id);
                    }
                    if request.max_posts.is_some_and(|cap| collected >= cap) {
                        info!("Reached cap of {} posts for user {}", collected, user_id);
                        return state.finish(StopReason::Cap, &pager);
                    }
                }
            }
        }
    }
}

/// Invocation-scoped walk state
struct Walk<'r> {
    records: Vec<PostRecord>,
    seen: HashSet<String>,
    request: &'r ScrapeRequest,
    tag: Option<&'r UserIdentifier>,
}

impl Walk<'_> {
    fn finish(self, stop: StopReason, pager: &Pager<'_>) -> WalkOutcome {
        debug_assert!(self
            .request
            .max_posts
            .map_or(true, |cap| self.records.len() <= cap));
        WalkOutcome {
            records: self.records,
            stop,
            pages_fetched: pager.pages_fetched(),
        }
    }
}
