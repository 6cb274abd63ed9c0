//! Lazy cursor-driven sequence of timeline pages
//!
//! A [`Pager`] fetches nothing until asked. Each call to
//! [`Pager::next_page`] performs one fetch (with retries) and advances the
//! cursor, so a consumer can stop after any page without paying for the
//! rest. A pager can be started from a saved cursor with [`Pager::resume`].
//!
//! The sequence ends when the source hands out no cursor, or a cursor this
//! pager has already followed. A page without posts is not the end on its
//! own: every entry on it may have been withdrawn.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::{PlatformError, PlatformResult};
use crate::platforms::TimelineSource;
use crate::retry::{with_retry, RetryPolicy, Sleeper};
use crate::types::Page;

pub struct Pager<'a> {
    source: &'a dyn TimelineSource,
    sleeper: &'a dyn Sleeper,
    policy: RetryPolicy,
    user_id: u64,
    cursor: Option<String>,
    seen_cursors: HashSet<String>,
    exhausted: bool,
    pages_fetched: usize,
}

impl<'a> Pager<'a> {
    /// Start at the newest page of `user_id`'s timeline.
    pub fn new(
        source: &'a dyn TimelineSource,
        sleeper: &'a dyn Sleeper,
        policy: RetryPolicy,
        user_id: u64,
    ) -> Self {
        Self {
            source,
            sleeper,
            policy,
            user_id,
            cursor: None,
            seen_cursors: HashSet::new(),
            exhausted: false,
            pages_fetched: 0,
        }
    }

    /// Continue from a cursor handed out by an earlier pager.
    pub fn resume(mut self, cursor: impl Into<String>) -> Self {
        let cursor = cursor.into();
        self.seen_cursors.insert(cursor.clone());
        self.cursor = Some(cursor);
        self.exhausted = false;
        self
    }

    /// Cursor of the page the next call will fetch (`None` = newest page)
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Pages successfully fetched so far
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    /// Fetch the next page, or `Ok(None)` once the timeline has ended.
    ///
    /// Transient failures are retried according to the policy. On error the
    /// cursor is left in place, so calling again retries the same page.
    pub async fn next_page(&mut self) -> PlatformResult<Option<Page>> {
        if self.exhausted {
            return Ok(None);
        }

        let source = self.source;
        let user_id = self.user_id;
        let cursor = self.cursor.clone();
        let context = format!(
            "{} page {} of user {}",
            source.name(),
            self.pages_fetched + 1,
            user_id
        );

        let page = with_retry(
            &self.policy,
            self.sleeper,
            PlatformError::is_transient,
            &context,
            || source.fetch_page(user_id, cursor.as_deref()),
        )
        .await?;

        self.pages_fetched += 1;
        debug!(
            "Fetched {} with {} posts (next cursor: {})",
            context,
            page.posts.len(),
            page.next_cursor.is_some()
        );
        self.advance(&page);

        Ok(Some(page))
    }

    fn advance(&mut self, page: &Page) {
        match &page.next_cursor {
            None => self.exhausted = true,
            Some(next) if !self.seen_cursors.insert(next.clone()) => {
                warn!(
                    "Cursor repeated for user {}; stopping to avoid a paging loop",
                    self.user_id
                );
                self.exhausted = true;
            }
            Some(next) => self.cursor = Some(next.clone()),
        }
    }
}
