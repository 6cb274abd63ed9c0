//! Scripted in-memory timeline source for tests
//!
//! `MockTimeline` serves fixed pages per user, can inject failures for a
//! given page a given number of times, and records every request so tests
//! can assert how many pages were actually fetched. Clones share the same
//! request log and failure script.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, PlatformResult};
use crate::platforms::TimelineSource;
use crate::types::{Page, RawPost, UserIdentifier};

#[derive(Debug, Default)]
struct MockState {
    /// Every `fetch_page` call as (user id, cursor)
    fetch_log: Vec<(u64, Option<String>)>,
    /// Every handle lookup
    resolve_log: Vec<String>,
    page_failures: HashMap<(u64, usize), VecDeque<PlatformError>>,
    resolve_failures: HashMap<String, VecDeque<PlatformError>>,
}

#[derive(Debug, Clone)]
pub struct MockTimeline {
    name: String,
    handles: HashMap<String, u64>,
    timelines: HashMap<u64, Vec<Vec<RawPost>>>,
    delay: Duration,
    state: Arc<Mutex<MockState>>,
}

impl MockTimeline {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            handles: HashMap::new(),
            timelines: HashMap::new(),
            delay: Duration::ZERO,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Register a user whose timeline is `posts` (newest first) split into pages of `page_size`.
    pub fn with_user(self, handle: &str, id: u64, posts: Vec<RawPost>, page_size: usize) -> Self {
        let pages = posts
            .chunks(page_size.max(1))
            .map(<[RawPost]>::to_vec)
            .collect();
        self.with_pages(handle, id, pages)
    }

    /// Register a user with explicit page contents, e.g. to repeat a post across pages.
    pub fn with_pages(mut self, handle: &str, id: u64, pages: Vec<Vec<RawPost>>) -> Self {
        self.handles.insert(handle.to_lowercase(), id);
        self.timelines.insert(id, pages);
        self
    }

    /// Fail requests for page `index` (0 is the newest) of `user_id` with `error`, `times` times.
    pub fn fail_page(self, user_id: u64, index: usize, error: PlatformError, times: usize) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let queue = state.page_failures.entry((user_id, index)).or_default();
            queue.extend(std::iter::repeat(error).take(times));
        }
        self
    }

    /// Fail lookups of `handle` with `error`, `times` times.
    pub fn fail_resolve(self, handle: &str, error: PlatformError, times: usize) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let queue = state
                .resolve_failures
                .entry(handle.to_lowercase())
                .or_default();
            queue.extend(std::iter::repeat(error).take(times));
        }
        self
    }

    /// Simulate network latency on every request
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Total `fetch_page` calls, failed ones included
    pub fn fetch_count(&self) -> usize {
        self.state.lock().unwrap().fetch_log.len()
    }

    /// `fetch_page` calls made for one user
    pub fn fetch_count_for(&self, user_id: u64) -> usize {
        self.state
            .lock()
            .unwrap()
            .fetch_log
            .iter()
            .filter(|(id, _)| *id == user_id)
            .count()
    }

    pub fn fetch_log(&self) -> Vec<(u64, Option<String>)> {
        self.state.lock().unwrap().fetch_log.clone()
    }

    /// Number of handle lookups performed
    pub fn resolve_count(&self) -> usize {
        self.state.lock().unwrap().resolve_log.len()
    }

    fn cursor_for(index: usize) -> String {
        format!("cursor-{}", index)
    }

    fn page_index(cursor: Option<&str>) -> PlatformResult<usize> {
        match cursor {
            None => Ok(0),
            Some(c) => c
                .strip_prefix("cursor-")
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| PlatformError::Protocol(format!("unknown cursor '{}'", c))),
        }
    }
}

#[async_trait]
impl TimelineSource for MockTimeline {
    async fn resolve_user(&self, user: &UserIdentifier) -> PlatformResult<u64> {
        let handle = match user {
            UserIdentifier::Id(id) => return Ok(*id),
            UserIdentifier::Handle(handle) => handle.to_lowercase(),
        };

        let scripted = {
            let mut state = self.state.lock().unwrap();
            state.resolve_log.push(handle.clone());
            state
                .resolve_failures
                .get_mut(&handle)
                .and_then(VecDeque::pop_front)
        };

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        if let Some(error) = scripted {
            return Err(error);
        }

        self.handles
            .get(&handle)
            .copied()
            .ok_or_else(|| PlatformError::NotFound(format!("user @{} does not exist", handle)))
    }

    async fn fetch_page(&self, user_id: u64, cursor: Option<&str>) -> PlatformResult<Page> {
        let index = Self::page_index(cursor);
        let scripted = {
            let mut state = self.state.lock().unwrap();
            state.fetch_log.push((user_id, cursor.map(str::to_string)));
            match &index {
                Ok(i) => state
                    .page_failures
                    .get_mut(&(user_id, *i))
                    .and_then(VecDeque::pop_front),
                Err(_) => None,
            }
        };

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        if let Some(error) = scripted {
            return Err(error);
        }
        let index = index?;

        let pages = self
            .timelines
            .get(&user_id)
            .ok_or_else(|| PlatformError::NotFound(format!("user id {} does not exist", user_id)))?;

        if pages.is_empty() && index == 0 {
            return Ok(Page::default());
        }
        let posts = pages
            .get(index)
            .cloned()
            .ok_or_else(|| PlatformError::Protocol(format!("cursor past end: page {}", index)))?;
        let next_cursor = (index + 1 < pages.len()).then(|| Self::cursor_for(index + 1));

        Ok(Page { posts, next_cursor })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
