//! Single- and multi-user scrape orchestration
//!
//! [`Scraper`] resolves each user, walks their timeline and collects the
//! outcome. Multi-user scrapes run one walk after another with a pause
//! between users; a user that fails is reported and the batch moves on.

use std::time::Duration;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::config::ScrapeConfig;
use crate::error::{PlatformError, Result};
use crate::pager::Pager;
use crate::platforms::TimelineSource;
use crate::retry::{with_retry, RetryPolicy, Sleeper, TokioSleeper};
use crate::types::{PostRecord, ScrapeRequest, TimeWindow, UserIdentifier};
use crate::walker::{walk, WalkOutcome};

/// Result of scraping one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserReport {
    /// The user as the caller named them
    pub user: UserIdentifier,
    /// Numeric id, `None` when the lookup failed
    pub user_id: Option<u64>,
    pub outcome: WalkOutcome,
}

impl UserReport {
    pub fn records(&self) -> &[PostRecord] {
        &self.outcome.records
    }

    pub fn error(&self) -> Option<&PlatformError> {
        self.outcome.error()
    }
}

/// Per-user results of a multi-user scrape, in request order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub reports: Vec<UserReport>,
}

impl BatchReport {
    /// All collected records, grouped by user in request order
    pub fn records(&self) -> impl Iterator<Item = &PostRecord> {
        self.reports.iter().flat_map(|r| r.outcome.records.iter())
    }

    pub fn into_records(self) -> Vec<PostRecord> {
        self.reports
            .into_iter()
            .flat_map(|r| r.outcome.records)
            .collect()
    }

    pub fn total_records(&self) -> usize {
        self.reports.iter().map(|r| r.outcome.records.len()).sum()
    }

    /// Users whose walk ended in an error
    pub fn failed(&self) -> impl Iterator<Item = &UserReport> {
        self.reports.iter().filter(|r| r.error().is_some())
    }

    pub fn is_complete(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// Scrapes timelines from a single [`TimelineSource`]
pub struct Scraper {
    source: Box<dyn TimelineSource>,
    policy: RetryPolicy,
    user_delay: Duration,
    sleeper: Box<dyn Sleeper>,
}

impl Scraper {
    /// Create a scraper with no pause between users.
    pub fn new(source: Box<dyn TimelineSource>, policy: RetryPolicy) -> Self {
        Self {
            source,
            policy,
            user_delay: Duration::ZERO,
            sleeper: Box::new(TokioSleeper),
        }
    }

    /// Create a scraper using the retry policy and user delay from `config`.
    pub fn from_config(source: Box<dyn TimelineSource>, config: &ScrapeConfig) -> Self {
        Self::new(source, config.retry_policy()).with_user_delay(config.user_delay())
    }

    pub fn with_user_delay(mut self, delay: Duration) -> Self {
        self.user_delay = delay;
        self
    }

    /// Replace the timer used for retry and between-user pauses.
    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Scrape one user's timeline.
    ///
    /// Never fails outright: errors are reported in the outcome next to
    /// whatever was collected before them.
    pub async fn scrape(&self, user: &UserIdentifier, request: &ScrapeRequest) -> UserReport {
        self.scrape_tagged(user, request, None).await
    }

    /// Scrape one user's posts from `start` through `end`, both inclusive days in UTC.
    pub async fn scrape_in_date_range(
        &self,
        user: &UserIdentifier,
        start: NaiveDate,
        end: NaiveDate,
        max_posts: Option<usize>,
    ) -> Result<UserReport> {
        let request = ScrapeRequest::new(TimeWindow::from_dates(start, end)?, max_posts);
        Ok(self.scrape(user, &request).await)
    }

    /// Scrape several users one after another.
    ///
    /// Records are tagged with the user they came from. The configured user
    /// delay is applied between users, never after the last one. A failing
    /// user does not stop the batch.
    pub async fn scrape_many(
        &self,
        users: &[UserIdentifier],
        request: &ScrapeRequest,
    ) -> BatchReport {
        let mut reports = Vec::with_capacity(users.len());

        for (index, user) in users.iter().enumerate() {
            info!("Scraping user {} ({}/{})", user, index + 1, users.len());
            let report = self.scrape_tagged(user, request, Some(user)).await;

            match report.error() {
                Some(e) => warn!(
                    "User {} failed after {} posts: {}",
                    user,
                    report.records().len(),
                    e
                ),
                None => info!("User {}: {} posts", user, report.records().len()),
            }
            reports.push(report);

            if index + 1 < users.len() && !self.user_delay.is_zero() {
                info!("Waiting {:?} before next user", self.user_delay);
                self.sleeper.sleep(self.user_delay).await;
            }
        }

        let batch = BatchReport { reports };
        info!(
            "Collected {} posts from {} users ({} failed)",
            batch.total_records(),
            users.len(),
            batch.failed().count()
        );
        batch
    }

    /// Multi-user variant of [`Scraper::scrape_in_date_range`].
    pub async fn scrape_many_in_date_range(
        &self,
        users: &[UserIdentifier],
        start: NaiveDate,
        end: NaiveDate,
        max_posts: Option<usize>,
    ) -> Result<BatchReport> {
        let request = ScrapeRequest::new(TimeWindow::from_dates(start, end)?, max_posts);
        Ok(self.scrape_many(users, &request).await)
    }

    async fn scrape_tagged(
        &self,
        user: &UserIdentifier,
        request: &ScrapeRequest,
        tag: Option<&UserIdentifier>,
    ) -> UserReport {
        let user_id = match self.resolve(user).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Could not resolve user {}: {}", user, e);
                return UserReport {
                    user: user.clone(),
                    user_id: None,
                    outcome: WalkOutcome::failed(e),
                };
            }
        };

        let pager = Pager::new(
            self.source.as_ref(),
            self.sleeper.as_ref(),
            self.policy,
            user_id,
        );
        let outcome = walk(pager, request, tag).await;

        UserReport {
            user: user.clone(),
            user_id: Some(user_id),
            outcome,
        }
    }

    async fn resolve(&self, user: &UserIdentifier) -> std::result::Result<u64, PlatformError> {
        let source = self.source.as_ref();
        let context = format!("{} lookup of {}", source.name(), user);
        with_retry(
            &self.policy,
            self.sleeper.as_ref(),
            PlatformError::is_transient,
            &context,
            || source.resolve_user(user),
        )
        .await
    }
}
