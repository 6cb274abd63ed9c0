//! Timeline sources
//!
//! A [`TimelineSource`] turns protocol traffic into [`Page`]s. It does not
//! filter or interpret posts; windowing, caps and deduplication belong to
//! the [walker](crate::walker).
//!
//! # Examples
//!
//! ```no_run
//! use libtimesift::config::Config;
//! use libtimesift::credentials::CredentialSet;
//! use libtimesift::platforms::{x::XClient, TimelineSource};
//! use libtimesift::session::Session;
//! use libtimesift::types::UserIdentifier;
//!
//! # async fn example() -> libtimesift::error::Result<()> {
//! let config = Config::load_or_default()?;
//! let credentials = CredentialSet::load(&config.credentials_path())?;
//! let session = Session::open(credentials, &config)?;
//! let client = XClient::new(session);
//!
//! let user_id = client.resolve_user(&"rustlang".parse::<UserIdentifier>()?).await?;
//! let first_page = client.fetch_page(user_id, None).await?;
//! println!("{} posts, more: {}", first_page.posts.len(), !first_page.is_last());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::PlatformResult;
use crate::types::{Page, UserIdentifier};

pub mod x;

// Compiled into all builds so integration tests can script timelines
pub mod mock;

/// Page Fetcher contract for a user's reverse-chronological timeline
#[async_trait]
pub trait TimelineSource: Send + Sync {
    /// Map a handle to the platform's numeric id. Numeric identifiers must be
    /// returned unchanged without a network call.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown or suspended users; otherwise the same classes
    /// as [`TimelineSource::fetch_page`].
    async fn resolve_user(&self, user: &UserIdentifier) -> PlatformResult<u64>;

    /// Fetch one page. `cursor = None` requests the newest page.
    ///
    /// # Errors
    ///
    /// - `RateLimit` / `Network`: transient, safe to retry
    /// - `Authentication`: the session was rejected
    /// - `NotFound`: the user does not exist or is suspended
    /// - `Protocol`: the response could not be interpreted
    async fn fetch_page(&self, user_id: u64, cursor: Option<&str>) -> PlatformResult<Page>;

    /// Lowercase identifier used in logs
    fn name(&self) -> &str;
}
