//! Timesift - time-filtered timeline scraping
//!
//! This library walks a user's reverse-chronological timeline page by page,
//! keeps the posts inside a time window and stops as soon as it pages past
//! the window's start.

pub mod config;
pub mod credentials;
pub mod error;
pub mod export;
pub mod logging;
pub mod normalize;
pub mod pager;
pub mod platforms;
pub mod retry;
pub mod scraper;
pub mod session;
pub mod types;
pub mod walker;

// Re-export commonly used types
pub use config::Config;
pub use credentials::CredentialSet;
pub use error::{PlatformError, Result, TimesiftError};
pub use retry::RetryPolicy;
pub use scraper::{BatchReport, Scraper, UserReport};
pub use session::Session;
pub use types::{PostRecord, ScrapeRequest, TimeWindow, UserIdentifier};
pub use walker::{StopReason, WalkOutcome};
