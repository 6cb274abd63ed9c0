//! Core types for Timesift

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Serialize, Serializer};

use crate::error::{Result, TimesiftError};

/// The user whose timeline is scraped, as the caller named them
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UserIdentifier {
    /// Screen name without the leading `@`
    Handle(String),
    /// Numeric platform id, used as-is
    Id(u64),
}

impl FromStr for UserIdentifier {
    type Err = TimesiftError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse()
                .map(UserIdentifier::Id)
                .map_err(|_| TimesiftError::InvalidInput(format!("User id out of range: {}", s)));
        }

        let handle = s.strip_prefix('@').unwrap_or(s);
        if handle.is_empty() || !handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(TimesiftError::InvalidInput(format!(
                "Invalid user identifier '{}'. Use a handle (letters, digits, _) or a numeric id",
                s
            )));
        }
        Ok(UserIdentifier::Handle(handle.to_string()))
    }
}

impl From<u64> for UserIdentifier {
    fn from(id: u64) -> Self {
        UserIdentifier::Id(id)
    }
}

impl fmt::Display for UserIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserIdentifier::Handle(handle) => write!(f, "{}", handle),
            UserIdentifier::Id(id) => write!(f, "{}", id),
        }
    }
}

/// Where an instant falls relative to a [`TimeWindow`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPosition {
    /// At or after the exclusive end
    TooNew,
    Inside,
    /// Before the inclusive start
    TooOld,
}

/// Half-open `[start, end)` range of UTC instants; a missing bound is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(TimesiftError::InvalidInput(format!(
                    "Start time {} is after end time {}",
                    s.to_rfc3339(),
                    e.to_rfc3339()
                )));
            }
        }
        Ok(Self { start, end })
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Inclusive day range: `start 00:00Z` up to `end + 1 day 00:00Z` (exclusive).
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        let day_after = end.checked_add_days(Days::new(1)).ok_or_else(|| {
            TimesiftError::InvalidInput(format!("End date {} is out of range", end))
        })?;
        Self::new(Some(midnight_utc(start)), Some(midnight_utc(day_after)))
    }

    /// Build a window from optional ISO-8601 strings.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        let start = start.map(parse_instant).transpose()?;
        let end = end.map(parse_instant).transpose()?;
        Self::new(start, end)
    }

    /// Build an inclusive day range from two `YYYY-MM-DD` strings.
    pub fn parse_dates(start: &str, end: &str) -> Result<Self> {
        Self::from_dates(parse_date(start)?, parse_date(end)?)
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn position(&self, instant: DateTime<Utc>) -> WindowPosition {
        if self.end.is_some_and(|end| instant >= end) {
            WindowPosition::TooNew
        } else if self.start.is_some_and(|start| instant < start) {
            WindowPosition::TooOld
        } else {
            WindowPosition::Inside
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.position(instant) == WindowPosition::Inside
    }
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Parse an instant given as RFC 3339 / ISO-8601 (`2024-01-02T00:00:00Z`) or a bare date.
pub fn parse_instant(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(midnight_utc(date));
    }
    Err(TimesiftError::InvalidInput(format!(
        "Invalid time '{}'. Use ISO 8601 (YYYY-MM-DDTHH:MM:SSZ) or YYYY-MM-DD",
        s
    )))
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
        TimesiftError::InvalidInput(format!("Invalid date '{}'. Use YYYY-MM-DD", s))
    })
}

/// A post as the timeline source delivers it, before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPost {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// One page of a reverse-chronological timeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub posts: Vec<RawPost>,
    /// `None` when no further pages exist
    pub next_cursor: Option<String>,
}

impl Page {
    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }
}

/// Canonical output record for one post
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostRecord {
    #[serde(rename = "tweet_id")]
    pub post_id: String,
    pub text: String,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    /// ISO-8601 timestamp, e.g. `2024-01-02T10:30:00+00:00`
    pub date: String,
    /// Display time, e.g. `2024-01-02 10:30:00 UTC`
    pub time: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_user"
    )]
    pub user_identifier: Option<UserIdentifier>,
}

fn serialize_user<S: Serializer>(
    user: &Option<UserIdentifier>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match user {
        Some(user) => serializer.collect_str(user),
        None => serializer.serialize_none(),
    }
}

/// What to collect from one user's timeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeRequest {
    pub window: TimeWindow,
    /// `None` means no cap; `Some(0)` stops before the first fetch
    pub max_posts: Option<usize>,
}

impl ScrapeRequest {
    pub fn new(window: TimeWindow, max_posts: Option<usize>) -> Self {
        Self { window, max_posts }
    }
}
