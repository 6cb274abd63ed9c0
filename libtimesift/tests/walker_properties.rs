//! Behavioural properties of the time-filtered walk over scripted timelines

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::time::Duration;

use libtimesift::error::PlatformError;
use libtimesift::pager::Pager;
use libtimesift::platforms::mock::MockTimeline;
use libtimesift::retry::{Backoff, RecordingSleeper, RetryPolicy};
use libtimesift::scraper::Scraper;
use libtimesift::types::{RawPost, ScrapeRequest, TimeWindow, UserIdentifier};
use libtimesift::walker::{walk, StopReason, WalkOutcome};

const USER_ID: u64 = 42;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// `count` posts one hour apart, newest first; post `i` is `i` hours after base.
fn hourly_posts(count: i64) -> Vec<RawPost> {
    (0..count)
        .rev()
        .map(|i| RawPost {
            id: format!("{}", 1000 + i),
            text: format!("post at hour {}", i),
            created_at: base() + ChronoDuration::hours(i),
        })
        .collect()
}

fn daily_post(day: u32) -> RawPost {
    RawPost {
        id: format!("2024-01-{:02}", day),
        text: format!("January {}", day),
        created_at: Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap(),
    }
}

async fn run_walk(mock: &MockTimeline, policy: RetryPolicy, request: ScrapeRequest) -> WalkOutcome {
    let sleeper = RecordingSleeper::new();
    let pager = Pager::new(mock, &sleeper, policy, USER_ID);
    walk(pager, &request, None).await
}

fn retry_policy(retries: u32) -> RetryPolicy {
    RetryPolicy::new(
        retries,
        Duration::from_millis(10),
        Backoff::Exponential {
            max: Duration::from_millis(40),
        },
    )
}

#[tokio::test]
async fn test_records_stay_inside_window_and_no_page_past_lower_edge_is_fetched() {
    let posts = hourly_posts(50);
    let page_size = 7;

    for (start_hour, end_hour) in [(0, 50), (10, 20), (3, 4), (33, 49), (45, 60), (20, 20)] {
        let mock = MockTimeline::new("mock").with_user("alice", USER_ID, posts.clone(), page_size);
        let start = base() + ChronoDuration::hours(start_hour);
        let end = base() + ChronoDuration::hours(end_hour);
        let window = TimeWindow::new(Some(start), Some(end)).unwrap();

        let outcome = run_walk(&mock, RetryPolicy::no_retry(), ScrapeRequest::new(window, None)).await;

        assert!(outcome.is_complete());
        assert!(outcome
            .records
            .iter()
            .all(|r| r.created_at >= start && r.created_at < end));
        let expected = (start_hour..end_hour.min(50)).count();
        assert_eq!(outcome.records.len(), expected, "window {}..{}", start_hour, end_hour);

        // Index (newest first) of the first post older than start decides the last page
        match posts.iter().position(|p| p.created_at < start) {
            Some(first_too_old) => {
                assert_eq!(outcome.stop, StopReason::Window);
                assert_eq!(mock.fetch_count(), first_too_old / page_size + 1);
            }
            None => {
                assert_eq!(outcome.stop, StopReason::Exhausted);
                assert_eq!(mock.fetch_count(), posts.len().div_ceil(page_size));
            }
        }
    }
}

#[tokio::test]
async fn test_cap_bounds_result_length() {
    let posts = hourly_posts(23);

    for cap in [0usize, 1, 5, 22, 23, 24, 100] {
        let mock = MockTimeline::new("mock").with_user("alice", USER_ID, posts.clone(), 4);
        let outcome = run_walk(
            &mock,
            RetryPolicy::no_retry(),
            ScrapeRequest::new(TimeWindow::unbounded(), Some(cap)),
        )
        .await;

        assert_eq!(outcome.records.len(), cap.min(posts.len()), "cap {}", cap);
        let expected_ids: Vec<&str> = posts.iter().take(cap).map(|p| p.id.as_str()).collect();
        let ids: Vec<&str> = outcome.records.iter().map(|r| r.post_id.as_str()).collect();
        assert_eq!(ids, expected_ids);

        if cap <= posts.len() {
            assert_eq!(outcome.stop, StopReason::Cap);
        } else {
            assert_eq!(outcome.stop, StopReason::Exhausted);
        }
    }
}

#[tokio::test]
async fn test_rerun_is_identical() {
    let mock = MockTimeline::new("mock").with_user("alice", USER_ID, hourly_posts(30), 6);
    let window = TimeWindow::new(
        Some(base() + ChronoDuration::hours(5)),
        Some(base() + ChronoDuration::hours(25)),
    )
    .unwrap();
    let request = ScrapeRequest::new(window, Some(12));

    let first = run_walk(&mock, RetryPolicy::no_retry(), request).await;
    let second = run_walk(&mock, RetryPolicy::no_retry(), request).await;

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_overlapping_pages_are_deduplicated_first_seen_wins() {
    let overlap_first = RawPost {
        id: "dup".to_string(),
        text: "first copy".to_string(),
        created_at: base() + ChronoDuration::hours(5),
    };
    let overlap_second = RawPost {
        text: "second copy".to_string(),
        ..overlap_first.clone()
    };
    let newer = RawPost {
        id: "newer".to_string(),
        text: "newer".to_string(),
        created_at: base() + ChronoDuration::hours(6),
    };
    let older = RawPost {
        id: "older".to_string(),
        text: "older".to_string(),
        created_at: base() + ChronoDuration::hours(4),
    };
    let mock = MockTimeline::new("mock").with_pages(
        "alice",
        USER_ID,
        vec![vec![newer, overlap_first], vec![overlap_second, older]],
    );

    let outcome = run_walk(&mock, RetryPolicy::no_retry(), ScrapeRequest::default()).await;

    let ids: Vec<&str> = outcome.records.iter().map(|r| r.post_id.as_str()).collect();
    assert_eq!(ids, vec!["newer", "dup", "older"]);
    assert_eq!(outcome.records[1].text, "first copy");
}

#[tokio::test]
async fn test_transient_failures_within_retry_budget_cost_k_plus_one_fetches() {
    let k = 3;
    let mock = MockTimeline::new("mock")
        .with_user("alice", USER_ID, hourly_posts(4), 2)
        .fail_page(USER_ID, 1, PlatformError::RateLimit("HTTP 429".into()), k);

    let outcome = run_walk(&mock, retry_policy(k as u32), ScrapeRequest::default()).await;

    assert_eq!(outcome.stop, StopReason::Exhausted);
    assert_eq!(outcome.records.len(), 4);
    let page_two_attempts = mock
        .fetch_log()
        .iter()
        .filter(|(_, cursor)| cursor.as_deref() == Some("cursor-1"))
        .count();
    assert_eq!(page_two_attempts, k + 1);
}

#[tokio::test]
async fn test_too_few_retries_surface_exhaustion_with_earlier_results() {
    let k = 3;
    let mock = MockTimeline::new("mock")
        .with_user("alice", USER_ID, hourly_posts(4), 2)
        .fail_page(USER_ID, 1, PlatformError::Network("connection reset".into()), k);

    let outcome = run_walk(&mock, retry_policy(k as u32 - 1), ScrapeRequest::default()).await;

    match outcome.error() {
        Some(PlatformError::RetriesExhausted { attempts, last }) => {
            assert_eq!(*attempts, k as u32);
            assert_eq!(**last, PlatformError::Network("connection reset".into()));
        }
        other => panic!("Expected RetriesExhausted, got {:?}", other),
    }
    let ids: Vec<&str> = outcome.records.iter().map(|r| r.post_id.as_str()).collect();
    assert_eq!(ids, vec!["1003", "1002"]);
}

#[tokio::test]
async fn test_five_days_window_keeps_second_and_third() {
    let mock = MockTimeline::new("mock").with_user(
        "alice",
        USER_ID,
        (1..=5).rev().map(daily_post).collect(),
        2,
    );
    let window = TimeWindow::parse(Some("2024-01-02"), Some("2024-01-04")).unwrap();

    let outcome = run_walk(&mock, RetryPolicy::no_retry(), ScrapeRequest::new(window, None)).await;

    let ids: Vec<&str> = outcome.records.iter().map(|r| r.post_id.as_str()).collect();
    assert_eq!(ids, vec!["2024-01-03", "2024-01-02"]);
    assert_eq!(outcome.stop, StopReason::Window);
}

#[tokio::test]
async fn test_cap_of_three_takes_most_recent() {
    let mock = MockTimeline::new("mock").with_user("alice", USER_ID, hourly_posts(10), 4);
    let scraper = Scraper::new(Box::new(mock.clone()), RetryPolicy::no_retry())
        .with_sleeper(Box::new(RecordingSleeper::new()));

    let report = scraper
        .scrape(
            &UserIdentifier::Handle("alice".to_string()),
            &ScrapeRequest::new(TimeWindow::unbounded(), Some(3)),
        )
        .await;

    let ids: Vec<&str> = report.records().iter().map(|r| r.post_id.as_str()).collect();
    assert_eq!(ids, vec!["1009", "1008", "1007"]);
    assert_eq!(report.outcome.stop, StopReason::Cap);
    assert_eq!(mock.fetch_count(), 1);
}
