//! Timeline source backed by the web client's GraphQL API

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::error::{PlatformError, PlatformResult};
use crate::platforms::TimelineSource;
use crate::session::Session;
use crate::types::{Page, RawPost, UserIdentifier};

const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Map an HTTP status to the error taxonomy.
///
/// Only the status code is consulted; bodies of error responses are kept
/// for the message but never interpreted.
fn map_status(status: StatusCode, context: &str, body: &str) -> PlatformError {
    let snippet: String = body.chars().take(200).collect();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlatformError::Authentication(format!(
            "{} rejected with HTTP {}. The session cookies are expired or invalid; export them again.",
            context, status
        )),
        StatusCode::NOT_FOUND => {
            PlatformError::NotFound(format!("{} returned HTTP 404", context))
        }
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimit(format!(
            "{} returned HTTP 429",
            context
        )),
        s if s.is_server_error() => {
            PlatformError::Network(format!("{} returned HTTP {}: {}", context, s, snippet))
        }
        s => PlatformError::Protocol(format!("{} returned HTTP {}: {}", context, s, snippet)),
    }
}

fn map_transport_error(error: reqwest::Error, context: &str) -> PlatformError {
    if error.is_decode() {
        PlatformError::Protocol(format!("{}: undecodable body: {}", context, error))
    } else if error.is_timeout() {
        PlatformError::Network(format!("{} timed out: {}", context, error))
    } else {
        PlatformError::Network(format!("{} failed: {}", context, error))
    }
}

fn features() -> Value {
    json!({
        "rweb_tipjar_consumption_enabled": true,
        "responsive_web_graphql_exclude_directive_enabled": true,
        "verified_phone_label_enabled": false,
        "creator_subscriptions_tweet_preview_api_enabled": true,
        "responsive_web_graphql_timeline_navigation_enabled": true,
        "responsive_web_graphql_skip_user_profile_image_extensions_enabled": false,
        "communities_web_enable_tweet_community_results_fetch": true,
        "c9s_tweet_anatomy_moderator_badge_enabled": true,
        "articles_preview_enabled": true,
        "tweetypie_unmention_optimization_enabled": true,
        "responsive_web_edit_tweet_api_enabled": true,
        "graphql_is_translatable_rweb_tweet_is_translatable_enabled": true,
        "view_counts_everywhere_api_enabled": true,
        "longform_notetweets_consumption_enabled": true,
        "responsive_web_twitter_article_tweet_consumption_enabled": true,
        "tweet_awards_web_tipping_enabled": false,
        "creator_subscriptions_quote_tweet_preview_enabled": false,
        "freedom_of_speech_not_reach_fetch_enabled": true,
        "standardized_nudges_misinfo": true,
        "tweet_with_visibility_results_prefer_gql_limited_actions_policy_enabled": true,
        "rweb_video_timestamps_enabled": true,
        "longform_notetweets_rich_text_read_enabled": true,
        "longform_notetweets_inline_media_enabled": true,
        "hidden_profile_likes_enabled": true,
        "highlights_tweets_tab_ui_enabled": true,
        "subscriptions_verification_info_verified_since_enabled": true,
        "subscriptions_verification_info_is_identity_verified_enabled": false,
        "responsive_web_enhance_cards_enabled": false
    })
}

pub struct XClient {
    session: Session,
}

impl XClient {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    async fn graphql(&self, query_id: &str, operation: &str, variables: Value) -> PlatformResult<Value> {
        let api = self.session.api();
        let url = format!(
            "{}/i/api/graphql/{}/{}",
            api.base_url.trim_end_matches('/'),
            query_id,
            operation
        );

        let response = self
            .session
            .client()
            .get(&url)
            .query(&[
                ("variables", variables.to_string()),
                ("features", features().to_string()),
            ])
            .send()
            .await
            .map_err(|e| map_transport_error(e, operation))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| map_transport_error(e, operation))?;

        if !status.is_success() {
            return Err(map_status(status, operation, &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| PlatformError::Protocol(format!("{}: invalid JSON: {}", operation, e)))
    }
}

#[async_trait]
impl TimelineSource for XClient {
    async fn resolve_user(&self, user: &UserIdentifier) -> PlatformResult<u64> {
        let handle = match user {
            UserIdentifier::Id(id) => return Ok(*id),
            UserIdentifier::Handle(handle) => handle,
        };

        tracing::debug!("Looking up user @{}", handle);
        let variables = json!({
            "screen_name": handle,
            "withSafetyModeUserFields": true,
        });
        let body = self
            .graphql(
                &self.session.api().user_by_screen_name_query_id,
                "UserByScreenName",
                variables,
            )
            .await?;

        let id = parse_user_id(&body, handle)?;
        tracing::debug!("Resolved @{} to {}", handle, id);
        Ok(id)
    }

    async fn fetch_page(&self, user_id: u64, cursor: Option<&str>) -> PlatformResult<Page> {
        let mut variables = json!({
            "userId": user_id.to_string(),
            "count": self.session.api().page_size,
            "includePromotedContent": false,
            "withQuickPromoteEligibilityTweetFields": false,
            "withVoice": true,
            "withV2Timeline": true,
        });
        if let Some(cursor) = cursor {
            variables["cursor"] = Value::String(cursor.to_string());
        }

        let body = self
            .graphql(
                &self.session.api().user_tweets_query_id,
                "UserTweets",
                variables,
            )
            .await?;
        parse_timeline(&body, user_id)
    }

    fn name(&self) -> &str {
        "x"
    }
}

fn parse_user_id(body: &Value, handle: &str) -> PlatformResult<u64> {
    let result = &body["data"]["user"]["result"];
    if result.is_null() || result["__typename"] == "UserUnavailable" {
        return Err(PlatformError::NotFound(format!(
            "user @{} does not exist or is suspended",
            handle
        )));
    }

    result["rest_id"]
        .as_str()
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| {
            PlatformError::Protocol(format!("no numeric rest_id in lookup of @{}", handle))
        })
}

/// Turn a `UserTweets` response into a page of posts, newest first.
pub(crate) fn parse_timeline(body: &Value, user_id: u64) -> PlatformResult<Page> {
    let result = &body["data"]["user"]["result"];
    if result.is_null() || result["__typename"] == "UserUnavailable" {
        return Err(PlatformError::NotFound(format!(
            "user id {} does not exist or is suspended",
            user_id
        )));
    }

    let timeline = if result["timeline_v2"].is_object() {
        &result["timeline_v2"]
    } else {
        &result["timeline"]
    };
    let instructions = timeline["timeline"]["instructions"]
        .as_array()
        .ok_or_else(|| PlatformError::Protocol("timeline has no instructions".to_string()))?;

    let mut entries = PageEntries::default();

    for instruction in instructions {
        match instruction["type"].as_str() {
            // A pinned post can be arbitrarily old and would break ordering
            Some("TimelinePinEntry") => continue,
            Some("TimelineAddEntries") => {
                for entry in instruction["entries"].as_array().into_iter().flatten() {
                    entries.collect(entry)?;
                }
            }
            Some("TimelineReplaceEntry") => entries.collect(&instruction["entry"])?,
            _ => {}
        }
    }

    Ok(entries.into_page())
}

/// Raw material of one page before it is ordered.
#[derive(Default)]
struct PageEntries {
    posts: Vec<RawPost>,
    thread_posts: Vec<RawPost>,
    /// `tweet-` and `profile-conversation-` entries seen, tombstones included
    post_entries: usize,
    next_cursor: Option<String>,
}

impl PageEntries {
    fn collect(&mut self, entry: &Value) -> PlatformResult<()> {
        let entry_id = entry["entryId"].as_str().unwrap_or_default();
        let content = &entry["content"];

        if entry_id.starts_with("tweet-") {
            self.post_entries += 1;
            if let Some(post) =
                parse_tweet(&content["itemContent"]["tweet_results"]["result"])?
            {
                self.posts.push(post);
            }
        } else if entry_id.starts_with("profile-conversation-") {
            self.post_entries += 1;
            for item in content["items"].as_array().into_iter().flatten() {
                let result = &item["item"]["itemContent"]["tweet_results"]["result"];
                if let Some(post) = parse_tweet(result)? {
                    self.thread_posts.push(post);
                }
            }
        } else if entry_id.starts_with("cursor-bottom-") {
            self.next_cursor = content["value"].as_str().map(str::to_string);
        }
        Ok(())
    }

    fn into_page(self) -> Page {
        let PageEntries {
            mut posts,
            thread_posts,
            post_entries,
            mut next_cursor,
        } = self;

        // A reply to an old post drags the thread root onto this page. Thread
        // posts older than every top-level post belong to a later page.
        let floor = posts.iter().map(|p| p.created_at).min();
        posts.extend(
            thread_posts
                .into_iter()
                .filter(|p| floor.map_or(true, |floor| p.created_at >= floor)),
        );

        // Self-thread modules list their posts oldest first
        posts.sort_by(|a: &RawPost, b: &RawPost| b.created_at.cmp(&a.created_at));

        // The API keeps handing out bottom cursors past the end of a timeline.
        // A page of tombstones is not the end.
        if post_entries == 0 {
            next_cursor = None;
        }

        Page { posts, next_cursor }
    }
}

/// Returns `None` for tombstones and withheld posts.
fn parse_tweet(result: &Value) -> PlatformResult<Option<RawPost>> {
    let tweet = match result["__typename"].as_str() {
        Some("TweetWithVisibilityResults") => &result["tweet"],
        Some("TweetTombstone") | Some("TweetUnavailable") => return Ok(None),
        _ => result,
    };
    if tweet.is_null() {
        return Ok(None);
    }

    let legacy = &tweet["legacy"];
    let id = legacy["id_str"]
        .as_str()
        .or_else(|| tweet["rest_id"].as_str())
        .ok_or_else(|| PlatformError::Protocol("post without an id".to_string()))?;

    let created_at = legacy["created_at"]
        .as_str()
        .ok_or_else(|| PlatformError::Protocol(format!("post {} has no created_at", id)))?;
    let created_at = DateTime::parse_from_str(created_at, CREATED_AT_FORMAT)
        .map_err(|e| {
            PlatformError::Protocol(format!(
                "post {} has unparseable created_at '{}': {}",
                id, created_at, e
            ))
        })?
        .with_timezone(&Utc);

    let text = tweet["note_tweet"]["note_tweet_results"]["result"]["text"]
        .as_str()
        .or_else(|| legacy["full_text"].as_str())
        .unwrap_or_default();

    Ok(Some(RawPost {
        id: id.to_string(),
        text: text.to_string(),
        created_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tweet_result(id: &str, created_at: &str, text: &str) -> Value {
        json!({
            "__typename": "Tweet",
            "rest_id": id,
            "legacy": { "id_str": id, "created_at": created_at, "full_text": text }
        })
    }

    fn tweet_entry(id: &str, created_at: &str, text: &str) -> Value {
        json!({
            "entryId": format!("tweet-{}", id),
            "content": { "itemContent": { "tweet_results": { "result": tweet_result(id, created_at, text) } } }
        })
    }

    fn timeline(instructions: Value) -> Value {
        json!({
            "data": { "user": { "result": {
                "__typename": "User",
                "timeline_v2": { "timeline": { "instructions": instructions } }
            } } }
        })
    }

    #[test]
    fn test_parse_entries_and_cursor() {
        let body = timeline(json!([
            { "type": "TimelineClearCache" },
            { "type": "TimelinePinEntry", "entry": tweet_entry("1", "Mon Jan 01 00:00:00 +0000 2018", "pinned") },
            { "type": "TimelineAddEntries", "entries": [
                tweet_entry("30", "Wed Jan 03 12:00:00 +0000 2024", "newest"),
                tweet_entry("20", "Tue Jan 02 12:00:00 +0000 2024", "older"),
                { "entryId": "who-to-follow-123", "content": {} },
                { "entryId": "cursor-top-1", "content": { "value": "TOP" } },
                { "entryId": "cursor-bottom-1", "content": { "value": "BOTTOM" } }
            ]}
        ]));

        let page = parse_timeline(&body, 7).unwrap();
        let ids: Vec<&str> = page.posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["30", "20"]);
        assert_eq!(page.next_cursor.as_deref(), Some("BOTTOM"));
        assert_eq!(
            page.posts[0].created_at,
            Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_conversation_module_is_reordered_newest_first() {
        let body = timeline(json!([
            { "type": "TimelineAddEntries", "entries": [
                { "entryId": "profile-conversation-9", "content": { "items": [
                    { "item": { "itemContent": { "tweet_results": { "result":
                        tweet_result("40", "Thu Jan 04 08:00:00 +0000 2024", "thread root") } } } },
                    { "item": { "itemContent": { "tweet_results": { "result":
                        tweet_result("41", "Thu Jan 04 09:00:00 +0000 2024", "thread reply") } } } }
                ]}},
                { "entryId": "cursor-bottom-2", "content": { "value": "NEXT" } }
            ]}
        ]));

        let page = parse_timeline(&body, 7).unwrap();
        let ids: Vec<&str> = page.posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["41", "40"]);
    }

    #[test]
    fn test_old_thread_root_does_not_end_page_early() {
        let body = timeline(json!([
            { "type": "TimelineAddEntries", "entries": [
                { "entryId": "profile-conversation-1", "content": { "items": [
                    { "item": { "itemContent": { "tweet_results": { "result":
                        tweet_result("1", "Sun Jan 01 09:00:00 +0000 2023", "old root") } } } },
                    { "item": { "itemContent": { "tweet_results": { "result":
                        tweet_result("10", "Wed Jan 10 09:00:00 +0000 2024", "late reply") } } } }
                ]}},
                tweet_entry("9", "Tue Jan 09 09:00:00 +0000 2024", "regular"),
                { "entryId": "cursor-bottom-4", "content": { "value": "NEXT" } }
            ]}
        ]));

        let page = parse_timeline(&body, 7).unwrap();
        let ids: Vec<&str> = page.posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["10", "9"]);
        assert_eq!(page.next_cursor.as_deref(), Some("NEXT"));
    }

    #[test]
    fn test_tombstone_only_page_keeps_cursor() {
        let tombstone = |id: &str| {
            json!({
                "entryId": format!("tweet-{}", id),
                "content": { "itemContent": { "tweet_results": { "result": { "__typename": "TweetTombstone" } } } }
            })
        };
        let body = timeline(json!([
            { "type": "TimelineAddEntries", "entries": [
                tombstone("5"),
                tombstone("4"),
                { "entryId": "cursor-bottom-0", "content": { "value": "MORE" } }
            ]}
        ]));

        let page = parse_timeline(&body, 7).unwrap();
        assert!(page.posts.is_empty());
        assert_eq!(page.next_cursor.as_deref(), Some("MORE"));
    }

    #[test]
    fn test_visibility_wrapper_note_tweet_and_tombstone() {
        let wrapped = json!({
            "__typename": "TweetWithVisibilityResults",
            "tweet": {
                "rest_id": "55",
                "legacy": { "id_str": "55", "created_at": "Fri Jan 05 10:00:00 +0000 2024", "full_text": "truncated…" },
                "note_tweet": { "note_tweet_results": { "result": { "text": "the full long text" } } }
            }
        });
        let post = parse_tweet(&wrapped).unwrap().unwrap();
        assert_eq!(post.id, "55");
        assert_eq!(post.text, "the full long text");

        let tombstone = json!({ "__typename": "TweetTombstone" });
        assert!(parse_tweet(&tombstone).unwrap().is_none());
    }

    #[test]
    fn test_empty_page_ends_timeline() {
        let body = timeline(json!([
            { "type": "TimelineAddEntries", "entries": [
                { "entryId": "cursor-top-3", "content": { "value": "TOP" } },
                { "entryId": "cursor-bottom-3", "content": { "value": "BOTTOM" } }
            ]}
        ]));

        let page = parse_timeline(&body, 7).unwrap();
        assert!(page.posts.is_empty());
        assert!(page.is_last());
    }

    #[test]
    fn test_replace_entry_cursor() {
        let body = timeline(json!([
            { "type": "TimelineAddEntries", "entries": [
                tweet_entry("10", "Mon Jan 01 00:00:00 +0000 2024", "a")
            ]},
            { "type": "TimelineReplaceEntry", "entry_id_to_replace": "cursor-bottom-0",
              "entry": { "entryId": "cursor-bottom-0", "content": { "value": "REPLACED" } } }
        ]));

        let page = parse_timeline(&body, 7).unwrap();
        assert_eq!(page.next_cursor.as_deref(), Some("REPLACED"));
    }

    #[test]
    fn test_unavailable_user_is_not_found() {
        let body = json!({ "data": { "user": { "result": { "__typename": "UserUnavailable" } } } });
        assert!(matches!(
            parse_timeline(&body, 7),
            Err(PlatformError::NotFound(_))
        ));
        assert!(matches!(
            parse_user_id(&json!({ "data": {} }), "ghost"),
            Err(PlatformError::NotFound(_))
        ));
    }

    #[test]
    fn test_malformed_payloads_are_protocol_errors() {
        let no_instructions = json!({ "data": { "user": { "result": { "__typename": "User" } } } });
        assert!(matches!(
            parse_timeline(&no_instructions, 7),
            Err(PlatformError::Protocol(_))
        ));

        let bad_date = tweet_result("1", "yesterday", "x");
        assert!(matches!(parse_tweet(&bad_date), Err(PlatformError::Protocol(_))));
    }

    #[test]
    fn test_parse_user_id() {
        let body = json!({ "data": { "user": { "result": { "__typename": "User", "rest_id": "783214" } } } });
        assert_eq!(parse_user_id(&body, "x").unwrap(), 783214);
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, "UserTweets", ""),
            PlatformError::Authentication(_)
        ));
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, "UserTweets", ""),
            PlatformError::Authentication(_)
        ));
        assert!(matches!(
            map_status(StatusCode::NOT_FOUND, "UserTweets", ""),
            PlatformError::NotFound(_)
        ));
        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS, "UserTweets", ""),
            PlatformError::RateLimit(_)
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_GATEWAY, "UserTweets", "upstream"),
            PlatformError::Network(_)
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_REQUEST, "UserTweets", "bad features"),
            PlatformError::Protocol(_)
        ));
    }
}
