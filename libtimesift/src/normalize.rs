//! Conversion of raw timeline posts into [`PostRecord`]s

use chrono::SecondsFormat;

use crate::types::{PostRecord, RawPost, UserIdentifier};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Build the canonical record for `raw`. Date strings are derived in UTC.
pub fn normalize(raw: RawPost, source: Option<&UserIdentifier>) -> PostRecord {
    let date = raw
        .created_at
        .to_rfc3339_opts(SecondsFormat::AutoSi, false);
    let time = raw.created_at.format(TIME_FORMAT).to_string();

    PostRecord {
        post_id: raw.id,
        text: raw.text,
        created_at: raw.created_at,
        date,
        time,
        user_identifier: source.cloned(),
    }
}
