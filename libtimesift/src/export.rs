//! Export of collected records to JSON and CSV files
//!
//! Writers only read the records they are given; a failed export leaves the
//! in-memory results untouched.

use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::error::{ExportError, Result};
use crate::types::PostRecord;

const CSV_COLUMNS: [&str; 4] = ["tweet_id", "text", "date", "time"];

/// Write `records` as a pretty-printed JSON array.
pub fn write_json(path: &Path, records: &[PostRecord]) -> Result<()> {
    let json = to_json(records)?;
    write_file(path, json.as_bytes())?;
    info!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

/// Write `records` as CSV with a header row.
///
/// A `user_identifier` column is added when any record carries one.
pub fn write_csv(path: &Path, records: &[PostRecord]) -> Result<()> {
    let csv = to_csv(records);
    write_file(path, csv.as_bytes())?;
    info!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

/// Render `records` as a pretty-printed JSON array
pub fn to_json(records: &[PostRecord]) -> Result<String> {
    Ok(serde_json::to_string_pretty(records).map_err(ExportError::from)?)
}

pub fn to_csv(records: &[PostRecord]) -> String {
    let with_user = records.iter().any(|r| r.user_identifier.is_some());

    let mut out = CSV_COLUMNS.join(",");
    if with_user {
        out.push_str(",user_identifier");
    }
    out.push('\n');

    for record in records {
        let mut fields = vec![
            escape_csv(&record.post_id),
            escape_csv(&record.text),
            escape_csv(&record.date),
            escape_csv(&record.time),
        ];
        if with_user {
            let user = record
                .user_identifier
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            fields.push(escape_csv(&user));
        }
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

fn escape_csv(field: &str) -> String {
    if field.contains(|c: char| matches!(c, ',' | '"' | '\n' | '\r')) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    let io_error = |source| ExportError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let mut file = fs::File::create(path).map_err(io_error)?;
    file.write_all(contents).map_err(io_error)?;
    file.flush().map_err(io_error)?;
    Ok(())
}
