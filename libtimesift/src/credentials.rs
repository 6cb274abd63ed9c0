//! Stored session credentials
//!
//! Credentials are the cookies of an already logged-in browser session,
//! exported to a JSON file. Two layouts are accepted:
//!
//! - an object mapping cookie name to value (`{"auth_token": "...", "ct0": "..."}`)
//! - an array of cookie objects as written by browser extensions
//!   (`[{"name": "auth_token", "value": "..."}]`)
//!
//! Values are held as [`SecretString`] so they never show up in `Debug` output or logs.

use std::collections::BTreeMap;
use std::path::Path;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::error::{PlatformError, Result};

/// Cookies that must be present for an authenticated API request
pub const REQUIRED_FIELDS: [&str; 2] = ["auth_token", "ct0"];

/// Cookies the browser writes that the API rejects in a cookie header
const SKIPPED_COOKIES: [&str; 1] = ["g_state"];

#[derive(Debug, Default)]
pub struct CredentialSet {
    fields: BTreeMap<String, SecretString>,
}

impl CredentialSet {
    /// Read and normalize a cookie file.
    ///
    /// This only checks the file's shape; call [`CredentialSet::validate`]
    /// (or open a session) to check required fields.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PlatformError::InvalidCredentials(format!(
                "cannot read cookie file {}: {}",
                path.display(),
                e
            ))
        })?;
        let credentials = Self::from_json_str(&content)?;
        tracing::debug!(
            "Loaded {} cookies from {}",
            credentials.len(),
            path.display()
        );
        Ok(credentials)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content).map_err(|e| {
            PlatformError::InvalidCredentials(format!("cookie file is not valid JSON: {}", e))
        })?;

        let pairs: Vec<(String, Value)> = match value {
            Value::Object(map) => map.into_iter().collect(),
            Value::Array(cookies) => cookies
                .into_iter()
                .filter_map(|cookie| {
                    let name = cookie.get("name")?.as_str()?.to_string();
                    let value = cookie.get("value")?.clone();
                    Some((name, value))
                })
                .collect(),
            _ => {
                return Err(PlatformError::InvalidCredentials(
                    "cookie file must contain a JSON object or array".to_string(),
                )
                .into())
            }
        };

        let mut credentials = Self::default();
        for (name, value) in pairs {
            if let Some(cleaned) = clean_cookie(&name, &value) {
                credentials.insert(name, cleaned);
            }
        }
        Ok(credentials)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields
            .insert(name.into(), SecretString::from(value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|v| v.expose_secret())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check that every required cookie is present and usable in a header.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| self.get(field).map_or(true, str::is_empty))
            .collect();
        if !missing.is_empty() {
            return Err(PlatformError::InvalidCredentials(format!(
                "missing required cookie(s): {}",
                missing.join(", ")
            ))
            .into());
        }

        for (name, value) in &self.fields {
            if !is_header_safe(name) || !is_header_safe(value.expose_secret()) {
                return Err(PlatformError::InvalidCredentials(format!(
                    "cookie '{}' contains characters not allowed in a header",
                    name
                ))
                .into());
            }
        }
        Ok(())
    }

    /// `name=value; name=value` in name order
    pub(crate) fn cookie_header(&self) -> String {
        self.fields
            .iter()
            .map(|(name, value)| format!("{}={}", name, value.expose_secret()))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Apply the cookie filtering rules, returning `None` for dropped entries.
fn clean_cookie(name: &str, value: &Value) -> Option<String> {
    if SKIPPED_COOKIES.contains(&name) {
        return None;
    }
    match value {
        Value::String(s) => {
            if s.contains('{') || s.contains('}') {
                return None;
            }
            let cleaned = s.replace('"', "");
            let cleaned = cleaned.trim();
            (!cleaned.is_empty()).then(|| cleaned.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn is_header_safe(s: &str) -> bool {
    s.chars().all(|c| (c.is_ascii_graphic() || c == ' ') && c != ';')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_object_layout_filters_problem_cookies() {
        let creds = CredentialSet::from_json_str(
            r#"{
                "auth_token": "abc123",
                "ct0": " \"deadbeef\" ",
                "g_state": "{\"i_l\":0}",
                "guest_id": "v1%3A170000",
                "json_blob": "{not a cookie}",
                "empty": "  ",
                "twid": 1499585375534206980,
                "flag": true,
                "nothing": null
            }"#,
        )
        .unwrap();

        assert_eq!(creds.get("auth_token"), Some("abc123"));
        assert_eq!(creds.get("ct0"), Some("deadbeef"));
        assert_eq!(creds.get("guest_id"), Some("v1%3A170000"));
        assert_eq!(creds.get("twid"), Some("1499585375534206980"));
        assert_eq!(creds.get("flag"), Some("true"));
        assert!(creds.get("g_state").is_none());
        assert!(creds.get("json_blob").is_none());
        assert!(creds.get("empty").is_none());
        assert!(creds.get("nothing").is_none());
        assert!(creds.validate().is_ok());
    }

    #[test]
    fn test_array_layout() {
        let creds = CredentialSet::from_json_str(
            r#"[
                {"name": "auth_token", "value": "tok", "domain": ".x.com"},
                {"name": "ct0", "value": "csrf", "domain": ".x.com"},
                {"domain": ".x.com"}
            ]"#,
        )
        .unwrap();

        assert_eq!(creds.len(), 2);
        assert_eq!(creds.cookie_header(), "auth_token=tok; ct0=csrf");
    }

    #[test]
    fn test_missing_required_fields() {
        let creds = CredentialSet::from_json_str(r#"{"auth_token": "tok"}"#).unwrap();
        let err = creds.validate().unwrap_err();
        assert!(matches!(
            err.as_platform(),
            Some(PlatformError::InvalidCredentials(_))
        ));
        assert!(err.to_string().contains("ct0"));
    }

    #[test]
    fn test_header_unsafe_value_rejected() {
        let mut creds = CredentialSet::default();
        creds.insert("auth_token", "tok");
        creds.insert("ct0", "csrf;evil=1");
        assert!(creds.validate().is_err());
    }

    #[test]
    fn test_not_json_is_invalid_credentials() {
        let err = CredentialSet::from_json_str("auth_token=abc").unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let err = CredentialSet::from_json_str("\"just a string\"").unwrap_err();
        assert!(err.to_string().contains("object or array"));
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = CredentialSet::load(&temp.path().join("nope.json")).unwrap_err();
        assert!(err.to_string().contains("cannot read cookie file"));
    }

    #[test]
    fn test_debug_output_redacts_values() {
        let mut creds = CredentialSet::default();
        creds.insert("auth_token", "super-secret-token");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("auth_token"));
        assert!(!debug.contains("super-secret-token"));
    }
}
