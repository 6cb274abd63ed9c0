//! Authenticated HTTP session built from stored credentials
//!
//! [`Session::open`] validates the credential set up front so a bad cookie
//! file fails before any page is requested. The resulting session is
//! immutable; clone it to share between sequential walks.

use std::fmt;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, COOKIE};

use crate::config::{ApiConfig, Config};
use crate::credentials::CredentialSet;
use crate::error::{PlatformError, Result};

#[derive(Clone)]
pub struct Session {
    client: reqwest::Client,
    api: ApiConfig,
}

impl Session {
    /// Validate `credentials` and build the HTTP client carrying them.
    ///
    /// # Errors
    ///
    /// `PlatformError::InvalidCredentials` if a required cookie is missing
    /// or a value cannot be sent as a header.
    pub fn open(credentials: CredentialSet, config: &Config) -> Result<Self> {
        credentials.validate()?;

        let headers = build_headers(&credentials, &config.api)?;
        let client = reqwest::Client::builder()
            .user_agent(&config.scrape.user_agent)
            .timeout(config.scrape.timeout())
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| PlatformError::Network(format!("failed to build HTTP client: {}", e)))?;

        tracing::debug!(
            "Opened session against {} with {} cookies",
            config.api.base_url,
            credentials.len()
        );

        Ok(Self {
            client,
            api: config.api.clone(),
        })
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn api(&self) -> &ApiConfig {
        &self.api
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.api.base_url)
            .finish_non_exhaustive()
    }
}

fn build_headers(credentials: &CredentialSet, api: &ApiConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    let csrf = credentials.get("ct0").unwrap_or_default();
    headers.insert(
        AUTHORIZATION,
        sensitive(&format!("Bearer {}", api.bearer_token), "bearer token")?,
    );
    headers.insert(COOKIE, sensitive(&credentials.cookie_header(), "cookie header")?);
    headers.insert(
        HeaderName::from_static("x-csrf-token"),
        sensitive(csrf, "ct0")?,
    );
    headers.insert(
        HeaderName::from_static("x-twitter-auth-type"),
        HeaderValue::from_static("OAuth2Session"),
    );
    headers.insert(
        HeaderName::from_static("x-twitter-active-user"),
        HeaderValue::from_static("yes"),
    );

    Ok(headers)
}

fn sensitive(value: &str, what: &str) -> Result<HeaderValue> {
    let mut header = HeaderValue::from_str(value).map_err(|_| {
        PlatformError::InvalidCredentials(format!("{} is not a valid header value", what))
    })?;
    header.set_sensitive(true);
    Ok(header)
}
