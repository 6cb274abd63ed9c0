//! Error types for Timesift

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TimesiftError>;

/// Result of a single platform request
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

#[derive(Error, Debug)]
pub enum TimesiftError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl TimesiftError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            TimesiftError::InvalidInput(_) => 3,
            TimesiftError::Platform(e) if e.is_credential_failure() => 2,
            TimesiftError::Platform(_) => 1,
            TimesiftError::Config(_) => 1,
            TimesiftError::Export(_) => 1,
        }
    }

    /// The platform error behind this error, if any
    pub fn as_platform(&self) -> Option<&PlatformError> {
        match self {
            TimesiftError::Platform(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The credential set is missing fields or could not be read
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The platform refused the session (expired or revoked tokens)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Unknown, suspended or protected user
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Network error: {0}")]
    Network(String),

    /// A payload the client could not interpret
    #[error("Unexpected response: {0}")]
    Protocol(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<PlatformError>,
    },
}

impl PlatformError {
    /// Rate limiting and transport failures may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            PlatformError::RateLimit(_) | PlatformError::Network(_) => true,
            PlatformError::InvalidCredentials(_)
            | PlatformError::Authentication(_)
            | PlatformError::NotFound(_)
            | PlatformError::Protocol(_)
            | PlatformError::RetriesExhausted { .. } => false,
        }
    }

    /// Failures caused by the session rather than the request
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            PlatformError::InvalidCredentials(_) | PlatformError::Authentication(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize records: {0}")]
    Serialize(#[from] serde_json::Error),
}
