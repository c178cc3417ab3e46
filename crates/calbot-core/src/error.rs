//! Unified error types for calbot.

use thiserror::Error;

/// Result type alias using CalbotError.
pub type Result<T> = std::result::Result<T, CalbotError>;

#[derive(Error, Debug)]
pub enum CalbotError {
    // Store errors
    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid entry record: {0}")]
    InvalidEntry(String),

    #[error("Entry not found: {0}")]
    EntryNotFound(u32),

    // Channel errors
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    // Rendering errors
    #[error("Render error: {0}")]
    Render(String),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("{0}")]
    Other(String),
}

impl CalbotError {
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_entry(msg: impl Into<String>) -> Self {
        Self::InvalidEntry(msg.into())
    }

    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Timeout(_) | Self::RateLimited(_) | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CalbotError::Store("disk full".into());
        assert!(err.to_string().contains("disk full"));
        assert_eq!(CalbotError::EntryNotFound(42).to_string(), "Entry not found: 42");
    }

    #[test]
    fn test_error_constructors() {
        assert!(matches!(CalbotError::store("x"), CalbotError::Store(_)));
        assert!(matches!(CalbotError::channel("x"), CalbotError::Channel(_)));
        assert!(matches!(CalbotError::config("x"), CalbotError::Config(_)));
        assert!(matches!(CalbotError::invalid_entry("x"), CalbotError::InvalidEntry(_)));
    }

    #[test]
    fn test_transient_classification() {
        assert!(CalbotError::Timeout("fetch".into()).is_transient());
        assert!(CalbotError::RateLimited("429".into()).is_transient());
        assert!(!CalbotError::PermissionDenied("403".into()).is_transient());
        assert!(!CalbotError::store("locked").is_transient());
        assert!(!CalbotError::channel("Discord 400: bad request").is_transient());
        assert!(!CalbotError::AuthFailed("401".into()).is_transient());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CalbotError = io_err.into();
        assert!(matches!(err, CalbotError::Io(_)));
    }
}
