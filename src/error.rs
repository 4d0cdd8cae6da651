//! Error types for vidl

use thiserror::Error;

/// Main error type for vidl operations
#[derive(Debug, Error)]
pub enum VidlError {
    /// The remote reported a missing resource (404). Batch callers skip the item.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network, timeout or non-404 status failure. Retried with backoff.
    #[error("Transient error: {0}")]
    Transient(String),

    /// The site explicitly refused the request while validating credentials.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The credential source gave up, or the refresh cap was reached.
    #[error("Credential refresh exhausted after {attempts} attempt(s): {url}")]
    AuthRefreshExhausted { attempts: u32, url: String },

    /// An expected structural marker is missing from a page or manifest.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The size probe returned no content length.
    #[error("Remote size unknown: {0}")]
    SizeUnknown(String),

    /// A ranged request was answered with the whole resource.
    #[error("Server ignored range request bytes={start}- for {url}")]
    RangeIgnored { url: String, start: u64 },

    #[error("Remux failed: {0}")]
    Remux(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),
}

impl VidlError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, VidlError::Transient(_))
    }

    /// Check if a batch should skip this item instead of failing
    pub fn is_skippable(&self) -> bool {
        matches!(self, VidlError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(VidlError::Transient("503".to_string()).is_retryable());
        assert!(!VidlError::NotFound("x".to_string()).is_retryable());
        assert!(!VidlError::PermissionDenied("x".to_string()).is_retryable());
        assert!(!VidlError::SizeUnknown("x".to_string()).is_retryable());
    }

    #[test]
    fn test_not_found_is_skippable() {
        assert!(VidlError::NotFound("x".to_string()).is_skippable());
        assert!(!VidlError::Parse("x".to_string()).is_skippable());
    }

    #[test]
    fn test_error_display_carries_context() {
        let err = VidlError::AuthRefreshExhausted {
            attempts: 3,
            url: "https://host/api".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Credential refresh exhausted after 3 attempt(s): https://host/api"
        );
    }
}
