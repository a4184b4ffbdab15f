use thiserror::Error;

/// Main error type for the relay bot
#[derive(Error, Debug)]
pub enum TwodError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Telegram API error {code}: {description}")]
    Telegram { code: i64, description: String },

    // Result source errors
    #[error("Fetch failed: {0}")]
    Fetch(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl TwodError {
    /// Retry-after hint carried by a rate limit response
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            TwodError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.retry_after().is_some()
    }
}

/// Result type alias for TwodError
pub type Result<T> = std::result::Result<T, TwodError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_only_for_rate_limits() {
        let limited = TwodError::RateLimited { retry_after_secs: 7 };
        assert_eq!(limited.retry_after(), Some(7));
        assert!(limited.is_rate_limited());

        let other = TwodError::Telegram {
            code: 400,
            description: "Bad Request: message to edit not found".to_string(),
        };
        assert_eq!(other.retry_after(), None);
        assert!(!other.is_rate_limited());
    }

    #[test]
    fn test_display_includes_context() {
        let err = TwodError::Fetch("HTTP 503 from source".to_string());
        assert_eq!(err.to_string(), "Fetch failed: HTTP 503 from source");
    }
}
