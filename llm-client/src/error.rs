use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error(
        "API key not found for {provider}. Set {env_var} environment variable or add to config."
    )]
    MissingApiKey { provider: String, env_var: String },

    #[error("Rate limit exceeded{}", .retry_after.map(|s| format!(". Retry after {} seconds", s)).unwrap_or_default())]
    RateLimited { retry_after: Option<u64> },

    #[error("Server overloaded (HTTP {status_code}): {message}")]
    ServerOverloaded { message: String, status_code: u16 },

    #[error("API error{}: {message}", status_code.map(|c| format!(" (HTTP {})", c)).unwrap_or_default())]
    ApiError {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Unexpected response from {provider}: {message}")]
    MalformedResponse { provider: String, message: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),
}

impl LlmError {
    /// Whether retrying the same request may succeed.
    ///
    /// Rate limits, overloaded servers and connection failures are transient.
    /// Client errors, bad credentials and malformed responses are not.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::RateLimited { .. }
            | LlmError::ServerOverloaded { .. }
            | LlmError::Transport(_) => true,
            LlmError::ApiError { status_code, .. } => {
                matches!(status_code, Some(code) if *code == 408 || *code >= 500)
            }
            LlmError::MissingApiKey { .. }
            | LlmError::MalformedResponse { .. }
            | LlmError::ConfigError(_)
            | LlmError::ProviderUnavailable(_) => false,
        }
    }

    /// Delay requested by the server before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited {
                retry_after: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::RateLimited { retry_after: None }.is_transient());
        assert!(
            LlmError::ServerOverloaded {
                message: "busy".into(),
                status_code: 529,
            }
            .is_transient()
        );
        assert!(LlmError::Transport("connection reset".into()).is_transient());
        assert!(
            LlmError::ApiError {
                message: "bad gateway".into(),
                status_code: Some(502),
            }
            .is_transient()
        );
        assert!(
            !LlmError::ApiError {
                message: "bad request".into(),
                status_code: Some(400),
            }
            .is_transient()
        );
        assert!(!LlmError::ConfigError("nope".into()).is_transient());
        assert!(!LlmError::ProviderUnavailable("shut down".into()).is_transient());
    }

    #[test]
    fn test_retry_after_hint() {
        let err = LlmError::RateLimited {
            retry_after: Some(7),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(err.to_string(), "Rate limit exceeded. Retry after 7 seconds");
        assert_eq!(LlmError::RateLimited { retry_after: None }.retry_after(), None);
    }
}
