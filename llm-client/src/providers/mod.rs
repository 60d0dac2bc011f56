//! LLM provider implementations

mod anthropic;
pub mod mock;
mod openai_compatible;

pub use anthropic::AnthropicProvider;
pub use mock::MockProvider;
pub use openai_compatible::OpenAICompatibleProvider;

use std::str::FromStr;

use reqwest::Response;
use serde::Deserialize;

use crate::error::{LlmError, Result};
use crate::provider::LlmProvider;

/// Supported provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
    OpenRouter,
}

impl FromStr for ProviderKind {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            "openrouter" => Ok(Self::OpenRouter),
            _ => Err(LlmError::ConfigError(format!("Unknown provider: {}", s))),
        }
    }
}

impl ProviderKind {
    /// Get the environment variable name for this provider's API key
    pub fn env_var(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    /// Human readable provider name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Anthropic => "Anthropic",
            Self::OpenAi => "OpenAI",
            Self::OpenRouter => "OpenRouter",
        }
    }
}

/// Create a provider instance.
///
/// `base_url` overrides the provider's default endpoint (useful for proxies
/// and self-hosted OpenAI-compatible servers).
pub fn get_provider(
    kind: ProviderKind,
    model: &str,
    api_key: String,
    base_url: Option<&str>,
) -> Result<Box<dyn LlmProvider>> {
    match kind {
        ProviderKind::Anthropic => {
            let provider = AnthropicProvider::new(model, api_key)?;
            Ok(Box::new(match base_url {
                Some(url) => provider.with_base_url(url),
                None => provider,
            }))
        }
        ProviderKind::OpenAi => Ok(Box::new(OpenAICompatibleProvider::new(
            model,
            base_url.unwrap_or(openai_compatible::OPENAI_BASE_URL),
            api_key,
            "OpenAI",
        )?)),
        ProviderKind::OpenRouter => Ok(Box::new(OpenAICompatibleProvider::new(
            model,
            base_url.unwrap_or(openai_compatible::OPENROUTER_BASE_URL),
            api_key,
            "OpenRouter",
        )?)),
    }
}

/// Get API key from an explicit value or the provider's environment variable
pub fn resolve_api_key(explicit: Option<&str>, kind: ProviderKind) -> Result<String> {
    if let Some(key) = explicit.filter(|k| !k.trim().is_empty()) {
        return Ok(key.to_string());
    }

    std::env::var(kind.env_var())
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| LlmError::MissingApiKey {
            provider: kind.display_name().to_string(),
            env_var: kind.env_var().to_string(),
        })
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Convert a non-success HTTP response into the matching error.
///
/// Both Anthropic and OpenAI-style APIs wrap errors as
/// `{"error": {"message": ...}}`; anything else is reported verbatim.
pub(crate) async fn error_from_response(response: Response) -> LlmError {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    let error_text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorResponse>(&error_text) {
        Ok(parsed) => parsed.error.message,
        Err(_) => error_text,
    };

    classify_status(status, retry_after, message)
}

fn classify_status(status: u16, retry_after: Option<u64>, message: String) -> LlmError {
    match status {
        429 => LlmError::RateLimited { retry_after },
        // 529 is Anthropic's "overloaded" status
        503 | 529 => LlmError::ServerOverloaded {
            message,
            status_code: status,
        },
        _ => LlmError::ApiError {
            message,
            status_code: Some(status),
        },
    }
}
