//! LLM client library for the longreader workspace
//!
//! Provides a unified interface for the text-generation services used to
//! rewrite document chunks before speech synthesis:
//! - Anthropic Messages API (with forced tool use)
//! - OpenAI and OpenAI-compatible chat completion APIs (OpenAI, OpenRouter)

pub mod error;
pub mod provider;
pub mod providers;

pub use error::{LlmError, Result};
pub use provider::{LlmProvider, LlmRequest, LlmResponse, TokenUsage, ToolSpec};
pub use providers::{MockProvider, ProviderKind, get_provider, resolve_api_key};
