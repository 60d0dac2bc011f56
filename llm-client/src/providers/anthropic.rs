//! Anthropic API provider
//!
//! Direct HTTP implementation for the Anthropic Messages API. When the
//! request carries a [`ToolSpec`] the model is forced to call that tool and
//! the tool's arguments are returned as `tool_input`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error_from_response;
use crate::error::{LlmError, Result};
use crate::provider::{LlmProvider, LlmRequest, LlmResponse, TokenUsage, ToolSpec};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Provider for direct Anthropic API calls
pub struct AnthropicProvider {
    model: String,
    api_key: String,
    base_url: String,
    client: Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider
    pub fn new(model: &str, api_key: String) -> Result<Self> {
        Ok(Self {
            model: model.to_string(),
            api_key,
            base_url: ANTHROPIC_BASE_URL.to_string(),
            client: Client::new(),
        })
    }

    /// Point the provider at a different API host.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

// Anthropic API request/response types

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Tool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Serialize)]
struct ToolChoice<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Option<ResponseUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    input_tokens: u32,
    output_tokens: u32,
}

fn build_request<'a>(model: &'a str, request: &'a LlmRequest) -> MessagesRequest<'a> {
    let (tools, tool_choice) = match &request.tool {
        Some(ToolSpec {
            name,
            description,
            input_schema,
        }) => (
            vec![Tool {
                name,
                description,
                input_schema,
            }],
            Some(ToolChoice { kind: "tool", name }),
        ),
        None => (Vec::new(), None),
    };

    MessagesRequest {
        model,
        max_tokens: request.max_tokens.unwrap_or(4096),
        system: request.system_prompt.as_deref(),
        messages: vec![Message {
            role: "user",
            content: &request.prompt,
        }],
        temperature: request.temperature,
        tools,
        tool_choice,
    }
}

fn parse_response(
    model: &str,
    tool: Option<&ToolSpec>,
    api_response: MessagesResponse,
) -> Result<LlmResponse> {
    let mut content = String::new();
    let mut tool_input = None;

    for block in api_response.content {
        match block {
            ContentBlock::Text { text } => content.push_str(&text),
            ContentBlock::ToolUse { name, input } => {
                if tool.is_some_and(|t| t.name == name) {
                    tool_input = Some(input);
                }
            }
            ContentBlock::Other => {}
        }
    }

    if let Some(tool) = tool {
        if tool_input.is_none() {
            return Err(LlmError::MalformedResponse {
                provider: "Anthropic API".to_string(),
                message: format!("model did not call the '{}' tool", tool.name),
            });
        }
    }

    Ok(LlmResponse {
        content,
        tool_input,
        model: model.to_string(),
        usage: api_response.usage.map(|u| TokenUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
        }),
    })
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let api_request = build_request(&self.model, &request);

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let api_response: MessagesResponse =
            response
                .json()
                .await
                .map_err(|e| LlmError::MalformedResponse {
                    provider: "Anthropic API".to_string(),
                    message: e.to_string(),
                })?;

        parse_response(&self.model, request.tool.as_ref(), api_response)
    }

    fn name(&self) -> &'static str {
        "Anthropic API"
    }

    fn supports_tools(&self) -> bool {
        true
    }
}
