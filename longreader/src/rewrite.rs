//! Speech-friendly rewriting of chunk text through an LLM.

use async_trait::async_trait;
use llm_client::{LlmError, LlmProvider, LlmRequest, ToolSpec};
use serde_json::json;

const TOOL_NAME: &str = "read_aloud";
const TOOL_FIELD: &str = "processed_text";
const TEMPERATURE: f32 = 0.1;
const MAX_TOKENS: u32 = 8192;

const TOOL_PROMPT: &str = "Please generate a speech audio file from the following text by \
passing it to the `read_aloud` tool.";

const TOOL_DESCRIPTION: &str = "Converts the provided text into an audio file suitable for \
text-to-speech systems. Before generating the audio file, process the text by removing any word \
wrapping, citations, footnotes, or other interrupting content that would interfere with a natural \
reading flow. The processed text must keep the original words and meaning. Put the processed text \
in the 'processed_text' parameter.";

const FIELD_DESCRIPTION: &str = "The text to be read aloud, with word wrapping, citations and \
other interruptions removed so a text-to-speech system can read it as a person would.";

const PLAIN_SYSTEM_PROMPT: &str = "You prepare text for a text-to-speech system. Remove word \
wrapping, citations, footnotes, and any other content that interrupts a natural reading flow. Keep \
the original words and meaning. Reply with the processed text only, without commentary.";

/// Turns chunk text into text that reads naturally aloud.
#[async_trait]
pub trait Rewriter: Send + Sync {
    async fn rewrite(&self, text: &str) -> llm_client::Result<String>;

    fn name(&self) -> &str;
}

/// Rewriter backed by an LLM provider.
///
/// Providers with tool support are forced to call `read_aloud`; the rewritten
/// text is its `processed_text` argument. Other providers get a plain system
/// prompt and their reply is used as is.
pub struct LlmRewriter {
    provider: Box<dyn LlmProvider>,
}

impl LlmRewriter {
    pub fn new(provider: Box<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    fn read_aloud_tool() -> ToolSpec {
        ToolSpec {
            name: TOOL_NAME.to_string(),
            description: TOOL_DESCRIPTION.to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    TOOL_FIELD: {
                        "type": "string",
                        "description": FIELD_DESCRIPTION,
                    }
                },
                "required": [TOOL_FIELD],
            }),
        }
    }

    fn build_request(&self, text: &str) -> LlmRequest {
        if self.provider.supports_tools() {
            LlmRequest {
                prompt: format!("{}\n\n<text>\n{}\n</text>", TOOL_PROMPT, text),
                max_tokens: Some(MAX_TOKENS),
                temperature: Some(TEMPERATURE),
                tool: Some(Self::read_aloud_tool()),
                ..LlmRequest::default()
            }
        } else {
            LlmRequest {
                prompt: text.to_string(),
                system_prompt: Some(PLAIN_SYSTEM_PROMPT.to_string()),
                max_tokens: Some(MAX_TOKENS),
                temperature: Some(TEMPERATURE),
                tool: None,
            }
        }
    }

    fn malformed(&self, message: &str) -> LlmError {
        LlmError::MalformedResponse {
            provider: self.provider.name().to_string(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl Rewriter for LlmRewriter {
    async fn rewrite(&self, text: &str) -> llm_client::Result<String> {
        let request = self.build_request(text);
        let expects_tool = request.tool.is_some();
        let response = self.provider.complete(request).await?;

        let rewritten = if expects_tool {
            response
                .tool_input
                .as_ref()
                .and_then(|input| input.get(TOOL_FIELD))
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| self.malformed("read_aloud call without processed_text"))?
        } else {
            response.content
        };

        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            return Err(self.malformed("empty rewrite"));
        }
        Ok(rewritten.to_string())
    }

    fn name(&self) -> &str {
        self.provider.name()
    }
}
