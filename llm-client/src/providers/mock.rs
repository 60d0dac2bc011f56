//! Mock LLM provider for testing
//!
//! Scripted failures followed by a fixed or echoed answer, with call
//! counting and capture of the last prompt.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{LlmError, Result};
use crate::provider::{LlmProvider, LlmRequest, LlmResponse};

/// What the mock answers once its scripted failures are used up
enum Reply {
    Fixed(String),
    /// Return the prompt unchanged
    Echo,
}

/// A mock provider for testing retry and fallback behavior
pub struct MockProvider {
    /// Number of calls that fail before the first success
    fail_count: usize,
    call_count: AtomicUsize,
    fail_with: Option<LlmError>,
    reply: Reply,
    /// Answer through `tool_input` when the request carries a tool
    use_tools: bool,
    last_prompt: Mutex<Option<String>>,
}

impl MockProvider {
    fn build(fail_count: usize, fail_with: Option<LlmError>, reply: Reply) -> Self {
        Self {
            fail_count,
            call_count: AtomicUsize::new(0),
            fail_with,
            reply,
            use_tools: false,
            last_prompt: Mutex::new(None),
        }
    }

    /// Fails `n` times with the given error, then succeeds
    pub fn fails_then_succeeds(n: usize, error: LlmError, response: &str) -> Self {
        Self::build(n, Some(error), Reply::Fixed(response.to_string()))
    }

    /// Always fails with the given error
    pub fn always_fails(error: LlmError) -> Self {
        Self::build(usize::MAX, Some(error), Reply::Fixed(String::new()))
    }

    /// Always succeeds with a fixed response
    pub fn always_succeeds(response: &str) -> Self {
        Self::build(0, None, Reply::Fixed(response.to_string()))
    }

    /// Always succeeds, answering with the prompt it was sent
    pub fn echo() -> Self {
        Self::build(0, None, Reply::Echo)
    }

    /// Report tool support and answer tool requests through `tool_input`.
    ///
    /// The reply is placed in every string property named by the tool
    /// schema's `required` list.
    pub fn with_tool_support(mut self) -> Self {
        self.use_tools = true;
        self
    }

    /// Number of times complete() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Prompt of the most recent request
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().ok().and_then(|p| p.clone())
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let call_num = self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = Some(request.prompt.clone());
        }

        if call_num < self.fail_count {
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
        }

        let text = match &self.reply {
            Reply::Fixed(s) => s.clone(),
            Reply::Echo => request.prompt.clone(),
        };

        let tool_input = match (&request.tool, self.use_tools) {
            (Some(tool), true) => {
                let mut input = serde_json::Map::new();
                if let Some(required) = tool.input_schema["required"].as_array() {
                    for key in required.iter().filter_map(|k| k.as_str()) {
                        input.insert(key.to_string(), json!(text));
                    }
                }
                Some(serde_json::Value::Object(input))
            }
            _ => None,
        };

        Ok(LlmResponse {
            content: if tool_input.is_some() { String::new() } else { text },
            tool_input,
            model: "mock-model".to_string(),
            usage: None,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    fn supports_tools(&self) -> bool {
        self.use_tools
    }
}
