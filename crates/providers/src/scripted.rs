//! Deterministic scripted client for tests and offline demos.
//!
//! Replies are consumed in order; when the script runs dry the client
//! returns an error, which exercises the callers' fallback paths.

use std::collections::VecDeque;

use parking_lot::Mutex;

use hearth_domain::chat::{Message, ToolCall, ToolDefinition};
use hearth_domain::error::{Error, Result};
use hearth_domain::stream::BoxStream;

use crate::traits::{ModelClient, ToolChoice};

#[derive(Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<String>>,
    /// Transcript of every prompt the client saw (first user/system text
    /// per call), for assertions.
    calls: Mutex<Vec<String>>,
    streaming: bool,
}

impl ScriptedClient {
    pub fn new(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            calls: Mutex::new(Vec::new()),
            streaming: false,
        }
    }

    /// Same script, but `stream` is reported as supported and replies
    /// are emitted as single-chunk streams.
    pub fn with_streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn next_reply(&self, messages: &[Message]) -> Result<String> {
        self.calls
            .lock()
            .push(messages.last().map(|m| m.content.clone()).unwrap_or_default());
        self.replies
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Model {
                client: "scripted".into(),
                message: "script exhausted".into(),
            })
    }
}

#[async_trait::async_trait]
impl ModelClient for ScriptedClient {
    async fn chat(
        &self,
        messages: &[Message],
        _temperature: f32,
        _max_tokens: Option<u32>,
    ) -> Result<String> {
        self.next_reply(messages)
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn stream(
        &self,
        messages: &[Message],
        _temperature: f32,
    ) -> Result<BoxStream<'static, Result<String>>> {
        if !self.streaming {
            return Err(Error::Unsupported("streaming"));
        }
        let reply = self.next_reply(messages)?;
        Ok(Box::pin(futures_util::stream::iter(vec![Ok(reply)])))
    }

    async fn chat_with_tools(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
        _temperature: f32,
        _tool_choice: ToolChoice,
    ) -> Result<(String, Vec<ToolCall>)> {
        // Scripted replies are plain text; no native tool calls.
        Ok((self.next_reply(messages)?, Vec::new()))
    }
}
