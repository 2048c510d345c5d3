use hearth_domain::chat::{Message, ToolCall, ToolDefinition};
use hearth_domain::error::{Error, Result};
use hearth_domain::stream::BoxStream;

/// Tool-choice directive for clients with native tool calling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChoice {
    /// The model decides whether to call tools.
    Auto,
    /// Tool calls are forbidden; the model must answer in text.
    None,
}

impl ToolChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::None => "none",
        }
    }
}

/// Trait every model adapter implements.
///
/// `chat` is mandatory; streaming and native tool calling are optional
/// capabilities. Callers branch on the `supports_*` probes instead of
/// probing at runtime, and the default methods return
/// `Error::Unsupported` so a mis-probed call fails loudly.
#[async_trait::async_trait]
pub trait ModelClient: Send + Sync {
    /// Send a chat completion request and wait for the full response.
    async fn chat(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String>;

    /// Whether [`ModelClient::stream`] is implemented.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Stream a chat completion as text chunks.
    async fn stream(
        &self,
        _messages: &[Message],
        _temperature: f32,
    ) -> Result<BoxStream<'static, Result<String>>> {
        Err(Error::Unsupported("streaming"))
    }

    /// Whether [`ModelClient::chat_with_tools`] is implemented.
    fn supports_tool_calls(&self) -> bool {
        false
    }

    /// Chat with native tool calling. Returns the text content and any
    /// tool calls the model emitted.
    async fn chat_with_tools(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
        _temperature: f32,
        _tool_choice: ToolChoice,
    ) -> Result<(String, Vec<ToolCall>)> {
        Err(Error::Unsupported("tool calling"))
    }
}
