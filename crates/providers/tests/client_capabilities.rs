//! Integration tests for the model-client capability surface — the
//! contract callers branch on without touching a real endpoint.

use hearth_domain::chat::{Message, ToolDefinition};
use hearth_domain::error::Error;
use hearth_providers::{ModelClient, OpenAiCompatClient, ScriptedClient, ToolChoice};

#[test]
fn openai_compat_advertises_all_capabilities() {
    let client = OpenAiCompatClient::new("http://127.0.0.1:11434/v1", None, "test-model");
    assert!(client.supports_streaming());
    assert!(client.supports_tool_calls());
}

#[test]
fn scripted_client_is_chat_only_by_default() {
    let client = ScriptedClient::new(["hello"]);
    assert!(!client.supports_streaming());
    assert!(!client.supports_tool_calls());
}

#[tokio::test]
async fn default_trait_methods_fail_loudly_when_unprobed() {
    // A chat-only client that relies on every default method.
    struct ChatOnly;

    #[async_trait::async_trait]
    impl ModelClient for ChatOnly {
        async fn chat(
            &self,
            _messages: &[Message],
            _temperature: f32,
            _max_tokens: Option<u32>,
        ) -> hearth_domain::Result<String> {
            Ok("reply".into())
        }
    }

    let client = ChatOnly;
    assert_eq!(
        client.chat(&[Message::user("hi")], 0.0, None).await.unwrap(),
        "reply"
    );
    assert!(matches!(
        client.stream(&[Message::user("hi")], 0.0).await,
        Err(Error::Unsupported("streaming"))
    ));
    let tools = [ToolDefinition {
        name: "cron.list".into(),
        description: "list jobs".into(),
        parameters: serde_json::json!({"type": "object"}),
    }];
    assert!(matches!(
        client
            .chat_with_tools(&[Message::user("hi")], &tools, 0.0, ToolChoice::Auto)
            .await,
        Err(Error::Unsupported("tool calling"))
    ));
}

#[tokio::test]
async fn scripted_tool_choice_path_returns_no_calls() {
    let client = ScriptedClient::new(["plain answer"]);
    let (content, calls) = client
        .chat_with_tools(&[Message::user("hi")], &[], 0.2, ToolChoice::None)
        .await
        .unwrap();
    assert_eq!(content, "plain answer");
    assert!(calls.is_empty());
}
