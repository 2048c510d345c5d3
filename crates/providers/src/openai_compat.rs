//! OpenAI-compatible chat adapter.
//!
//! Works against any endpoint speaking the `/chat/completions` wire
//! format (hosted APIs or a local runtime such as Ollama's compat
//! endpoint). Implements all three capabilities: blocking chat, SSE
//! streaming, and native tool calling.

use async_stream::try_stream;
use futures_util::StreamExt;
use serde_json::{json, Value};

use hearth_domain::chat::{Message, Role, ToolCall, ToolDefinition};
use hearth_domain::error::{Error, Result};
use hearth_domain::stream::BoxStream;

use crate::traits::{ModelClient, ToolChoice};

const CLIENT_ID: &str = "openai-compat";

pub struct OpenAiCompatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key,
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn request(&self, payload: &Value) -> reqwest::RequestBuilder {
        let mut req = self.http.post(self.endpoint()).json(payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    async fn post(&self, payload: &Value) -> Result<Value> {
        let resp = self
            .request(payload)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            let message = body["error"]["message"]
                .as_str()
                .map(str::to_owned)
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(Error::Model {
                client: CLIENT_ID.into(),
                message,
            });
        }
        Ok(body)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire conversion
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn wire_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| {
            let mut obj = json!({
                "role": role_str(m.role),
                "content": m.content,
            });
            if let Some(call_id) = &m.tool_call_id {
                obj["tool_call_id"] = json!(call_id);
            }
            obj
        })
        .collect()
}

fn build_payload(
    model: &str,
    messages: &[Message],
    temperature: f32,
    max_tokens: Option<u32>,
    stream: bool,
) -> Value {
    let mut payload = json!({
        "model": model,
        "messages": wire_messages(messages),
        "temperature": temperature,
    });
    if let Some(max) = max_tokens {
        payload["max_tokens"] = json!(max);
    }
    if stream {
        payload["stream"] = json!(true);
    }
    payload
}

fn wire_tools(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                },
            })
        })
        .collect()
}

fn parse_tool_calls(message: &Value) -> Vec<ToolCall> {
    let Some(calls) = message["tool_calls"].as_array() else {
        return Vec::new();
    };
    calls
        .iter()
        .filter_map(|c| {
            let name = c["function"]["name"].as_str()?;
            let raw_args = c["function"]["arguments"].as_str().unwrap_or("{}");
            let arguments = serde_json::from_str(raw_args).unwrap_or_else(|e| {
                tracing::warn!(tool = name, error = %e, "tool call arguments are not valid JSON");
                json!({})
            });
            Some(ToolCall {
                call_id: c["id"].as_str().unwrap_or_default().to_owned(),
                tool_name: name.to_owned(),
                arguments,
            })
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ModelClient impl
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl ModelClient for OpenAiCompatClient {
    async fn chat(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String> {
        let payload = build_payload(&self.model, messages, temperature, max_tokens, false);
        let body = self.post(&payload).await?;
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_owned();
        Ok(content)
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn stream(
        &self,
        messages: &[Message],
        temperature: f32,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let payload = build_payload(&self.model, messages, temperature, None, true);
        let resp = self
            .request(&payload)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Error::Model {
                client: CLIENT_ID.into(),
                message: format!("HTTP {}", resp.status()),
            });
        }

        let mut bytes = resp.bytes_stream();
        let stream = try_stream! {
            let mut buf = String::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| Error::Http(e.to_string()))?;
                buf.push_str(&String::from_utf8_lossy(&chunk));

                // SSE frames are newline-separated; keep the trailing
                // partial line in the buffer.
                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].trim().to_owned();
                    buf.drain(..=pos);
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        return;
                    }
                    let Ok(value) = serde_json::from_str::<Value>(data) else {
                        continue;
                    };
                    if let Some(text) = value["choices"][0]["delta"]["content"].as_str() {
                        if !text.is_empty() {
                            yield text.to_owned();
                        }
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }

    fn supports_tool_calls(&self) -> bool {
        true
    }

    async fn chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        temperature: f32,
        tool_choice: ToolChoice,
    ) -> Result<(String, Vec<ToolCall>)> {
        let mut payload = build_payload(&self.model, messages, temperature, None, false);
        payload["tools"] = Value::Array(wire_tools(tools));
        payload["tool_choice"] = json!(tool_choice.as_str());
        let body = self.post(&payload).await?;
        let message = &body["choices"][0]["message"];
        let content = message["content"].as_str().unwrap_or_default().to_owned();
        Ok((content, parse_tool_calls(message)))
    }
}
