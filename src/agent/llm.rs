//! Language model client
//!
//! [`OpenAiChat`] streams chat completions from any OpenAI-compatible
//! endpoint over SSE, surfacing text as it arrives and assembling tool-call
//! fragments by index.

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use super::message::{Conversation, Message, ToolCallRequest};
use crate::config::LlmConfig;
use crate::tools::ToolSchema;
use crate::{Error, Result};

/// The model's answer for one Respond step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssistantReply {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl AssistantReply {
    #[must_use]
    pub fn into_message(self) -> Message {
        Message::Assistant {
            text: self.text,
            tool_calls: self.tool_calls,
        }
    }
}

/// A chat model with tool calling
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Produce the next assistant message for `conversation`
    ///
    /// Text fragments are sent on `deltas` as they are generated; the
    /// returned reply carries the full text as well. A closed `deltas`
    /// receiver must not fail the call.
    ///
    /// # Errors
    ///
    /// Returns error if the model cannot be reached or answers with an error
    async fn respond(
        &self,
        conversation: &Conversation,
        tools: &[ToolSchema],
        deltas: &mpsc::Sender<String>,
    ) -> Result<AssistantReply>;
}

/// OpenAI-compatible streaming chat client
pub struct OpenAiChat {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    temperature: f32,
}

impl OpenAiChat {
    /// Create a client from configuration
    ///
    /// # Errors
    ///
    /// Returns error if no API key is configured
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(Error::Unavailable("language model API key"))?;

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    fn request_body(&self, conversation: &Conversation, tools: &[ToolSchema]) -> Value {
        let messages: Vec<Value> = conversation.messages().iter().map(wire_message).collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "stream": true,
        });

        if !tools.is_empty() {
            body["tools"] = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
        }

        body
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    async fn respond(
        &self,
        conversation: &Conversation,
        tools: &[ToolSchema],
        deltas: &mpsc::Sender<String>,
    ) -> Result<AssistantReply> {
        let body = self.request_body(conversation, tools);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "chat completion error");
            return Err(Error::Agent(format!("chat completion error {status}: {body}")));
        }

        let mut stream = response.bytes_stream();
        let mut lines = SseLines::default();
        let mut reply = StreamAccumulator::default();

        'stream: while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for data in lines.push(&chunk) {
                if data == "[DONE]" {
                    break 'stream;
                }
                let event: Value = serde_json::from_str(&data)?;
                if let Some(text) = reply.apply(&event)? {
                    // Receiver gone means the turn was abandoned; keep assembling
                    let _ = deltas.send(text).await;
                }
            }
        }

        let reply = reply.finish();
        tracing::debug!(
            text_len = reply.text.len(),
            tool_calls = reply.tool_calls.len(),
            "model responded"
        );
        Ok(reply)
    }
}

/// Convert a message to the chat-completions wire format
fn wire_message(message: &Message) -> Value {
    match message {
        Message::System(text) => json!({ "role": "system", "content": text }),
        Message::Human(text) => json!({ "role": "user", "content": text }),
        Message::Assistant { text, tool_calls } => {
            let content = if text.is_empty() {
                Value::Null
            } else {
                Value::String(text.clone())
            };
            let mut value = json!({ "role": "assistant", "content": content });
            if !tool_calls.is_empty() {
                value["tool_calls"] = tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": { "name": tc.name, "arguments": tc.arguments },
                        })
                    })
                    .collect();
            }
            value
        }
        Message::ToolResult { call_id, content } => {
            json!({ "role": "tool", "tool_call_id": call_id, "content": content })
        }
    }
}

/// Splits an SSE byte stream into `data:` payloads
#[derive(Debug, Default)]
struct SseLines {
    buffer: Vec<u8>,
}

impl SseLines {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\r', '\n']);

            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim_start().to_string());
            }
        }
        payloads
    }
}

/// In-progress tool call being assembled from streaming events
#[derive(Debug, Default, Clone)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Folds streamed chunks into a reply
#[derive(Debug, Default)]
struct StreamAccumulator {
    text: String,
    pending: Vec<PendingToolCall>,
}

impl StreamAccumulator {
    /// Apply one chunk; returns the text delta it carried, if any
    fn apply(&mut self, event: &Value) -> Result<Option<String>> {
        if let Some(error) = event.get("error") {
            let message = error["message"].as_str().unwrap_or("unknown error");
            return Err(Error::Agent(message.to_string()));
        }

        let delta = &event["choices"][0]["delta"];

        if let Some(calls) = delta["tool_calls"].as_array() {
            for call in calls {
                let idx = call["index"]
                    .as_u64()
                    .and_then(|i| usize::try_from(i).ok())
                    .unwrap_or(self.pending.len().saturating_sub(1));
                if idx >= self.pending.len() {
                    self.pending.resize_with(idx + 1, PendingToolCall::default);
                }
                let pending = &mut self.pending[idx];
                if let Some(id) = call["id"].as_str() {
                    pending.id = id.to_string();
                }
                if let Some(name) = call["function"]["name"].as_str() {
                    pending.name.push_str(name);
                }
                if let Some(arguments) = call["function"]["arguments"].as_str() {
                    pending.arguments.push_str(arguments);
                }
            }
        }

        match delta["content"].as_str() {
            Some(content) if !content.is_empty() => {
                self.text.push_str(content);
                Ok(Some(content.to_string()))
            }
            _ => Ok(None),
        }
    }

    fn finish(self) -> AssistantReply {
        let tool_calls = self
            .pending
            .into_iter()
            .filter(|tc| !tc.name.is_empty())
            .enumerate()
            .map(|(i, tc)| ToolCallRequest {
                id: if tc.id.is_empty() {
                    format!("call_{i}")
                } else {
                    tc.id
                },
                name: tc.name,
                arguments: if tc.arguments.trim().is_empty() {
                    "{}".to_string()
                } else {
                    tc.arguments
                },
            })
            .collect();

        AssistantReply {
            text: self.text,
            tool_calls,
        }
    }
}
