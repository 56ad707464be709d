//! Conversation messages

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Identifier the matching tool result must echo
    pub id: String,
    /// Capability name
    pub name: String,
    /// Raw JSON arguments as produced by the model
    pub arguments: String,
}

/// A single conversation message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    System(String),
    Human(String),
    Assistant {
        /// Spoken text (possibly empty when only tools are requested)
        text: String,
        tool_calls: Vec<ToolCallRequest>,
    },
    ToolResult {
        /// Id of the request this result answers
        call_id: String,
        content: String,
    },
}

impl Message {
    /// An assistant message without tool calls
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Tool calls carried by this message (empty unless Assistant)
    #[must_use]
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

/// The message history for one turn
///
/// Always starts with exactly one System message.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Start a turn: system prompt plus the user's request
    #[must_use]
    pub fn new(system_prompt: impl Into<String>, request: impl Into<String>) -> Self {
        Self {
            messages: vec![
                Message::System(system_prompt.into()),
                Message::Human(request.into()),
            ],
        }
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Check the structural rules of the history
    ///
    /// - exactly one System message, in first position
    /// - every tool result answers a pending request of the immediately
    ///   preceding assistant message, once
    /// - all requests are answered before any other message follows
    ///
    /// # Errors
    ///
    /// Returns `Error::Conversation` naming the violated rule
    pub fn validate(&self) -> Result<()> {
        match self.messages.first() {
            Some(Message::System(_)) => {}
            _ => {
                return Err(Error::Conversation(
                    "conversation must start with a system message".to_string(),
                ));
            }
        }

        let mut pending: HashSet<&str> = HashSet::new();

        for (index, message) in self.messages.iter().enumerate().skip(1) {
            if let Message::ToolResult { call_id, .. } = message {
                if !pending.remove(call_id.as_str()) {
                    return Err(Error::Conversation(format!(
                        "tool result at {index} answers no pending request ({call_id})"
                    )));
                }
                continue;
            }

            if !pending.is_empty() {
                return Err(Error::Conversation(format!(
                    "message at {index} precedes results for {} pending tool call(s)",
                    pending.len()
                )));
            }

            match message {
                Message::System(_) => {
                    return Err(Error::Conversation(format!(
                        "unexpected system message at {index}"
                    )));
                }
                Message::Assistant { tool_calls, .. } => {
                    for call in tool_calls {
                        if !pending.insert(call.id.as_str()) {
                            return Err(Error::Conversation(format!(
                                "duplicate tool call id {}",
                                call.id
                            )));
                        }
                    }
                }
                Message::Human(_) | Message::ToolResult { .. } => {}
            }
        }

        if pending.is_empty() {
            Ok(())
        } else {
            Err(Error::Conversation(format!(
                "{} tool call(s) left unanswered",
                pending.len()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_string(),
            name: "get_weather".to_string(),
            arguments: "{}".to_string(),
        }
    }

    fn result(id: &str) -> Message {
        Message::ToolResult {
            call_id: id.to_string(),
            content: "ok".to_string(),
        }
    }

    #[test]
    fn fresh_turn_is_valid() {
        let conversation = Conversation::new("system", "hello");
        assert_eq!(conversation.len(), 2);
        assert!(conversation.validate().is_ok());
    }

    #[test]
    fn results_in_any_order() {
        let mut conversation = Conversation::new("system", "hello");
        conversation.push(Message::Assistant {
            text: String::new(),
            tool_calls: vec![call("a"), call("b")],
        });
        conversation.extend([result("b"), result("a")]);
        conversation.push(Message::assistant("done"));
        assert!(conversation.validate().is_ok());
    }

    #[test]
    fn unanswered_request_is_rejected() {
        let mut conversation = Conversation::new("system", "hello");
        conversation.push(Message::Assistant {
            text: String::new(),
            tool_calls: vec![call("a"), call("b")],
        });
        conversation.push(result("a"));
        assert!(conversation.validate().is_err());

        conversation.push(Message::Human("again".to_string()));
        assert!(conversation.validate().is_err());
    }

    #[test]
    fn stray_or_repeated_result_is_rejected() {
        let mut conversation = Conversation::new("system", "hello");
        conversation.push(result("x"));
        assert!(conversation.validate().is_err());

        let mut conversation = Conversation::new("system", "hello");
        conversation.push(Message::Assistant {
            text: String::new(),
            tool_calls: vec![call("a")],
        });
        conversation.extend([result("a"), result("a")]);
        assert!(conversation.validate().is_err());
    }

    #[test]
    fn second_system_message_is_rejected() {
        let mut conversation = Conversation::new("system", "hello");
        conversation.push(Message::System("again".to_string()));
        assert!(conversation.validate().is_err());
    }
}
