//! Conversational agent: messages, model client and the turn runner

mod llm;
mod message;
mod runner;

pub use llm::{AssistantReply, LanguageModel, OpenAiChat};
pub use message::{Conversation, Message, ToolCallRequest};
pub use runner::{AgentLoop, FALLBACK_ANSWER, TurnEnd, TurnOutcome};
