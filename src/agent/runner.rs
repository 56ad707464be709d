//! Agentic turn runner
//!
//! Drives one turn through Respond and Act steps until the model stops
//! asking for tools or the step limit is reached.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::llm::LanguageModel;
use super::message::{Conversation, Message, ToolCallRequest};
use crate::tools::ToolExecutor;
use crate::{Error, Result};

/// Spoken when the step limit is reached
pub const FALLBACK_ANSWER: &str = "I'm afraid I was unable to complete this request, sir.";

/// Tool result for calls left unexecuted at the step limit
const STEP_LIMIT_RESULT: &str = "Error: tool step limit reached.";

#[derive(Debug)]
enum AgentState {
    Respond,
    Act(Vec<ToolCallRequest>),
    Done,
}

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEnd {
    /// The model answered without further tool calls
    Answered,
    /// The step limit was hit and the fallback answer was used
    StepLimit,
    /// The delta receiver went away before the turn finished
    Abandoned,
}

/// Result of a completed turn
#[derive(Debug)]
pub struct TurnOutcome {
    pub conversation: Conversation,
    /// Number of Act steps taken
    pub steps: u32,
    pub end: TurnEnd,
}

/// Runs turns against a model and a tool executor
#[derive(Clone)]
pub struct AgentLoop {
    model: Arc<dyn LanguageModel>,
    tools: Arc<dyn ToolExecutor>,
    max_tool_steps: u32,
}

impl AgentLoop {
    #[must_use]
    pub fn new(
        model: Arc<dyn LanguageModel>,
        tools: Arc<dyn ToolExecutor>,
        max_tool_steps: u32,
    ) -> Self {
        Self {
            model,
            tools,
            max_tool_steps: max_tool_steps.max(1),
        }
    }

    /// Run a full turn
    ///
    /// Text is streamed on `deltas` as the model produces it.
    ///
    /// # Errors
    ///
    /// Returns error if the model fails or the conversation is malformed
    pub async fn run(
        &self,
        mut conversation: Conversation,
        deltas: mpsc::Sender<String>,
    ) -> Result<TurnOutcome> {
        let schemas = self.tools.schemas();
        let mut steps = 0u32;
        let mut end = TurnEnd::Answered;
        let mut state = AgentState::Respond;

        loop {
            state = match state {
                AgentState::Respond => {
                    if deltas.is_closed() {
                        tracing::debug!(steps, "turn abandoned, stopping agent");
                        end = TurnEnd::Abandoned;
                        AgentState::Done
                    } else {
                        conversation.validate()?;
                        let reply = self.model.respond(&conversation, &schemas, &deltas).await?;
                        let calls = reply.tool_calls.clone();
                        conversation.push(reply.into_message());

                        if calls.is_empty() {
                            AgentState::Done
                        } else {
                            AgentState::Act(calls)
                        }
                    }
                }
                AgentState::Act(calls) => {
                    if steps >= self.max_tool_steps {
                        tracing::warn!(
                            steps,
                            pending = calls.len(),
                            "tool step limit reached, giving up"
                        );
                        conversation.extend(calls.into_iter().map(|call| Message::ToolResult {
                            call_id: call.id,
                            content: STEP_LIMIT_RESULT.to_string(),
                        }));
                        conversation.push(Message::assistant(FALLBACK_ANSWER));
                        let _ = deltas.send(FALLBACK_ANSWER.to_string()).await;
                        end = TurnEnd::StepLimit;
                        AgentState::Done
                    } else {
                        steps += 1;
                        let results = self.act(&calls).await;
                        conversation.extend(results);
                        AgentState::Respond
                    }
                }
                AgentState::Done => break,
            };
        }

        Ok(TurnOutcome {
            conversation,
            steps,
            end,
        })
    }

    /// Run every requested call concurrently; one result per request
    async fn act(&self, calls: &[ToolCallRequest]) -> Vec<Message> {
        let futs = calls.iter().map(|call| {
            let tools = Arc::clone(&self.tools);
            async move {
                tracing::info!(tool = %call.name, args = %call.arguments, "calling tool");
                let content = match tools.execute(&call.name, &call.arguments).await {
                    Ok(output) => output.into_content(),
                    Err(Error::UnknownTool(_)) => {
                        tracing::warn!(tool = %call.name, "model requested unknown tool");
                        format!("Error: Tool '{}' not found.", call.name)
                    }
                    Err(e) => {
                        tracing::warn!(tool = %call.name, error = %e, "tool failed");
                        format!("Error executing tool '{}': {e}", call.name)
                    }
                };
                Message::ToolResult {
                    call_id: call.id.clone(),
                    content,
                }
            }
        });

        futures::future::join_all(futs).await
    }
}
