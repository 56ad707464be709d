//! Turn manager
//!
//! Owns the lifecycle of a turn: barge-in, running the agent, chunking its
//! text into the text queue and closing the turn with exactly one
//! end-of-turn marker.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::chunker::SentenceChunker;
use super::queue::{PipelineQueues, TextItem, TurnId, Utterance};
use crate::{Config, Result};
use crate::agent::{AgentLoop, Conversation, TurnOutcome};
use crate::prompt::system_prompt;

/// Spoken when the agent can't produce an answer
pub const APOLOGY: &str = "My apologies, sir, I'm unable to answer that at the moment.";

/// Request that shuts the assistant down
const EXIT_COMMAND: &str = "exit";

/// Buffered deltas between the agent task and the manager
const DELTA_BUFFER: usize = 64;

/// How a turn stopped forwarding output
enum TurnStop {
    /// The agent finished; the end-of-turn marker was pushed
    Completed,
    /// A newer request arrived and takes over
    Preempted(Utterance),
    /// The pipeline is shutting down
    Shutdown,
}

/// Drives turns from the intake queue to the text queue
pub struct TurnManager {
    agent: AgentLoop,
    config: Arc<Config>,
    queues: PipelineQueues,
    interrupts: mpsc::UnboundedReceiver<()>,
    cancel: CancellationToken,
}

impl TurnManager {
    #[must_use]
    pub const fn new(
        agent: AgentLoop,
        config: Arc<Config>,
        queues: PipelineQueues,
        interrupts: mpsc::UnboundedReceiver<()>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            agent,
            config,
            queues,
            interrupts,
            cancel,
        }
    }

    /// Run until cancelled or the intake queue closes
    pub async fn run(mut self) {
        tracing::info!("turn manager started");

        let mut next = None;
        loop {
            let utterance = match next.take() {
                Some(utterance) => utterance,
                None => {
                    let popped = tokio::select! {
                        () = self.cancel.cancelled() => break,
                        popped = self.queues.intake.pop() => popped,
                    };
                    let Some(utterance) = popped else { break };
                    utterance
                }
            };

            match self.run_turn(utterance).await {
                TurnStop::Completed => {}
                TurnStop::Preempted(newer) => next = Some(newer),
                TurnStop::Shutdown => break,
            }
        }

        tracing::info!("turn manager stopped");
    }

    /// Cut off whatever is in flight and start a new turn
    ///
    /// Returns the new turn id and the request to answer, which is the newest
    /// one waiting in the intake queue if there is any.
    fn interrupt(&mut self, utterance: Utterance) -> (TurnId, Utterance) {
        let turn = self.queues.current_turn() + 1;
        self.queues.epoch.send_replace(turn);

        let text = self.queues.text.drain();
        let audio = self.queues.audio.drain();
        let newer = self.queues.intake.drain_latest();
        while self.interrupts.try_recv().is_ok() {}

        tracing::debug!(turn, text, audio, newer = newer.is_some(), "interrupted");
        (turn, newer.unwrap_or(utterance))
    }

    async fn run_turn(&mut self, utterance: Utterance) -> TurnStop {
        let (turn, utterance) = self.interrupt(utterance);

        if utterance.text.trim().eq_ignore_ascii_case(EXIT_COMMAND) {
            tracing::info!("exit requested");
            self.cancel.cancel();
            return TurnStop::Shutdown;
        }

        tracing::info!(turn, request = %utterance.text, "turn started");

        let prompt = system_prompt(&self.config, chrono::Local::now().date_naive());
        let conversation = Conversation::new(prompt, utterance.text);
        let (delta_tx, mut deltas) = mpsc::channel(DELTA_BUFFER);
        let agent = self.agent.clone();
        let task = tokio::spawn(async move { agent.run(conversation, delta_tx).await });

        let mut chunker = SentenceChunker::new();
        let mut produced = 0usize;
        let mut interrupts_open = true;

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    // Agent task is detached; its output has nowhere to go
                    return TurnStop::Shutdown;
                }
                signal = self.interrupts.recv(), if interrupts_open => {
                    if signal.is_none() {
                        interrupts_open = false;
                        continue;
                    }
                    if let Some(newer) = self.queues.intake.drain_latest() {
                        tracing::info!(turn, "turn preempted");
                        return TurnStop::Preempted(newer);
                    }
                }
                delta = deltas.recv() => {
                    let Some(delta) = delta else { break };
                    for chunk in chunker.push(&delta) {
                        self.queues.text.push(TextItem::text(turn, chunk));
                        produced += 1;
                    }
                }
            }
        }

        let succeeded = agent_succeeded(turn, task).await;
        if let Some(rest) = chunker.finish() {
            self.queues.text.push(TextItem::text(turn, rest));
            produced += 1;
        }
        if !succeeded {
            self.queues.text.push(TextItem::text(turn, APOLOGY));
            produced += 1;
        }

        if produced == 0 {
            tracing::warn!(turn, "turn produced no text");
        }
        self.queues.text.push(TextItem::end_of_turn(turn));
        tracing::info!(turn, increments = produced, "turn finished");

        TurnStop::Completed
    }
}

async fn agent_succeeded(turn: TurnId, task: JoinHandle<Result<TurnOutcome>>) -> bool {
    match task.await {
        Ok(Ok(outcome)) => {
            tracing::debug!(
                turn,
                steps = outcome.steps,
                end = ?outcome.end,
                messages = outcome.conversation.len(),
                "agent finished"
            );
            true
        }
        Ok(Err(e)) => {
            tracing::error!(turn, error = %e, "agent failed");
            false
        }
        Err(e) => {
            tracing::error!(turn, error = %e, "agent task panicked");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::Error;
    use crate::agent::{AssistantReply, LanguageModel};
    use crate::pipeline::queue::TextKind;
    use crate::tools::{ToolExecutor, ToolOutput, ToolSchema};

    struct Echo;

    #[async_trait]
    impl LanguageModel for Echo {
        async fn respond(
            &self,
            _conversation: &Conversation,
            _tools: &[ToolSchema],
            deltas: &mpsc::Sender<String>,
        ) -> Result<AssistantReply> {
            for part in ["Very good", ", sir. ", "Right away."] {
                let _ = deltas.send(part.to_string()).await;
            }
            Ok(AssistantReply {
                text: "Very good, sir. Right away.".to_string(),
                tool_calls: Vec::new(),
            })
        }
    }

    struct Broken;

    #[async_trait]
    impl LanguageModel for Broken {
        async fn respond(
            &self,
            _conversation: &Conversation,
            _tools: &[ToolSchema],
            _deltas: &mpsc::Sender<String>,
        ) -> Result<AssistantReply> {
            Err(Error::Agent("model unavailable".to_string()))
        }
    }

    struct NoTools;

    #[async_trait]
    impl ToolExecutor for NoTools {
        fn schemas(&self) -> Vec<ToolSchema> {
            Vec::new()
        }

        async fn execute(&self, name: &str, _arguments: &str) -> Result<ToolOutput> {
            Err(Error::UnknownTool(name.to_string()))
        }
    }

    fn manager(
        model: Arc<dyn LanguageModel>,
    ) -> (TurnManager, PipelineQueues, CancellationToken) {
        let queues = PipelineQueues::new();
        let cancel = CancellationToken::new();
        let (_tx, rx) = mpsc::unbounded_channel();
        let agent = AgentLoop::new(model, Arc::new(NoTools), 8);
        let manager = TurnManager::new(
            agent,
            Arc::new(Config::default()),
            queues.clone(),
            rx,
            cancel.clone(),
        );
        (manager, queues, cancel)
    }

    async fn collect_turn(queues: &PipelineQueues) -> Vec<TextItem> {
        let mut items = Vec::new();
        loop {
            let item = tokio::time::timeout(Duration::from_secs(2), queues.text.pop())
                .await
                .unwrap()
                .unwrap();
            let done = item.kind == TextKind::EndOfTurn;
            items.push(item);
            if done {
                return items;
            }
        }
    }

    #[tokio::test]
    async fn turn_ends_with_single_marker() {
        let (manager, queues, cancel) = manager(Arc::new(Echo));
        let handle = tokio::spawn(manager.run());

        queues.intake.push(Utterance {
            text: "fetch the car".to_string(),
        });
        let items = collect_turn(&queues).await;

        assert_eq!(
            items,
            vec![
                TextItem::text(1, "Very good, sir."),
                TextItem::text(1, "Right away."),
                TextItem::end_of_turn(1),
            ]
        );

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn failed_agent_apologizes() {
        let (manager, queues, cancel) = manager(Arc::new(Broken));
        let handle = tokio::spawn(manager.run());

        queues.intake.push(Utterance {
            text: "anything".to_string(),
        });
        let items = collect_turn(&queues).await;

        assert_eq!(
            items,
            vec![TextItem::text(1, APOLOGY), TextItem::end_of_turn(1)]
        );

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn exit_request_cancels_pipeline() {
        let (manager, queues, cancel) = manager(Arc::new(Echo));
        let handle = tokio::spawn(manager.run());

        queues.intake.push(Utterance {
            text: "Exit".to_string(),
        });

        tokio::time::timeout(Duration::from_secs(2), cancel.cancelled())
            .await
            .unwrap();
        handle.await.unwrap();
        assert!(queues.text.is_empty());
    }
}
