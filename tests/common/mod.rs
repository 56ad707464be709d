//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use alfred::agent::{AssistantReply, Conversation, LanguageModel, ToolCallRequest};
use alfred::tools::{ToolExecutor, ToolOutput, ToolSchema};
use alfred::voice::SAMPLE_RATE;
use alfred::{Error, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Generate sine wave audio samples
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn generate_silence(duration_secs: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

/// A model step: text deltas to stream, then tool calls to request
#[derive(Debug, Clone, Default)]
pub struct Step {
    pub deltas: Vec<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl Step {
    pub fn say(text: &str) -> Self {
        Self {
            deltas: vec![text.to_string()],
            tool_calls: Vec::new(),
        }
    }

    pub fn call(calls: &[(&str, &str, &str)]) -> Self {
        Self {
            deltas: Vec::new(),
            tool_calls: calls
                .iter()
                .map(|(id, name, args)| ToolCallRequest {
                    id: (*id).to_string(),
                    name: (*name).to_string(),
                    arguments: (*args).to_string(),
                })
                .collect(),
        }
    }
}

/// Model that replays scripted steps and records every conversation it saw
#[derive(Default)]
pub struct ScriptedModel {
    steps: Mutex<VecDeque<Step>>,
    /// When the script runs out, keep repeating the last step
    repeat_last: bool,
    last: Mutex<Option<Step>>,
    pub seen: Mutex<Vec<Conversation>>,
}

impl ScriptedModel {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            ..Self::default()
        }
    }

    pub fn repeating(step: Step) -> Self {
        Self {
            repeat_last: true,
            last: Mutex::new(Some(step)),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn respond(
        &self,
        conversation: &Conversation,
        _tools: &[ToolSchema],
        deltas: &mpsc::Sender<String>,
    ) -> Result<AssistantReply> {
        self.seen.lock().unwrap().push(conversation.clone());

        let round = self.calls();
        let next = self.steps.lock().unwrap().pop_front();
        let step = match next {
            Some(step) => step,
            None if self.repeat_last => {
                let mut step = self.last.lock().unwrap().clone().unwrap_or_default();
                // Call ids must stay unique across the conversation
                for call in &mut step.tool_calls {
                    call.id = format!("{}-{round}", call.id);
                }
                step
            }
            None => return Err(Error::Agent("script exhausted".to_string())),
        };

        let mut text = String::new();
        for delta in &step.deltas {
            text.push_str(delta);
            let _ = deltas.send(delta.clone()).await;
        }

        Ok(AssistantReply {
            text,
            tool_calls: step.tool_calls,
        })
    }
}

/// Tool executor with a fixed set of tools that echo their arguments
pub struct EchoTools {
    names: Vec<&'static str>,
    pub invoked: Mutex<Vec<String>>,
}

impl EchoTools {
    pub fn new(names: &[&'static str]) -> Self {
        Self {
            names: names.to_vec(),
            invoked: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ToolExecutor for EchoTools {
    fn schemas(&self) -> Vec<ToolSchema> {
        self.names
            .iter()
            .map(|name| ToolSchema {
                name: (*name).to_string(),
                description: format!("{name} tool"),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            })
            .collect()
    }

    async fn execute(&self, name: &str, arguments: &str) -> Result<ToolOutput> {
        if !self.names.contains(&name) {
            return Err(Error::UnknownTool(name.to_string()));
        }
        self.invoked.lock().unwrap().push(name.to_string());
        if name == "failing" {
            return Err(Error::Tool("backend down".to_string()));
        }
        Ok(ToolOutput::Text(format!("{name}: {arguments}")))
    }
}
