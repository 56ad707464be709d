//! Tool executor seam between the agent loop and capabilities

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::Result;

/// Declared schema of one capability, as advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: Value,
}

/// What a capability returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutput {
    Text(String),
    Lines(Vec<String>),
}

impl ToolOutput {
    /// Render as tool-result content
    #[must_use]
    pub fn into_content(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Lines(lines) => lines.join("\n"),
        }
    }
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// Executes tool calls by name
///
/// An unknown name must fail with `Error::UnknownTool` so the caller can
/// report it distinctly from a failed invocation.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Schemas for every capability the executor can run
    fn schemas(&self) -> Vec<ToolSchema>;

    /// Run one call with the model's raw JSON arguments
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownTool` for unknown names, any other error for a
    /// failed invocation
    async fn execute(&self, name: &str, arguments: &str) -> Result<ToolOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_join_with_newlines() {
        let output = ToolOutput::Lines(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(output.into_content(), "a\nb");
        assert_eq!(ToolOutput::from("x".to_string()).into_content(), "x");
    }
}
