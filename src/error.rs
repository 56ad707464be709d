//! Error types for Alfred

use thiserror::Error;

/// Result type alias for Alfred operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Speech synthesis (streaming TTS) error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Agent / language model error
    #[error("agent error: {0}")]
    Agent(String),

    /// Tool invocation error
    #[error("tool error: {0}")]
    Tool(String),

    /// The model asked for a tool that isn't registered
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Capability not configured for this process
    #[error("{0} is not configured")]
    Unavailable(&'static str),

    /// Browser automation error
    #[error("browser error: {0}")]
    Browser(String),

    /// Conversation invariant violated
    #[error("conversation error: {0}")]
    Conversation(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
