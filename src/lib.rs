//! Alfred - wake-word voice assistant
//!
//! This library provides the pieces of a hands-free assistant:
//! - Voice processing (capture, segmentation, wake word gating, STT, playback)
//! - A tool-using agent driven by a streaming chat model
//! - Streaming speech synthesis over a persistent websocket
//! - The pipeline that ties them together with barge-in
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐  utterance  ┌──────────────┐  text   ┌─────────────┐  audio  ┌──────────┐
//! │ Transcription ├────────────►│ Turn Manager ├────────►│  Synthesis  ├────────►│ Playback │
//! └───────┬───────┘             └──────┬───────┘         └─────────────┘         └──────────┘
//!         │        interrupt           │
//!         └───────────────────────────►│ Agent Loop ◄──► Tools
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod prompt;
pub mod tools;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::Coordinator;
