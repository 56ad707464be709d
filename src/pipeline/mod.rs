//! The voice pipeline
//!
//! Transcription feeds requests to the turn manager, which runs the agent and
//! streams its text to synthesis; synthesis streams audio to playback. Stages
//! talk only through [`HandoffQueue`]s, the interrupt channel and the turn
//! epoch.

mod chunker;
mod coordinator;
mod playback;
mod queue;
mod synthesis;
mod transcription;
mod turn;

pub use chunker::SentenceChunker;
pub use coordinator::{Coordinator, speak};
pub use playback::run_playback_stage;
pub use queue::{
    AudioItem, AudioKind, HandoffQueue, PipelineQueues, TextItem, TextKind, TurnId, Utterance,
};
pub use synthesis::SynthesisStage;
pub use transcription::{MicrophoneRecognizer, SpeechRecognizer, run_transcription_stage};
pub use turn::{APOLOGY, TurnManager};
