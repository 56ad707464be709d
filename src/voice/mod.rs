//! Voice processing module
//!
//! Handles microphone capture, speech segmentation, wake word gating,
//! transcription, the streaming synthesis protocol and playback.

mod capture;
mod playback;
mod stt;
pub mod tts;
mod vad;
mod wake_word;

pub use capture::{MicrophoneStream, SAMPLE_RATE, samples_to_wav};
pub use playback::{AudioSink, OutputDevice, PLAYBACK_SAMPLE_RATE, Pcm16Decoder};
pub use stt::SpeechToText;
pub use vad::{SegmenterState, SpeechSegmenter, calculate_energy};
pub use wake_word::{Gate, WakeWord};
