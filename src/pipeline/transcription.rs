//! Transcription stage
//!
//! Turns microphone audio into wake-word-gated requests. Accepted requests
//! go onto the intake queue and raise an interrupt so any reply in progress
//! is cut short.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::queue::{HandoffQueue, Utterance};
use crate::voice::{
    Gate, MicrophoneStream, SpeechSegmenter, SpeechToText, WakeWord, samples_to_wav,
};
use crate::{Error, Result};

/// A source of complete, recognized utterances
#[async_trait]
pub trait SpeechRecognizer: Send {
    /// Wait until the next utterance has been recognized
    async fn next_utterance(&mut self) -> Result<String>;
}

/// Microphone capture, energy segmentation and remote transcription
pub struct MicrophoneRecognizer {
    microphone: MicrophoneStream,
    segmenter: SpeechSegmenter,
    stt: SpeechToText,
}

impl MicrophoneRecognizer {
    #[must_use]
    pub const fn new(microphone: MicrophoneStream, stt: SpeechToText) -> Self {
        Self {
            microphone,
            segmenter: SpeechSegmenter::new(),
            stt,
        }
    }
}

#[async_trait]
impl SpeechRecognizer for MicrophoneRecognizer {
    async fn next_utterance(&mut self) -> Result<String> {
        loop {
            let block = self
                .microphone
                .recv()
                .await
                .ok_or_else(|| Error::Audio("microphone stream ended".to_string()))?;

            let Some(segment) = self.segmenter.push(&block) else {
                continue;
            };

            let wav = samples_to_wav(&segment, self.microphone.sample_rate())?;
            let text = self.stt.transcribe(&wav).await?;
            let text = text.trim();
            if text.is_empty() {
                tracing::trace!("empty transcription");
                continue;
            }
            return Ok(text.to_string());
        }
    }
}

/// Run the transcription stage until cancelled
///
/// Recognition errors are logged and retried after `retry_delay`; they never
/// end the stage.
pub async fn run_transcription_stage<R: SpeechRecognizer>(
    mut recognizer: R,
    wake_word: WakeWord,
    intake: HandoffQueue<Utterance>,
    interrupts: mpsc::UnboundedSender<()>,
    retry_delay: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(wake_word = wake_word.token(), "transcription stage started");

    loop {
        let result = tokio::select! {
            () = cancel.cancelled() => break,
            result = recognizer.next_utterance() => result,
        };

        let transcript = match result {
            Ok(transcript) => transcript,
            Err(e) => {
                tracing::warn!(error = %e, "speech recognition failed, retrying");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(retry_delay) => {}
                }
                continue;
            }
        };

        match wake_word.gate(&transcript) {
            Gate::Command(text) => {
                tracing::info!(request = %text, "wake word heard");
                intake.push(Utterance { text });
                if interrupts.send(()).is_err() {
                    tracing::debug!("turn manager gone, interrupt not delivered");
                }
            }
            Gate::WakeOnly => {
                tracing::debug!("wake word without a request, ignoring");
            }
            Gate::Ignored => {
                tracing::trace!(transcript = %transcript, "no wake word");
            }
        }
    }

    tracing::info!("transcription stage stopped");
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    /// Replays scripted results, then waits forever
    struct Scripted(VecDeque<Result<String>>);

    #[async_trait]
    impl SpeechRecognizer for Scripted {
        async fn next_utterance(&mut self) -> Result<String> {
            match self.0.pop_front() {
                Some(result) => result,
                None => std::future::pending().await,
            }
        }
    }

    #[tokio::test]
    async fn gates_and_signals_interrupts() {
        let recognizer = Scripted(VecDeque::from([
            Ok("Alfred, what's the weather today?".to_string()),
            Ok("what's the weather today?".to_string()),
            Err(Error::Stt("transient".to_string())),
            Ok("alfred".to_string()),
            Ok("ALFRED turn off the lights".to_string()),
        ]));
        let intake = HandoffQueue::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let stage = tokio::spawn(run_transcription_stage(
            recognizer,
            WakeWord::new("alfred"),
            intake.clone(),
            tx,
            Duration::from_millis(5),
            cancel.clone(),
        ));

        let first = intake.pop().await.unwrap();
        assert_eq!(first.text, "what's the weather today?");
        let second = intake.pop().await.unwrap();
        assert_eq!(second.text, "turn off the lights");

        cancel.cancel();
        stage.await.unwrap();

        assert!(intake.is_empty());
        let mut signals = 0;
        while rx.try_recv().is_ok() {
            signals += 1;
        }
        assert_eq!(signals, 2);
    }
}
