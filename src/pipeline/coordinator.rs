//! Pipeline coordinator
//!
//! Pre-flight checks, wiring of the four stages, and process-wide start and
//! stop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use super::chunker::SentenceChunker;
use super::playback::run_playback_stage;
use super::queue::{AudioKind, PipelineQueues, TextItem};
use super::synthesis::SynthesisStage;
use super::transcription::{MicrophoneRecognizer, run_transcription_stage};
use super::turn::TurnManager;
use crate::agent::{AgentLoop, OpenAiChat};
use crate::config::SynthesisConfig;
use crate::tools::{
    BrowserHandle, BrowserSessionConfig, ToolRegistry, launch_browser, load_access_token,
};
use crate::voice::{
    AudioSink, MicrophoneStream, OutputDevice, Pcm16Decoder, SpeechToText, WakeWord, tts,
};
use crate::{Config, Error, Result};

/// Upper bound on waiting for a one-off utterance's audio
const SPEAK_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on letting a one-off utterance finish playing
const SPEAK_DRAIN: Duration = Duration::from_secs(30);

/// Owns the running pipeline
pub struct Coordinator {
    config: Arc<Config>,
    cancel: CancellationToken,
}

impl Coordinator {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the pipeline when cancelled
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the pipeline until Ctrl-C, an `exit` request or a stage failure
    ///
    /// # Errors
    ///
    /// Returns error if a required service is not configured or the
    /// microphone can't be opened
    pub async fn run(self) -> Result<()> {
        let config = &self.config;
        config.warn_missing_credentials();

        let model = OpenAiChat::new(&config.llm)?;
        let stt = SpeechToText::new(&config.stt)?;
        tts::config_frame(&config.synthesis)?;

        let browser = preflight_browser(config).await;
        let google_token = load_access_token(&config.tools);
        if google_token.is_none() {
            tracing::warn!("no Google credentials - mail and calendar will not be available");
        }

        let registry = ToolRegistry::from_config(
            &config.tools,
            google_token,
            browser.as_ref().map(|(handle, _)| handle.clone()),
        );
        let agent = AgentLoop::new(
            Arc::new(model),
            Arc::new(registry),
            config.llm.max_tool_steps,
        );

        let microphone = match MicrophoneStream::open() {
            Ok(microphone) => microphone,
            Err(e) => {
                shutdown_browser(browser).await;
                return Err(e);
            }
        };

        let queues = PipelineQueues::new();
        let (interrupt_tx, interrupt_rx) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();

        tasks.spawn(run_transcription_stage(
            MicrophoneRecognizer::new(microphone, stt),
            WakeWord::new(&config.wake_word),
            queues.intake.clone(),
            interrupt_tx,
            config.stt.retry_delay,
            self.cancel.clone(),
        ));

        tasks.spawn(
            TurnManager::new(
                agent,
                Arc::clone(config),
                queues.clone(),
                interrupt_rx,
                self.cancel.clone(),
            )
            .run(),
        );

        tasks.spawn(
            SynthesisStage::new(config.synthesis.clone(), &queues, self.cancel.clone()).run(),
        );

        let audio = queues.audio.clone();
        let epoch = queues.epoch.subscribe();
        let drain_timeout = config.synthesis.drain_timeout;
        let cancel = self.cancel.clone();
        tasks.spawn(async move {
            match OutputDevice::open() {
                Ok(device) => {
                    run_playback_stage(device, audio, epoch, drain_timeout, cancel).await;
                }
                Err(e) => tracing::error!(error = %e, "no audio output device, playback disabled"),
            }
        });

        tracing::info!("alfred ready - say \"{}\"", config.wake_word);

        tokio::select! {
            () = self.cancel.cancelled() => {}
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "failed to listen for Ctrl-C");
                }
                tracing::info!("shutting down");
            }
            Some(result) = tasks.join_next() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "pipeline stage panicked");
                }
                tracing::warn!("a pipeline stage stopped, shutting down");
            }
        }

        self.cancel.cancel();
        queues.close_all();
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "pipeline stage panicked");
            }
        }

        shutdown_browser(browser).await;
        tracing::info!("alfred stopped");
        Ok(())
    }
}

async fn preflight_browser(config: &Config) -> Option<(BrowserHandle, JoinHandle<()>)> {
    if !config.tools.browser_enabled {
        tracing::info!("browser disabled");
        return None;
    }

    let session = BrowserSessionConfig {
        headless: config.tools.browser_headless,
        ..BrowserSessionConfig::default()
    };
    match launch_browser(session).await {
        Ok(browser) => Some(browser),
        Err(e) => {
            tracing::warn!(error = %e, "browser unavailable - navigation tools disabled");
            None
        }
    }
}

async fn shutdown_browser(browser: Option<(BrowserHandle, JoinHandle<()>)>) {
    if let Some((handle, session)) = browser {
        handle.close().await;
        if let Err(e) = session.await {
            tracing::warn!(error = %e, "browser session task failed");
        }
    }
}

/// Synthesize `text` once and play it on `sink`
///
/// Runs a private synthesis stage for a single turn; useful for checking the
/// synthesis credentials and the output device.
///
/// # Errors
///
/// Returns error if synthesis isn't configured, audio can't be written, or no
/// audio arrives in time
pub async fn speak<S: AudioSink>(
    config: &SynthesisConfig,
    text: &str,
    sink: &mut S,
) -> Result<()> {
    tts::config_frame(config)?;

    let queues = PipelineQueues::new();
    let turn = 1;
    queues.epoch.send_replace(turn);

    let mut chunker = SentenceChunker::new();
    for chunk in chunker.push(text).into_iter().chain(chunker.finish()) {
        queues.text.push(TextItem::text(turn, chunk));
    }
    queues.text.push(TextItem::end_of_turn(turn));

    let cancel = CancellationToken::new();
    let stage = tokio::spawn(SynthesisStage::new(config.clone(), &queues, cancel.clone()).run());

    let mut decoder = Pcm16Decoder::default();
    let mut samples = 0usize;
    let received = tokio::time::timeout(SPEAK_TIMEOUT, async {
        while let Some(item) = queues.audio.pop().await {
            match item.kind {
                AudioKind::Chunk(pcm) => {
                    let decoded = decoder.decode(&pcm);
                    samples += decoded.len();
                    sink.write(&decoded)?;
                }
                AudioKind::EndOfTurn => break,
            }
        }
        Ok::<(), Error>(())
    })
    .await;

    cancel.cancel();
    queues.close_all();
    if let Err(e) = stage.await {
        tracing::warn!(error = %e, "synthesis stage failed");
    }

    received.map_err(|_| Error::Synthesis("timed out waiting for audio".to_string()))??;
    tracing::debug!(samples, "utterance synthesized");

    sink.drain(SPEAK_DRAIN).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    #[tokio::test]
    async fn run_fails_fast_without_credentials() {
        let coordinator = Coordinator::new(Config::default());
        let token = coordinator.shutdown_token();
        let err = coordinator.run().await.unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
        assert!(!token.is_cancelled());

        let mut config = Config::default();
        config.llm.api_key = Some(SecretString::from("sk-test".to_string()));
        config.stt.api_key = Some(SecretString::from("sk-test".to_string()));
        let err = Coordinator::new(config).run().await.unwrap_err();
        assert!(matches!(err, Error::Unavailable("synthesis API key")));
    }
}
