//! Playback stage

use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::queue::{AudioItem, AudioKind, HandoffQueue, TurnId};
use crate::voice::{AudioSink, Pcm16Decoder};

/// Write audio increments to the sink in arrival order until cancelled
///
/// Items from turns older than the current epoch are dropped, and the sink is
/// cleared whenever the epoch moves so barge-in silences speech at once. On
/// exit the sink is drained for at most `drain_timeout` before it is dropped.
pub async fn run_playback_stage<S: AudioSink>(
    mut sink: S,
    audio: HandoffQueue<AudioItem>,
    mut epoch: watch::Receiver<TurnId>,
    drain_timeout: Duration,
    cancel: CancellationToken,
) {
    tracing::info!("playback stage started");

    let mut decoder = Pcm16Decoder::default();
    let mut epoch_open = true;

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,
            changed = epoch.changed(), if epoch_open => {
                if changed.is_err() {
                    epoch_open = false;
                    continue;
                }
                sink.clear();
                decoder.reset();
                tracing::debug!(turn = *epoch.borrow_and_update(), "playback cleared");
            }
            item = audio.pop() => {
                let Some(item) = item else { break };
                if item.turn < *epoch.borrow() {
                    continue;
                }
                match item.kind {
                    AudioKind::Chunk(pcm) => {
                        let samples = decoder.decode(&pcm);
                        if let Err(e) = sink.write(&samples) {
                            tracing::warn!(turn = item.turn, error = %e, "audio write failed");
                        }
                    }
                    AudioKind::EndOfTurn => {
                        decoder.reset();
                        tracing::debug!(turn = item.turn, "turn audio complete");
                    }
                }
            }
        }
    }

    sink.drain(drain_timeout).await;
    tracing::info!("playback stage stopped");
}
