//! Synthesis stage
//!
//! Keeps a websocket open to the streaming synthesis backend and turns text
//! increments into audio increments. Each turn's text is one utterance. The
//! backend ends its session once an utterance is final, so every utterance
//! that reaches its final frame gets a fresh connection and no text is ever
//! sent on a socket that is closing.

use std::collections::VecDeque;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use super::queue::{AudioItem, HandoffQueue, PipelineQueues, TextItem, TextKind, TurnId};
use crate::config::SynthesisConfig;
use crate::voice::tts::{self, ServerEvent};
use crate::{Error, Result};

/// How a connection ended without failing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// An utterance reached its final frame; the backend ends the session there
    Finished,
    /// The drain deadline passed; the socket was given up
    Abandoned,
    /// The text queue was closed
    Shutdown,
}

/// How an utterance ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UtteranceEnd {
    /// The backend sent its final frame
    Final,
    /// Nothing was sent, so no final frame is coming
    Empty,
    TimedOut,
    Shutdown,
}

/// Per-utterance bookkeeping
#[derive(Debug)]
struct UtteranceState {
    turn: TurnId,
    sent_text: bool,
    flushed: bool,
    stale: bool,
    /// Audio arrived for this utterance
    voiced: bool,
    /// Items taken for this utterance, replayed if the connection fails first
    consumed: Vec<TextItem>,
}

impl UtteranceState {
    const fn new(turn: TurnId) -> Self {
        Self {
            turn,
            sent_text: false,
            flushed: false,
            stale: false,
            voiced: false,
            consumed: Vec::new(),
        }
    }
}

/// The synthesis stage
pub struct SynthesisStage {
    config: SynthesisConfig,
    text: HandoffQueue<TextItem>,
    audio: HandoffQueue<AudioItem>,
    epoch: watch::Receiver<TurnId>,
    cancel: CancellationToken,
    /// Items to send before taking more from the text queue: a newer turn's
    /// first item, or an utterance retried after a failed connection
    pending: VecDeque<TextItem>,
}

impl SynthesisStage {
    #[must_use]
    pub fn new(
        config: SynthesisConfig,
        queues: &PipelineQueues,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            text: queues.text.clone(),
            audio: queues.audio.clone(),
            epoch: queues.epoch.subscribe(),
            cancel,
            pending: VecDeque::new(),
        }
    }

    /// Run the reconnect loop until cancelled
    pub async fn run(mut self) {
        let url = tts::stream_url(&self.config);
        let cancel = self.cancel.clone();
        tracing::info!(
            voice = %self.config.voice_id,
            model = %self.config.model_id,
            "synthesis stage started"
        );

        loop {
            let result = tokio::select! {
                () = cancel.cancelled() => break,
                result = self.session(&url) => result,
            };

            let backoff = match result {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Finished) => {
                    tracing::debug!("synthesis session finished, reconnecting");
                    false
                }
                Ok(SessionEnd::Abandoned) => {
                    tracing::warn!("synthesis drain timed out, reconnecting");
                    false
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        backoff_secs = self.config.reconnect_backoff.as_secs(),
                        "synthesis connection failed"
                    );
                    true
                }
            };

            if backoff {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(self.config.reconnect_backoff) => {}
                }
            }
        }

        tracing::info!("synthesis stage stopped");
    }

    fn current_turn(&self) -> TurnId {
        *self.epoch.borrow()
    }

    /// One connection: configure it, then serve utterances until one of them
    /// reaches the backend's final frame
    async fn session(&mut self, url: &str) -> Result<SessionEnd> {
        let (ws, _) = connect_async(url).await?;
        let (mut write, mut read) = ws.split();

        write
            .send(Message::Text(tts::config_frame(&self.config)?))
            .await?;
        tracing::debug!("synthesis connected");

        loop {
            let item = match self.pending.pop_front() {
                Some(item) => item,
                None => {
                    tokio::select! {
                        item = self.text.pop() => match item {
                            Some(item) => item,
                            None => return Ok(SessionEnd::Shutdown),
                        },
                        frame = read.next() => match frame {
                            Some(Ok(Message::Close(_))) | None => {
                                return Err(Error::Synthesis(
                                    "connection closed by server".to_string(),
                                ));
                            }
                            Some(Err(e)) => return Err(e.into()),
                            Some(Ok(_)) => continue,
                        },
                    }
                }
            };

            if item.turn < self.current_turn() {
                tracing::trace!(turn = item.turn, "dropping stale text");
                continue;
            }

            let mut state = UtteranceState::new(item.turn);
            let end = match self.utterance(item, &mut state, &mut write, &mut read).await {
                Ok(end) => end,
                Err(e) => {
                    self.recover(state);
                    return Err(e);
                }
            };

            match end {
                UtteranceEnd::Final => {
                    self.finish(&state);
                    return Ok(SessionEnd::Finished);
                }
                UtteranceEnd::Empty => self.finish(&state),
                UtteranceEnd::TimedOut => {
                    self.finish(&state);
                    return Ok(SessionEnd::Abandoned);
                }
                UtteranceEnd::Shutdown => return Ok(SessionEnd::Shutdown),
            }
        }
    }

    /// Stream one turn's text and collect its audio
    async fn utterance<W, R>(
        &mut self,
        first: TextItem,
        state: &mut UtteranceState,
        write: &mut W,
        read: &mut R,
    ) -> Result<UtteranceEnd>
    where
        W: Sink<Message, Error = tungstenite::Error> + Unpin,
        R: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
    {
        tracing::debug!(turn = state.turn, "utterance started");

        let drain = tokio::time::sleep(self.config.drain_timeout);
        tokio::pin!(drain);
        let mut draining = false;
        let mut epoch_open = true;

        self.feed(first, state, write).await?;

        loop {
            if state.flushed && !draining {
                if !state.sent_text {
                    return Ok(UtteranceEnd::Empty);
                }
                drain.as_mut().reset(Instant::now() + self.config.drain_timeout);
                draining = true;
            }

            if !state.flushed
                && let Some(item) = self.pending.pop_front()
            {
                self.feed(item, state, write).await?;
                continue;
            }

            tokio::select! {
                item = self.text.pop(), if !state.flushed => {
                    let Some(item) = item else {
                        return Ok(UtteranceEnd::Shutdown);
                    };
                    self.feed(item, state, write).await?;
                }
                changed = self.epoch.changed(), if !state.flushed && epoch_open => {
                    if changed.is_err() {
                        epoch_open = false;
                        continue;
                    }
                    if self.current_turn() > state.turn {
                        tracing::debug!(turn = state.turn, "utterance interrupted");
                        state.stale = true;
                        end_utterance(state, write).await?;
                    }
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if self.on_server_frame(&text, state) {
                            return Ok(UtteranceEnd::Final);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(Error::Synthesis(
                            "connection closed mid-utterance".to_string(),
                        ));
                    }
                    Some(Err(e)) => return Err(e.into()),
                    Some(Ok(_)) => {}
                },
                () = &mut drain, if draining => {
                    tracing::warn!(turn = state.turn, "no final frame before drain timeout");
                    return Ok(UtteranceEnd::TimedOut);
                }
            }
        }
    }

    /// Send one text item
    async fn feed<W>(
        &mut self,
        item: TextItem,
        state: &mut UtteranceState,
        write: &mut W,
    ) -> Result<()>
    where
        W: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        if item.turn > state.turn {
            // The old turn's end marker was drained by an interrupt
            tracing::debug!(turn = state.turn, next = item.turn, "utterance superseded");
            self.pending.push_front(item);
            state.stale = true;
            return end_utterance(state, write).await;
        }
        if item.turn < state.turn {
            return Ok(());
        }

        state.consumed.push(item.clone());
        match item.kind {
            TextKind::Text(text) => {
                if let Some(frame) = tts::text_frame(&text) {
                    write.send(Message::Text(frame)).await?;
                    state.sent_text = true;
                }
                Ok(())
            }
            TextKind::EndOfTurn => end_utterance(state, write).await,
        }
    }

    /// Handle a server frame; returns true once the utterance is final
    fn on_server_frame(&self, text: &str, state: &mut UtteranceState) -> bool {
        match tts::parse_server_frame(text) {
            Ok(ServerEvent::Audio(pcm)) => {
                state.voiced = true;
                if !state.stale {
                    self.forward(AudioItem::chunk(state.turn, pcm));
                }
                false
            }
            Ok(ServerEvent::Final) => state.flushed,
            Ok(ServerEvent::Failure(detail)) => {
                tracing::warn!(turn = state.turn, detail = %detail, "synthesis backend error");
                false
            }
            Ok(ServerEvent::Other) => false,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed synthesis frame");
                false
            }
        }
    }

    /// Hand an item to playback unless its turn has been superseded
    ///
    /// An interrupt bumps the epoch before draining the audio queue, so
    /// re-reading the epoch after the push catches an item that landed
    /// behind the drain.
    fn forward(&self, item: AudioItem) {
        let turn = item.turn;
        self.audio.push(item);

        let current = self.current_turn();
        if current > turn {
            let removed = self.audio.retain(|queued| queued.turn >= current);
            tracing::trace!(turn, removed, "dropped superseded audio");
        }
    }

    /// Close out a flushed turn downstream
    fn finish(&self, state: &UtteranceState) {
        if state.flushed && !state.stale {
            self.forward(AudioItem::end_of_turn(state.turn));
            tracing::debug!(turn = state.turn, "utterance finished");
        }
    }

    /// After a failed connection, queue the utterance again if none of it
    /// has been heard yet; otherwise close out what was heard
    fn recover(&mut self, state: UtteranceState) {
        if state.stale || state.voiced || state.turn < self.current_turn() {
            self.finish(&state);
            return;
        }

        tracing::debug!(
            turn = state.turn,
            items = state.consumed.len(),
            "retrying utterance on the next connection"
        );
        for item in state.consumed.into_iter().rev() {
            self.pending.push_front(item);
        }
    }
}

/// Tell the backend the utterance is complete
async fn end_utterance<W>(state: &mut UtteranceState, write: &mut W) -> Result<()>
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    if state.sent_text {
        write
            .send(Message::Text(tts::end_of_utterance_frame()))
            .await?;
    }
    state.flushed = true;
    Ok(())
}
