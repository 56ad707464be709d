//! Audio playback to speakers

use std::collections::VecDeque;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::{Error, Result};

/// Sample rate for playback (matches the synthesis output format)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Destination for decoded audio
#[async_trait]
pub trait AudioSink: Send {
    /// Queue samples for playback, in order
    ///
    /// # Errors
    ///
    /// Returns error if the samples cannot be queued
    fn write(&mut self, samples: &[f32]) -> Result<()>;

    /// Drop everything queued but not yet played
    fn clear(&mut self);

    /// Wait until queued audio has played, at most `timeout`
    async fn drain(&mut self, timeout: Duration);
}

/// The default output device
///
/// Opened once; the cpal stream lives on a dedicated thread and pulls from a
/// shared sample buffer. Dropping the device stops the stream and releases
/// the hardware.
pub struct OutputDevice {
    buffer: Arc<Mutex<VecDeque<f32>>>,
    shutdown: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl OutputDevice {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if no suitable output device can be opened
    pub fn open() -> Result<Self> {
        let buffer = Arc::new(Mutex::new(VecDeque::new()));
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<()>>(1);
        let (shutdown, shutdown_rx) = std_mpsc::channel::<()>();

        let shared = Arc::clone(&buffer);
        let thread = std::thread::Builder::new()
            .name("alfred-playback".to_string())
            .spawn(move || {
                let stream = match build_output_stream(shared) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                let _ = shutdown_rx.recv();
                drop(stream);
                tracing::debug!("output device released");
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                buffer,
                shutdown: Some(shutdown),
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(Error::Audio("playback thread exited during startup".to_string())),
        }
    }

    /// Samples queued but not yet played
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.lock().map(|b| b.len()).unwrap_or_default()
    }
}

#[async_trait]
impl AudioSink for OutputDevice {
    fn write(&mut self, samples: &[f32]) -> Result<()> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| Error::Audio("playback buffer poisoned".to_string()))?;
        buffer.extend(samples.iter().copied());
        Ok(())
    }

    fn clear(&mut self) {
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.clear();
        }
    }

    async fn drain(&mut self, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.pending() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for OutputDevice {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn build_output_stream(buffer: Arc<Mutex<VecDeque<f32>>>) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let supported_config = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
        })
        .or_else(|| {
            // Fallback: try stereo
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
        })
        .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

    let config: StreamConfig = supported_config
        .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
        .config();
    let channels = usize::from(config.channels);

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = PLAYBACK_SAMPLE_RATE,
        channels,
        "audio playback initialized"
    );

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let Ok(mut buffer) = buffer.lock() else {
                    data.fill(0.0);
                    return;
                };
                for frame in data.chunks_mut(channels) {
                    let sample = buffer.pop_front().unwrap_or(0.0);
                    frame.fill(sample);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;
    Ok(stream)
}

/// Incremental decoder for signed 16-bit little-endian mono PCM
///
/// Chunks from the network may split a sample; the dangling byte is carried
/// into the next call.
#[derive(Debug, Default)]
pub struct Pcm16Decoder {
    carry: Option<u8>,
}

impl Pcm16Decoder {
    /// Decode bytes to f32 samples in [-1.0, 1.0)
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<f32> {
        let mut samples = Vec::with_capacity(bytes.len() / 2 + 1);
        let mut rest = bytes;

        if let Some(low) = self.carry.take() {
            match rest.split_first() {
                Some((&high, tail)) => {
                    samples.push(to_f32(i16::from_le_bytes([low, high])));
                    rest = tail;
                }
                None => {
                    self.carry = Some(low);
                    return samples;
                }
            }
        }

        let mut pairs = rest.chunks_exact(2);
        samples.extend(
            pairs
                .by_ref()
                .map(|pair| to_f32(i16::from_le_bytes([pair[0], pair[1]]))),
        );
        self.carry = pairs.remainder().first().copied();

        samples
    }

    /// Forget any carried byte
    pub const fn reset(&mut self) {
        self.carry = None;
    }
}

fn to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}
