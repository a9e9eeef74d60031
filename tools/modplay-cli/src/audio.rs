//! Sound-card sink using cpal and a ring buffer
//!
//! The playback loop pushes PCM into the ring; the cpal callback drains it.
//! `write_audio` blocks while the ring is full, which paces synthesis to the
//! device.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use modplay_input::{Playback, SampleFormat};
use ringbuf::{
    HeapRb,
    traits::{Consumer, Observer, Producer, Split},
};
use tracing::{debug, error};

use crate::sinks::pcm_samples;

/// Ring buffer size in samples (~200ms of stereo at 44.1kHz)
const RING_BUFFER_SIZE: usize = 17640;

/// Wait between attempts to push into a full ring
const PUSH_RETRY: Duration = Duration::from_millis(5);

/// Longest wait for the device to play out the ring after the last frame
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

struct Output {
    producer: ringbuf::HeapProd<i16>,
    /// Kept alive for the duration of playback
    _stream: cpal::Stream,
}

/// Plays through the default output device
pub struct SpeakerSink {
    output: Option<Output>,
    failed: Arc<AtomicBool>,
    error: Option<anyhow::Error>,
    seek: Option<u32>,
}

impl SpeakerSink {
    pub fn new(seek: Option<u32>) -> Self {
        Self {
            output: None,
            failed: Arc::new(AtomicBool::new(false)),
            error: None,
            seek,
        }
    }

    /// Let the device play what is still buffered, then close it
    pub fn finish(mut self) -> Result<()> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        if let Some(output) = &self.output {
            let deadline = Instant::now() + DRAIN_TIMEOUT;
            while output.producer.occupied_len() > 0
                && !self.failed.load(Ordering::Relaxed)
                && Instant::now() < deadline
            {
                std::thread::sleep(PUSH_RETRY);
            }
        }
        Ok(())
    }

    fn open(&self, rate: u32, channels: u32) -> Result<Output> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .context("No audio output device available")?;
        let config = cpal::StreamConfig {
            channels: channels as u16,
            sample_rate: cpal::SampleRate(rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let ring = HeapRb::<i16>::new(RING_BUFFER_SIZE);
        let (producer, mut consumer) = ring.split();
        let mut pending: Vec<i16> = vec![0; 4096];
        let failed = Arc::clone(&self.failed);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if pending.len() < data.len() {
                        pending.resize(data.len(), 0);
                    }
                    let popped = consumer.pop_slice(&mut pending[..data.len()]);
                    for (out, &s) in data.iter_mut().zip(&pending[..popped]) {
                        *out = s as f32 / 32768.0;
                    }
                    data[popped..].fill(0.0);
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    failed.store(true, Ordering::Relaxed);
                },
                None,
            )
            .map_err(|e| anyhow!("Failed to build audio stream: {e}"))?;
        stream
            .play()
            .map_err(|e| anyhow!("Failed to play audio stream: {e}"))?;
        debug!(rate, channels, "audio stream started");

        Ok(Output {
            producer,
            _stream: stream,
        })
    }
}

impl Playback for SpeakerSink {
    fn open_audio(&mut self, _format: SampleFormat, rate: u32, channels: u32) {
        match self.open(rate, channels) {
            Ok(output) => self.output = Some(output),
            Err(e) => {
                error!(error = %e, "cannot open audio output");
                self.error = Some(e);
            }
        }
    }

    fn write_audio(&mut self, data: &[u8]) {
        let Some(output) = self.output.as_mut() else {
            return;
        };
        let samples = pcm_samples(data);
        let mut pushed = 0;
        while pushed < samples.len() {
            if self.failed.load(Ordering::Relaxed) {
                return;
            }
            pushed += output.producer.push_slice(&samples[pushed..]);
            if pushed < samples.len() {
                std::thread::sleep(PUSH_RETRY);
            }
        }
    }

    fn check_stop(&mut self) -> bool {
        self.error.is_some() || self.failed.load(Ordering::Relaxed)
    }

    fn check_seek(&mut self) -> Option<u32> {
        self.seek.take()
    }
}
