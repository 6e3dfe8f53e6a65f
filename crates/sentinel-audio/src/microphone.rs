//! Live capture from a cpal input device.
//!
//! cpal streams are not `Send` on every platform, so the stream is opened,
//! drained and dropped on one dedicated thread. The device callback pushes
//! mono f32 samples into a ring buffer; the capture loop drains it, resamples
//! to 16 kHz and slices exact 100 ms chunks.

use crate::chunk::{AudioChunk, CHUNK_BYTES, SAMPLE_RATE_HZ};
use crate::error::AudioError;
use crate::pcm;
use crate::source::{AudioSource, ChunkSink};
use async_trait::async_trait;
use cpal::Sample as _;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer as _, Producer as _, Split as _},
};
use rubato::{FastFixedIn, Resampler};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::{runtime::Handle, sync::oneshot, sync::watch};
use tracing::{debug, error, info, warn};

/// How long the capture loop sleeps when the ring buffer is empty.
const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Ring buffer capacity, in seconds of device audio.
const RING_SECONDS: usize = 2;
/// Resampler input block, in device frames (10 ms).
const RESAMPLE_BLOCK_DIVISOR: usize = 100;

/// Captures microphone audio from the named input device, or the host default.
pub struct MicrophoneSource {
    device: Option<String>,
    worker: Option<CaptureWorker>,
}

struct CaptureWorker {
    cancel: watch::Sender<bool>,
    thread: JoinHandle<()>,
}

impl MicrophoneSource {
    pub fn new(device: Option<String>) -> Self {
        Self {
            device,
            worker: None,
        }
    }

    /// Names of the input devices the default host exposes.
    pub fn list_devices() -> Result<Vec<String>, AudioError> {
        let host = cpal::default_host();
        Ok(host
            .input_devices()?
            .filter_map(|device| device.name().ok())
            .collect())
    }
}

#[async_trait]
impl AudioSource for MicrophoneSource {
    async fn start(&mut self, sink: Arc<dyn ChunkSink>) -> Result<(), AudioError> {
        self.stop().await;

        let (cancel, cancel_rx) = watch::channel(false);
        let (ready_tx, ready_rx) = oneshot::channel();
        let device = self.device.clone();
        let runtime = Handle::current();

        let thread = std::thread::Builder::new()
            .name("sentinel-capture".to_string())
            .spawn(move || capture_thread(device, sink, runtime, cancel_rx, ready_tx))
            .map_err(|_| AudioError::WorkerGone)?;

        match ready_rx.await {
            Ok(Ok(())) => {
                self.worker = Some(CaptureWorker { cancel, thread });
                Ok(())
            }
            Ok(Err(e)) => {
                join_thread(thread).await;
                Err(e)
            }
            Err(_) => {
                join_thread(thread).await;
                Err(AudioError::WorkerGone)
            }
        }
    }

    async fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = worker.cancel.send(true);
        join_thread(worker.thread).await;
        info!("Microphone capture stopped");
    }

    fn is_active(&self) -> bool {
        self.worker.is_some()
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

async fn join_thread(thread: JoinHandle<()>) {
    match tokio::task::spawn_blocking(move || thread.join()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => error!("Capture thread panicked"),
        Err(e) => error!(error = %e, "Failed to join capture thread"),
    }
}

fn open_device(name: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .input_devices()?
            .find(|device| device.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| AudioError::DeviceNotFound(name.to_string())),
        None => host.default_input_device().ok_or(AudioError::NoInputDevice),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut producer: HeapProd<f32>,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    let channels = config.channels as usize;
    // Reused across callbacks; only grows until it fits the device block.
    let mut samples: Vec<f32> = Vec::new();
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let dropped = push_mono(data, channels, &mut samples, &mut producer);
            if dropped > 0 {
                debug!(dropped, "Capture ring buffer full");
            }
        },
        |err| warn!(error = %err, "Input stream error"),
        None,
    )?;
    Ok(stream)
}

/// Down-mixes one device block into the ring, returning how many frames did not fit.
/// Runs on the audio callback thread, so it only reuses `samples`.
fn push_mono<T>(data: &[T], channels: usize, samples: &mut Vec<f32>, producer: &mut HeapProd<f32>) -> usize
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    samples.clear();
    samples.extend(data.iter().map(|&s| s.to_sample::<f32>()));
    let mono = pcm::downmix_to_mono(samples, channels);
    let frames = mono.len();
    frames - producer.push_iter(mono)
}

/// Opens the device and starts the stream, returning it with the ring consumer and device rate.
fn open_stream(device: Option<&str>) -> Result<(cpal::Stream, HeapCons<f32>, u32), AudioError> {
    let device = open_device(device)?;
    let supported = device.default_input_config()?;
    let sample_rate = supported.sample_rate().0;
    let config: cpal::StreamConfig = supported.config();

    let ring = HeapRb::<f32>::new(sample_rate as usize * RING_SECONDS);
    let (producer, consumer) = ring.split();

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, producer)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, producer)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, producer)?,
        other => return Err(AudioError::UnsupportedFormat(format!("{other:?}"))),
    };
    stream.play()?;

    info!(
        device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
        sample_rate,
        channels = config.channels,
        "Microphone capture started"
    );
    Ok((stream, consumer, sample_rate))
}

fn capture_thread(
    device: Option<String>,
    sink: Arc<dyn ChunkSink>,
    runtime: Handle,
    cancel: watch::Receiver<bool>,
    ready: oneshot::Sender<Result<(), AudioError>>,
) {
    let opened = open_stream(device.as_deref()).and_then(|(stream, consumer, rate)| {
        let resampler = if rate == SAMPLE_RATE_HZ {
            None
        } else {
            Some(pcm::create_resampler(rate, (rate as usize / RESAMPLE_BLOCK_DIVISOR).max(1))?)
        };
        Ok((stream, consumer, resampler))
    });

    let (stream, consumer, resampler) = match opened {
        Ok(parts) => parts,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }

    let mut chunker = Chunker::new(consumer, resampler);
    while !*cancel.borrow() {
        match chunker.next_chunk() {
            Some(chunk) => runtime.block_on(sink.push(chunk)),
            None => std::thread::sleep(POLL_INTERVAL),
        }
    }

    drop(stream);
    debug!("Capture thread exited");
}

/// Turns the device-rate sample stream into 16 kHz PCM16 chunks.
struct Chunker {
    consumer: HeapCons<f32>,
    resampler: Option<FastFixedIn<f32>>,
    scratch: Vec<f32>,
    pending: Vec<f32>,
    pcm: Vec<u8>,
}

impl Chunker {
    fn new(consumer: HeapCons<f32>, resampler: Option<FastFixedIn<f32>>) -> Self {
        Self {
            consumer,
            resampler,
            scratch: vec![0.0; 4096],
            pending: Vec::new(),
            pcm: Vec::with_capacity(CHUNK_BYTES * 2),
        }
    }

    /// Returns the next full chunk, or `None` once the buffered audio is exhausted.
    fn next_chunk(&mut self) -> Option<AudioChunk> {
        while self.pcm.len() < CHUNK_BYTES {
            let read = self.consumer.pop_slice(&mut self.scratch);
            if read == 0 {
                return None;
            }
            self.pending.extend_from_slice(&self.scratch[..read]);
            self.convert_pending();
        }
        Some(AudioChunk::new(self.pcm.drain(..CHUNK_BYTES).collect::<Vec<u8>>()))
    }

    fn convert_pending(&mut self) {
        let Some(resampler) = self.resampler.as_mut() else {
            self.pcm.extend(pcm::f32_to_pcm16_bytes(&self.pending));
            self.pending.clear();
            return;
        };
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let block: Vec<f32> = self.pending.drain(..needed).collect();
            match resampler.process(&[block], None) {
                Ok(out) => self.pcm.extend(pcm::f32_to_pcm16_bytes(&out[0])),
                Err(e) => warn!(error = %e, "Resampling failed, dropping block"),
            }
        }
    }
}
