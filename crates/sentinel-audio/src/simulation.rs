//! Looping playback of a pre-recorded PCM asset, paced like a live microphone.

use crate::chunk::{AudioChunk, CHUNK_BYTES, CHUNK_DURATION};
use crate::error::AudioError;
use crate::source::{AudioSource, ChunkSink};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::{
    fs::File,
    io::AsyncReadExt,
    sync::watch,
    task::JoinHandle,
};
use tracing::{debug, info, warn};

/// Plays a raw PCM16 mono 16 kHz asset forever, one chunk per pacing interval.
///
/// File reads are not rate-limited the way hardware capture is, so every chunk
/// is followed by a delay (100 ms by default). When the asset is exhausted it
/// is reopened and playback continues from the start.
pub struct SimulatedSource {
    asset: PathBuf,
    pacing: Duration,
    worker: Option<PlaybackWorker>,
}

struct PlaybackWorker {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SimulatedSource {
    pub fn new(asset: impl Into<PathBuf>) -> Self {
        Self {
            asset: asset.into(),
            pacing: CHUNK_DURATION,
            worker: None,
        }
    }

    /// Overrides the delay inserted after each chunk.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }
}

#[async_trait]
impl AudioSource for SimulatedSource {
    async fn start(&mut self, sink: Arc<dyn ChunkSink>) -> Result<(), AudioError> {
        self.stop().await;

        tokio::fs::metadata(&self.asset)
            .await
            .map_err(|source| AudioError::Asset {
                path: self.asset.clone(),
                source,
            })?;

        let (cancel, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(run_playback(
            self.asset.clone(),
            self.pacing,
            sink,
            cancel_rx,
        ));
        info!(asset = %self.asset.display(), "Simulated audio playback started");
        self.worker = Some(PlaybackWorker { cancel, task });
        Ok(())
    }

    async fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = worker.cancel.send(true);
        if let Err(e) = worker.task.await {
            warn!(error = %e, "Simulated playback task ended abnormally");
        }
        info!("Simulated audio playback stopped");
    }

    fn is_active(&self) -> bool {
        self.worker.is_some()
    }

    fn name(&self) -> &str {
        "simulation"
    }
}

/// Waits one pacing interval. Returns `true` if cancellation arrived first.
async fn pause(pacing: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(pacing) => *cancel.borrow(),
        changed = cancel.changed() => changed.is_err() || *cancel.borrow(),
    }
}

/// Fills `buf` from `file`, returning fewer bytes only at end of stream.
async fn read_chunk(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

async fn run_playback(
    asset: PathBuf,
    pacing: Duration,
    sink: Arc<dyn ChunkSink>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut reader: Option<File> = None;
    let mut emitted_since_open = false;
    let mut buf = vec![0u8; CHUNK_BYTES];

    while !*cancel.borrow() {
        if reader.is_none() {
            match File::open(&asset).await {
                Ok(file) => {
                    reader = Some(file);
                    emitted_since_open = false;
                }
                Err(e) => {
                    warn!(asset = %asset.display(), error = %e, "Failed to open audio asset, retrying");
                    if pause(pacing, &mut cancel).await {
                        break;
                    }
                    continue;
                }
            }
        }
        let Some(file) = reader.as_mut() else {
            continue;
        };

        match read_chunk(file, &mut buf).await {
            Ok(0) => {
                debug!(asset = %asset.display(), "End of audio asset, looping");
                reader = None;
                // An empty asset would otherwise spin on reopen.
                if !emitted_since_open && pause(pacing, &mut cancel).await {
                    break;
                }
            }
            Ok(n) => {
                emitted_since_open = true;
                if n < CHUNK_BYTES {
                    reader = None;
                }
                sink.push(AudioChunk::from(&buf[..n])).await;
                if pause(pacing, &mut cancel).await {
                    break;
                }
            }
            Err(e) => {
                warn!(asset = %asset.display(), error = %e, "Failed to read audio asset, reopening");
                reader = None;
                if pause(pacing, &mut cancel).await {
                    break;
                }
            }
        }
    }
    debug!("Playback loop exited");
}
