use crate::chunk::AudioChunk;
use crate::error::AudioError;
use async_trait::async_trait;
use std::sync::Arc;

/// Receives the chunks an [`AudioSource`] produces.
///
/// Implementations must not block for longer than it takes to hand the chunk
/// on; a sink that cannot use a chunk right now should drop it.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    async fn push(&self, chunk: AudioChunk);
}

/// A producer of 100 ms PCM chunks.
///
/// Both implementations behave identically from the outside:
/// - `start` spawns the producer on its own task or thread and returns as soon
///   as it is running. Starting an already running source restarts it.
/// - `stop` cancels the producer and waits for it to exit, so once it returns
///   no further chunk reaches the sink and the device or file is released.
///   Stopping a stopped source does nothing.
#[async_trait]
pub trait AudioSource: Send {
    async fn start(&mut self, sink: Arc<dyn ChunkSink>) -> Result<(), AudioError>;

    async fn stop(&mut self);

    fn is_active(&self) -> bool;

    /// Short name used in logs.
    fn name(&self) -> &str;
}
