use bytes::Bytes;
use std::time::Duration;

/// Sample rate of every chunk handed to a [`crate::ChunkSink`].
pub const SAMPLE_RATE_HZ: u32 = 16_000;
/// Nominal duration of one chunk.
pub const CHUNK_DURATION: Duration = Duration::from_millis(100);
/// Nominal chunk size: 100 ms of 16-bit mono samples at 16 kHz.
pub const CHUNK_BYTES: usize = (SAMPLE_RATE_HZ as usize / 10) * BYTES_PER_SAMPLE;

const BYTES_PER_SAMPLE: usize = 2;

/// An immutable run of little-endian PCM16 mono samples at [`SAMPLE_RATE_HZ`].
///
/// Chunks are [`CHUNK_BYTES`] long except the last one a source emits before
/// reaching the end of its stream, which is passed on as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk(Bytes);

impl AudioChunk {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for AudioChunk {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&[u8]> for AudioChunk {
    fn from(data: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(data))
    }
}
