//! Audio producers for the Sentinel fraud monitor.
//!
//! Every producer yields fixed-duration PCM16 mono chunks at 16 kHz and pushes
//! them into a [`ChunkSink`]. Two interchangeable producers are provided:
//!
//! - [`MicrophoneSource`]: live capture from a cpal input device.
//! - [`SimulatedSource`]: endless, real-time-paced playback of a raw PCM asset.
//!
//! Callers are expected to keep at most one producer running at a time.

pub mod chunk;
pub mod error;
pub mod microphone;
pub mod pcm;
pub mod simulation;
pub mod source;

pub use chunk::{AudioChunk, CHUNK_BYTES, CHUNK_DURATION, SAMPLE_RATE_HZ};
pub use error::AudioError;
pub use microphone::MicrophoneSource;
pub use simulation::SimulatedSource;
pub use source::{AudioSource, ChunkSink};
