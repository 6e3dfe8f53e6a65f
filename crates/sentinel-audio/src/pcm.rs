//! Sample format helpers shared by the capture path.

use crate::chunk::SAMPLE_RATE_HZ;
use crate::error::AudioError;
use rubato::{FastFixedIn, PolynomialDegree};

/// Creates a mono resampler from `in_sample_rate` to the 16 kHz chunk rate.
pub fn create_resampler(in_sample_rate: u32, chunk_size: usize) -> Result<FastFixedIn<f32>, AudioError> {
    FastFixedIn::<f32>::new(
        SAMPLE_RATE_HZ as f64 / in_sample_rate as f64,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )
    .map_err(|e| AudioError::Resampler(e.to_string()))
}

/// Averages interleaved frames of `channels` samples into a single channel.
/// An incomplete trailing frame is dropped.
pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> impl ExactSizeIterator<Item = f32> + '_ {
    let channels = channels.max(1);
    interleaved
        .chunks_exact(channels)
        .map(move |frame| frame.iter().sum::<f32>() / channels as f32)
}

/// Converts normalized f32 samples into little-endian PCM16 bytes, clamping out-of-range input.
pub fn f32_to_pcm16_bytes(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&sample| {
            let v = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            v.to_le_bytes()
        })
        .collect()
}
