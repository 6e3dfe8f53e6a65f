use std::path::PathBuf;

/// Failures raised while starting an audio producer.
///
/// Once a producer is running, read failures are logged and retried rather
/// than returned.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("No audio input device available")]
    NoInputDevice,
    #[error("Input device not found: {0}")]
    DeviceNotFound(String),
    #[error("Failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),
    #[error("Failed to query input device configuration: {0}")]
    DeviceConfig(#[from] cpal::DefaultStreamConfigError),
    #[error("Failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("Failed to start input stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
    #[error("Unsupported input sample format: {0}")]
    UnsupportedFormat(String),
    #[error("Failed to create resampler: {0}")]
    Resampler(String),
    #[error("Cannot open audio asset {path}: {source}")]
    Asset {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Capture worker exited before it was ready")]
    WorkerGone,
}
