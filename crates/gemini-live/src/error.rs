use crate::client::ConnectionState;
use tokio_tungstenite::tungstenite::{self, http::header::InvalidHeaderValue};

/// Errors returned synchronously by [`crate::LiveClient`] operations.
///
/// Failures of an established session are reported through
/// [`crate::EventHandler::on_error`] instead.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },
    #[error("Invalid API key header value: {0}")]
    Credential(#[from] InvalidHeaderValue),
    #[error("WebSocket error: {0}")]
    Transport(#[from] tungstenite::Error),
    #[error("Failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}
