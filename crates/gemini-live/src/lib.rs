//! Streaming client for the Gemini Live bidirectional API, specialised for
//! real-time fraud analysis of call audio.
//!
//! - `codec`: typed outbound frames and the inbound envelope decoder.
//! - `risk`: tolerant extraction of `{risk_level, reason}` verdicts from model text.
//! - `client`: the connection state machine that owns the socket.
//! - `events`: the consumer notification surface.

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod risk;

pub use client::{ConnectionState, LiveClient};
pub use config::{CredentialMode, LiveConfig};
pub use error::ClientError;
pub use events::{EventHandler, LiveEvent};
pub use risk::{RiskAssessment, RiskParser};
