//! Wire shapes of the Gemini Live protocol.
//!
//! Outbound frames are typed and serialized through serde; nothing outside
//! this module builds protocol JSON. Inbound text is decoded into a small set
//! of [`InboundEnvelope`] variants, and malformed input never escapes as an
//! error.

use base64::Engine;
use sentinel_audio::AudioChunk;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::{self, protocol::CloseFrame};
use tracing::{debug, warn};

/// MIME descriptor attached to every audio frame.
pub const AUDIO_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// A frame sent from the client to the server.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    #[serde(rename = "setup")]
    Setup(Setup),
    #[serde(rename = "client_content")]
    InitialPrompt(ClientContent),
    #[serde(rename = "realtime_input")]
    Audio(RealtimeInput),
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub response_modalities: Vec<ResponseModality>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseModality {
    Text,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Part {
    pub text: String,
}

/// Streaming media input. Carries no turn boundary.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MediaChunk {
    pub mime_type: String,
    pub data: String,
}

impl OutboundFrame {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutboundFrame::Setup(_) => "setup",
            OutboundFrame::InitialPrompt(_) => "initial_prompt",
            OutboundFrame::Audio(_) => "audio",
        }
    }
}

/// Declares the model and asks for text-only responses.
pub fn encode_setup(model: &str) -> OutboundFrame {
    OutboundFrame::Setup(Setup {
        model: model.to_string(),
        generation_config: GenerationConfig {
            response_modalities: vec![ResponseModality::Text],
        },
    })
}

/// A single completed user turn carrying the role instruction.
pub fn encode_initial_prompt(instruction: &str) -> OutboundFrame {
    OutboundFrame::InitialPrompt(ClientContent {
        turns: vec![Content {
            role: "user".to_string(),
            parts: vec![Part {
                text: instruction.to_string(),
            }],
        }],
        turn_complete: true,
    })
}

pub fn encode_audio_chunk(chunk: &AudioChunk) -> OutboundFrame {
    OutboundFrame::Audio(RealtimeInput {
        media_chunks: vec![MediaChunk {
            mime_type: AUDIO_MIME_TYPE.to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(chunk.as_bytes()),
        }],
    })
}

/// A decoded server event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEnvelope {
    SetupComplete,
    ModelTextFragment { text: String },
    TurnComplete,
    ConnectionClosed { code: Option<u16>, reason: String },
    TransportError { message: String },
}

// Field names are accepted in both snake_case and the service's camelCase.
#[derive(Deserialize, Debug)]
struct ServerMessage {
    #[serde(alias = "setupComplete")]
    setup_complete: Option<serde_json::Value>,
    #[serde(alias = "serverContent")]
    server_content: Option<ServerContent>,
}

#[derive(Deserialize, Debug)]
struct ServerContent {
    #[serde(alias = "modelTurn")]
    model_turn: Option<ModelTurn>,
    #[serde(alias = "turnComplete")]
    turn_complete: Option<bool>,
}

// Parts stay untyped so one odd part does not discard its neighbours.
#[derive(Deserialize, Debug)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<serde_json::Value>,
}

/// Decodes one inbound payload. Each text part of the model turn becomes one
/// [`InboundEnvelope::ModelTextFragment`]; unparseable or unrecognized
/// payloads yield nothing.
pub fn decode(raw: &str) -> Vec<InboundEnvelope> {
    let message: ServerMessage = match serde_json::from_str(raw) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Failed to parse server message");
            return Vec::new();
        }
    };

    let mut envelopes = Vec::new();
    if message.setup_complete.is_some() {
        envelopes.push(InboundEnvelope::SetupComplete);
    }
    if let Some(content) = message.server_content {
        if let Some(turn) = content.model_turn {
            envelopes.extend(
                turn.parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(serde_json::Value::as_str))
                    .map(|text| InboundEnvelope::ModelTextFragment {
                        text: text.to_string(),
                    }),
            );
        }
        if content.turn_complete == Some(true) {
            envelopes.push(InboundEnvelope::TurnComplete);
        }
    }
    if envelopes.is_empty() {
        debug!(payload = raw, "Ignoring unrecognized server message");
    }
    envelopes
}

pub fn closed(frame: Option<CloseFrame<'_>>) -> InboundEnvelope {
    match frame {
        Some(frame) => InboundEnvelope::ConnectionClosed {
            code: Some(u16::from(frame.code)),
            reason: frame.reason.to_string(),
        },
        None => InboundEnvelope::ConnectionClosed {
            code: None,
            reason: String::new(),
        },
    }
}

pub fn transport_error(error: &tungstenite::Error) -> InboundEnvelope {
    InboundEnvelope::TransportError {
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    fn as_value(frame: &OutboundFrame) -> Value {
        serde_json::from_str(&frame.to_json().unwrap()).unwrap()
    }

    #[test]
    fn test_setup_frame_shape() {
        let frame = encode_setup("models/gemini-2.0-flash-exp");
        assert_eq!(frame.kind(), "setup");
        assert_eq!(
            as_value(&frame),
            json!({
                "setup": {
                    "model": "models/gemini-2.0-flash-exp",
                    "generation_config": { "response_modalities": ["TEXT"] }
                }
            })
        );
    }

    #[test]
    fn test_initial_prompt_frame_shape() {
        let frame = encode_initial_prompt("Watch for scams.");
        assert_eq!(
            as_value(&frame),
            json!({
                "client_content": {
                    "turns": [ { "role": "user", "parts": [ { "text": "Watch for scams." } ] } ],
                    "turn_complete": true
                }
            })
        );
    }

    #[test]
    fn test_audio_frame_payload_matches_chunk() {
        for size in [1usize, 2, 3, 1600, 3199, 3200] {
            let bytes: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let frame = encode_audio_chunk(&AudioChunk::new(bytes.clone()));
            let value = as_value(&frame);
            let media = &value["realtime_input"]["media_chunks"][0];
            assert_eq!(media["mime_type"], AUDIO_MIME_TYPE);
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(media["data"].as_str().unwrap())
                .unwrap();
            assert_eq!(decoded, bytes, "size {size}");
            assert!(value["realtime_input"].get("turn_complete").is_none());
        }
    }

    #[test]
    fn test_decode_snake_case_model_turn() {
        let raw = r#"{"server_content":{"model_turn":{"parts":[{"text":"hello"}]}}}"#;
        assert_eq!(
            decode(raw),
            vec![InboundEnvelope::ModelTextFragment {
                text: "hello".to_string()
            }]
        );
    }

    #[test]
    fn test_decode_camel_case_with_turn_complete() {
        let raw = r#"{"serverContent":{"modelTurn":{"parts":[{"text":"a"},{"inlineData":{"data":"AAA="}},{"text":"b"}]},"turnComplete":true}}"#;
        assert_eq!(
            decode(raw),
            vec![
                InboundEnvelope::ModelTextFragment { text: "a".to_string() },
                InboundEnvelope::ModelTextFragment { text: "b".to_string() },
                InboundEnvelope::TurnComplete,
            ]
        );
    }

    #[test]
    fn test_decode_keeps_text_beside_odd_parts() {
        let raw = r#"{"serverContent":{"modelTurn":{"parts":["stray",{"text":42},null,{"text":"kept"}]}}}"#;
        assert_eq!(
            decode(raw),
            vec![InboundEnvelope::ModelTextFragment {
                text: "kept".to_string()
            }]
        );
    }

    #[test]
    fn test_decode_setup_complete() {
        assert_eq!(decode(r#"{"setupComplete":{}}"#), vec![InboundEnvelope::SetupComplete]);
    }

    #[test]
    fn test_decode_ignores_malformed_and_unknown() {
        assert!(decode("not json").is_empty());
        assert!(decode(r#"{"usageMetadata":{"totalTokenCount":12}}"#).is_empty());
        assert!(decode(r#"{"server_content":{"model_turn":{"parts":[{}]}}}"#).is_empty());
        assert!(decode("[1,2,3]").is_empty());
    }

    #[test]
    fn test_close_and_transport_envelopes() {
        let frame = CloseFrame {
            code: CloseCode::Away,
            reason: "bye".into(),
        };
        assert_eq!(
            closed(Some(frame)),
            InboundEnvelope::ConnectionClosed {
                code: Some(1001),
                reason: "bye".to_string()
            }
        );
        assert_eq!(
            closed(None),
            InboundEnvelope::ConnectionClosed {
                code: None,
                reason: String::new()
            }
        );
        let envelope = transport_error(&tungstenite::Error::ConnectionClosed);
        assert!(matches!(envelope, InboundEnvelope::TransportError { .. }));
    }
}
