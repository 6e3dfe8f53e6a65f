use crate::error::ClientError;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio_tungstenite::tungstenite::{client::IntoClientRequest, handshake::client::Request};

pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent";
pub const DEFAULT_MODEL: &str = "models/gemini-2.0-flash-exp";
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(3);

/// Role instruction sent as the first turn of every session.
pub const FRAUD_ANALYSIS_PROMPT: &str = "You are Sentinel, a fraud defense system. Analyze the audio stream for: 1. Threatening tone. 2. Payment pressure. 3. Identity masking. Output ONLY a JSON object: {\"risk_level\": int, \"reason\":String}.";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Where the API key travels during the websocket handshake.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CredentialMode {
    /// `x-goog-api-key` request header.
    #[default]
    Header,
    /// `key` query parameter on the endpoint URL.
    Query,
}

/// Connection settings for a [`crate::LiveClient`].
#[derive(Clone, Debug)]
pub struct LiveConfig {
    pub endpoint: String,
    pub api_key: SecretString,
    pub model: String,
    pub instruction: String,
    pub credential: CredentialMode,
    /// Buffer unparseable model text across fragments of a turn.
    pub accumulate_fragments: bool,
    /// How long `disconnect` waits for the server to acknowledge the close.
    pub close_grace: Duration,
}

impl LiveConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: SecretString::from(api_key.into()),
            model: DEFAULT_MODEL.to_string(),
            instruction: FRAUD_ANALYSIS_PROMPT.to_string(),
            credential: CredentialMode::default(),
            accumulate_fragments: false,
            close_grace: DEFAULT_CLOSE_GRACE,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn with_credential(mut self, credential: CredentialMode) -> Self {
        self.credential = credential;
        self
    }

    pub fn with_fragment_accumulation(mut self, enabled: bool) -> Self {
        self.accumulate_fragments = enabled;
        self
    }

    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace = grace;
        self
    }

    /// Builds the websocket handshake request, attaching the API key.
    pub(crate) fn client_request(&self) -> Result<Request, ClientError> {
        let key = self.api_key.expose_secret();
        match self.credential {
            CredentialMode::Header => {
                let mut request = self.endpoint.as_str().into_client_request()?;
                request.headers_mut().insert(API_KEY_HEADER, key.parse()?);
                Ok(request)
            }
            CredentialMode::Query => {
                let separator = if self.endpoint.contains('?') { '&' } else { '?' };
                let url = format!("{}{separator}key={key}", self.endpoint);
                Ok(url.into_client_request()?)
            }
        }
    }
}
