//! The Gemini Live connection state machine.
//!
//! One [`LiveClient`] owns one socket. The state moves
//! `Disconnected -> Connecting -> Connected -> Closing -> Disconnected`, and
//! only this module mutates it. All writes go through a single mutex-guarded
//! sink, so setup, the initial prompt and audio frames can never interleave.

use crate::codec::{self, InboundEnvelope, OutboundFrame};
use crate::config::LiveConfig;
use crate::error::ClientError;
use crate::events::{self, EventHandler, LiveEvent};
use crate::risk::RiskParser;
use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use sentinel_audio::{AudioChunk, ChunkSink};
use std::fmt;
use std::sync::Arc;
use tokio::{
    net::TcpStream,
    sync::{Mutex, mpsc, watch},
    time::Instant,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        handshake::client::Request,
        protocol::{CloseFrame, Message, frame::coding::CloseCode},
    },
};
use tracing::{debug, error, info, trace, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

const CLOSE_REASON: &str = "User disconnected";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Handle to a single Gemini Live session. Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct LiveClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: LiveConfig,
    state: watch::Sender<ConnectionState>,
    writer: Mutex<Option<WsSink>>,
    events: mpsc::UnboundedSender<LiveEvent>,
}

impl LiveClient {
    /// Creates a disconnected client. Must be called from within a Tokio runtime.
    pub fn new(config: LiveConfig, handler: Arc<dyn EventHandler>) -> Self {
        let (events, events_rx) = mpsc::unbounded_channel();
        events::spawn_dispatcher(handler, events_rx);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                state,
                writer: Mutex::new(None),
                events,
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Observes state transitions without being able to cause them.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Starts opening the socket. Only valid while `Disconnected`.
    ///
    /// Returns once the attempt is under way; success is reported through
    /// `on_connected`, failure through `on_error` followed by `on_disconnect`.
    pub fn connect(&self) -> Result<(), ClientError> {
        let request = self.inner.config.client_request()?;
        let mut current = ConnectionState::Disconnected;
        let started = self.inner.state.send_if_modified(|state| {
            current = *state;
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(ClientError::InvalidState {
                operation: "connect",
                state: current,
            });
        }

        info!(endpoint = %self.inner.config.endpoint, model = %self.inner.config.model, "Connecting to Gemini Live");
        tokio::spawn(run_session(self.inner.clone(), request));
        Ok(())
    }

    /// Requests a graceful close. Only valid while `Connecting` or `Connected`.
    ///
    /// Returns promptly; `on_disconnect` fires once the socket is gone.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        let mut previous = ConnectionState::Disconnected;
        let closing = self.inner.state.send_if_modified(|state| {
            previous = *state;
            match *state {
                ConnectionState::Connecting | ConnectionState::Connected => {
                    *state = ConnectionState::Closing;
                    true
                }
                _ => false,
            }
        });
        if !closing {
            return Err(ClientError::InvalidState {
                operation: "disconnect",
                state: previous,
            });
        }

        info!(from = %previous, "Disconnecting from Gemini Live");
        if previous == ConnectionState::Connected {
            let mut writer = self.inner.writer.lock().await;
            if let Some(sink) = writer.as_mut() {
                if let Err(e) = sink.send(close_message()).await {
                    warn!(error = %e, "Failed to send close frame");
                }
            }
        }
        Ok(())
    }

    /// Encodes and sends one chunk. Silently dropped unless `Connected`.
    pub async fn send_audio_data(&self, chunk: &AudioChunk) {
        if self.state() != ConnectionState::Connected {
            trace!(bytes = chunk.len(), "Dropping audio chunk while not connected");
            return;
        }
        let frame = codec::encode_audio_chunk(chunk);

        let mut writer = self.inner.writer.lock().await;
        if self.state() != ConnectionState::Connected {
            return;
        }
        let Some(sink) = writer.as_mut() else {
            return;
        };
        if let Err(e) = send_frame(sink, &frame).await {
            warn!(error = %e, "Failed to send audio frame");
        }
    }
}

#[async_trait]
impl ChunkSink for LiveClient {
    async fn push(&self, chunk: AudioChunk) {
        self.send_audio_data(&chunk).await;
    }
}

fn close_message() -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: CLOSE_REASON.into(),
    }))
}

async fn send_frame(sink: &mut WsSink, frame: &OutboundFrame) -> Result<(), ClientError> {
    let payload = frame.to_json()?;
    sink.send(Message::Text(payload.into())).await?;
    trace!(kind = frame.kind(), "Sent frame");
    Ok(())
}

/// Resolves once the state becomes `Closing`.
async fn closing_requested(state: &mut watch::Receiver<ConnectionState>) {
    loop {
        let closing = *state.borrow_and_update() == ConnectionState::Closing;
        if closing {
            return;
        }
        if state.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn run_session(inner: Arc<Inner>, request: Request) {
    let mut state_rx = inner.state.subscribe();

    let connected = tokio::select! {
        result = connect_async(request) => result,
        _ = closing_requested(&mut state_rx) => {
            info!("Connection attempt cancelled");
            inner.finish(None).await;
            return;
        }
    };
    let stream = match connected {
        Ok((stream, _)) => stream,
        Err(e) => {
            inner.finish(Some(codec::transport_error(&e))).await;
            return;
        }
    };

    let (sink, mut source) = stream.split();
    if let Err(exit) = inner.open(sink).await {
        inner.finish(exit).await;
        return;
    }
    inner.emit(LiveEvent::Connected);

    let exit = inner.read_loop(&mut source, &mut state_rx).await;
    inner.finish(Some(exit)).await;
}

impl Inner {
    fn emit(&self, event: LiveEvent) {
        let _ = self.events.send(event);
    }

    /// Installs the sink and sends setup then the initial prompt, all under
    /// the writer lock so no audio frame can slip in first.
    async fn open(&self, mut sink: WsSink) -> Result<(), Option<InboundEnvelope>> {
        let mut writer = self.writer.lock().await;
        let promoted = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Connected;
                true
            } else {
                false
            }
        });
        if !promoted {
            debug!("Socket opened after disconnect was requested");
            let _ = sink.send(close_message()).await;
            return Err(None);
        }
        info!("Connected to Gemini Live");

        let sink = writer.insert(sink);
        let handshake = [
            codec::encode_setup(&self.config.model),
            codec::encode_initial_prompt(&self.config.instruction),
        ];
        for frame in &handshake {
            if let Err(e) = send_frame(sink, frame).await {
                error!(kind = frame.kind(), error = %e, "Failed to send handshake frame");
                return Err(Some(InboundEnvelope::TransportError {
                    message: e.to_string(),
                }));
            }
        }
        Ok(())
    }

    /// Processes inbound frames until the socket closes, fails, or a requested
    /// close is not acknowledged within the grace period.
    async fn read_loop(
        &self,
        source: &mut SplitStream<WsStream>,
        state_rx: &mut watch::Receiver<ConnectionState>,
    ) -> InboundEnvelope {
        let mut parser = RiskParser::new(self.config.accumulate_fragments);
        let grace = tokio::time::sleep(self.config.close_grace);
        tokio::pin!(grace);
        let mut closing = false;

        loop {
            tokio::select! {
                message = source.next() => match message {
                    Some(Ok(Message::Text(text))) => self.handle_payload(&text, &mut parser),
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => self.handle_payload(text, &mut parser),
                        Err(_) => debug!(bytes = data.len(), "Ignoring non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => return codec::closed(frame),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return codec::transport_error(&e),
                    None => return codec::closed(None),
                },
                _ = closing_requested(state_rx), if !closing => {
                    closing = true;
                    grace.as_mut().reset(Instant::now() + self.config.close_grace);
                }
                _ = &mut grace, if closing => {
                    warn!("Server did not acknowledge close in time");
                    return InboundEnvelope::TransportError {
                        message: "close handshake timed out".to_string(),
                    };
                }
            }
        }
    }

    fn handle_payload(&self, raw: &str, parser: &mut RiskParser) {
        if *self.state.borrow() != ConnectionState::Connected {
            debug!("Ignoring server message while closing");
            return;
        }
        for envelope in codec::decode(raw) {
            match envelope {
                InboundEnvelope::SetupComplete => debug!("Gemini Live setup complete"),
                InboundEnvelope::ModelTextFragment { text } => {
                    if let Some(assessment) = parser.feed(&text) {
                        info!(
                            risk_level = assessment.risk_level,
                            reason = %assessment.reason,
                            "Risk analysis received"
                        );
                        self.emit(LiveEvent::RiskAnalysis(assessment));
                    }
                }
                InboundEnvelope::TurnComplete => parser.end_turn(),
                InboundEnvelope::ConnectionClosed { .. } | InboundEnvelope::TransportError { .. } => {}
            }
        }
    }

    /// Releases the socket, returns to `Disconnected` and notifies the consumer.
    /// An exit that was not requested through `disconnect` is reported as an error first.
    async fn finish(&self, exit: Option<InboundEnvelope>) {
        let sink = self.writer.lock().await.take();
        if let Some(mut sink) = sink {
            if tokio::time::timeout(self.config.close_grace, sink.close()).await.is_err() {
                debug!("Timed out flushing socket close");
            }
        }

        let previous = self.state.send_replace(ConnectionState::Disconnected);
        let requested = previous == ConnectionState::Closing;
        match exit {
            Some(envelope) if !requested => {
                let message = describe_exit(&envelope);
                error!(%message, "Gemini Live session ended unexpectedly");
                self.emit(LiveEvent::Error(message));
            }
            Some(envelope) => debug!(?envelope, "Gemini Live session closed"),
            None => debug!("Gemini Live session closed before opening"),
        }
        info!("Disconnected from Gemini Live");
        self.emit(LiveEvent::Disconnected);
    }
}

fn describe_exit(envelope: &InboundEnvelope) -> String {
    match envelope {
        InboundEnvelope::ConnectionClosed { code: Some(code), reason } if !reason.is_empty() => {
            format!("Connection closed by server (code {code}): {reason}")
        }
        InboundEnvelope::ConnectionClosed { code: Some(code), .. } => {
            format!("Connection closed by server (code {code})")
        }
        InboundEnvelope::ConnectionClosed { code: None, .. } => {
            "Connection closed by server".to_string()
        }
        InboundEnvelope::TransportError { message } => message.clone(),
        other => format!("Unexpected session end: {other:?}"),
    }
}
