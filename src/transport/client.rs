use anyhow::{anyhow, Context, Result};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::messages::{
    Content, GenerationConfig, Part, PrebuiltVoiceConfig, RealtimeInputMessage, ServerMessage,
    Setup, SetupMessage, SpeechConfig, VoiceConfig,
};
use crate::audio::EncodedChunk;
use crate::error::LiveError;

/// How long close() waits for the close frame to flush
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// What the remote end reports, in order
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Ready to accept outbound audio
    Open,
    /// One playable audio chunk
    Message(EncodedChunk),
    /// The connection failed
    Error(String),
    /// The connection ended (optional reason)
    Close(Option<String>),
}

/// How the remote session is configured when it opens
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSetup {
    /// Model name without the "models/" prefix
    pub model: String,
    /// Persona instruction
    pub system_instruction: Option<String>,
    /// Prebuilt voice for spoken responses
    pub voice: Option<String>,
    /// Requested response modalities ("AUDIO")
    pub response_modalities: Vec<String>,
}

impl SessionSetup {
    pub fn audio(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_instruction: None,
            voice: None,
            response_modalities: vec!["AUDIO".to_string()],
        }
    }

    pub fn to_message(&self) -> SetupMessage {
        let model = if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        };

        SetupMessage {
            setup: Setup {
                model,
                generation_config: GenerationConfig {
                    response_modalities: self.response_modalities.clone(),
                    speech_config: self.voice.as_ref().map(|voice| SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: voice.clone(),
                            },
                        },
                    }),
                },
                system_instruction: self
                    .system_instruction
                    .as_ref()
                    .filter(|text| !text.trim().is_empty())
                    .map(|text| Content {
                        parts: vec![Part {
                            text: Some(text.clone()),
                            inline_data: None,
                        }],
                    }),
            },
        }
    }
}

/// Outbound half of an open connection
#[async_trait::async_trait]
pub trait LiveConnection: Send {
    /// Queue one audio chunk; never waits for the network
    fn send_audio(&mut self, chunk: EncodedChunk) -> Result<()>;

    /// Close the connection; closing twice is a no-op
    async fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Opens live connections to a remote model
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn connect(
        &self,
        setup: &SessionSetup,
    ) -> Result<(Box<dyn LiveConnection>, mpsc::UnboundedReceiver<TransportEvent>)>;
}

/// WebSocket client for the Live API
pub struct WebSocketTransport {
    endpoint: String,
    api_key: String,
}

impl WebSocketTransport {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.endpoint)
            .with_context(|| format!("Invalid live endpoint: {}", self.endpoint))?;
        if !self.api_key.is_empty() {
            url.query_pairs_mut().append_pair("key", &self.api_key);
        }
        Ok(url)
    }
}

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    async fn connect(
        &self,
        setup: &SessionSetup,
    ) -> Result<(Box<dyn LiveConnection>, mpsc::UnboundedReceiver<TransportEvent>)> {
        let url = self.url()?;
        info!(
            "Connecting to live endpoint {}://{}{}",
            url.scheme(),
            url.host_str().unwrap_or(""),
            url.path()
        );

        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| LiveError::Transport(format!("connect failed: {}", e)))?;

        let (mut sink, mut stream) = socket.split();

        let setup_json = serde_json::to_string(&setup.to_message())?;
        sink.send(Message::Text(setup_json))
            .await
            .map_err(|e| LiveError::Transport(format!("setup failed: {}", e)))?;

        info!("Live socket open, setup sent for {}", setup.model);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<EncodedChunk>();

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let writer_events = event_tx.clone();
        let writer = tokio::spawn(async move {
            loop {
                let chunk = tokio::select! {
                    // Queued frames are abandoned once close() is called
                    biased;
                    _ = &mut shutdown_rx => break,
                    chunk = outbound_rx.recv() => match chunk {
                        Some(chunk) => chunk,
                        None => break,
                    },
                };

                let payload = match serde_json::to_string(&RealtimeInputMessage::audio(chunk)) {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!("Failed to serialize audio chunk: {}", e);
                        continue;
                    }
                };

                if let Err(e) = sink.send(Message::Text(payload)).await {
                    let _ = writer_events.send(TransportEvent::Error(format!("send failed: {}", e)));
                    return;
                }
            }

            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
            debug!("Live socket writer stopped");
        });

        let reader = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => dispatch_server_message(&text, &event_tx),
                    // The Live API frames JSON as binary
                    Ok(Message::Binary(data)) => match String::from_utf8(data) {
                        Ok(text) => dispatch_server_message(&text, &event_tx),
                        Err(_) => warn!("Ignoring non-UTF8 binary frame"),
                    },
                    Ok(Message::Close(frame)) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|reason| !reason.is_empty());
                        let _ = event_tx.send(TransportEvent::Close(reason));
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = event_tx.send(TransportEvent::Error(format!("receive failed: {}", e)));
                        return;
                    }
                }
            }

            let _ = event_tx.send(TransportEvent::Close(None));
        });

        let connection = WebSocketConnection {
            outbound: Some(outbound_tx),
            shutdown: Some(shutdown_tx),
            writer: Some(writer),
            reader: Some(reader),
        };

        Ok((Box::new(connection), event_rx))
    }
}

/// Translate one server payload into transport events
fn dispatch_server_message(text: &str, events: &mpsc::UnboundedSender<TransportEvent>) {
    let msg: ServerMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Ignoring unparseable server message: {}", e);
            return;
        }
    };

    if msg.setup_complete.is_some() {
        let _ = events.send(TransportEvent::Open);
    }

    if let Some(message) = msg.error_message() {
        let _ = events.send(TransportEvent::Error(message));
        return;
    }

    if let Some(content) = &msg.server_content {
        if content.interrupted {
            debug!("Model turn interrupted");
        }
        if content.turn_complete {
            debug!("Model turn complete");
        }
    }

    for part in msg.audio_chunks() {
        match part {
            Ok(chunk) => {
                let _ = events.send(TransportEvent::Message(chunk));
            }
            Err(e) => warn!("Skipping audio part: {}", e),
        }
    }
}

struct WebSocketConnection {
    outbound: Option<mpsc::UnboundedSender<EncodedChunk>>,
    shutdown: Option<oneshot::Sender<()>>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl LiveConnection for WebSocketConnection {
    fn send_audio(&mut self, chunk: EncodedChunk) -> Result<()> {
        let outbound = self
            .outbound
            .as_ref()
            .ok_or_else(|| anyhow!("Connection closed"))?;

        outbound
            .send(chunk)
            .map_err(|_| LiveError::Transport("socket writer stopped".to_string()).into())
    }

    async fn close(&mut self) -> Result<()> {
        if self.outbound.take().is_none() {
            return Ok(());
        }

        info!("Closing live socket");

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        if let Some(mut writer) = self.writer.take() {
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut writer).await.is_err() {
                warn!(
                    "Live socket did not close within {:?}, dropping it",
                    CLOSE_TIMEOUT
                );
                writer.abort();
            }
        }

        if let Some(reader) = self.reader.take() {
            reader.abort();
        }

        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.outbound.is_none()
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
