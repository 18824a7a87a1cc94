use anyhow::{anyhow, Result};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::messages::{build_listen_url, parse_transcript_event, ControlMessage};
use super::{LinkConfig, LinkEvent, LinkFactory, TranscriptionLink};
use crate::audio::AudioFrame;
use crate::session::SessionError;

/// How long a deliberate disconnect waits for the close handshake before
/// aborting the I/O task.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Streaming WebSocket link to a Deepgram-style transcription backend.
///
/// `connect` spawns a single I/O task that owns the socket: outbound PCM
/// chunks are drained from an internal channel, inbound text frames are
/// parsed and forwarded as `LinkEvent`s. Dropping the outbound channel is the
/// deliberate-close signal; the task then sends `CloseStream` so the backend
/// finalizes trailing audio.
pub struct DeepgramLink {
    config: LinkConfig,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    audio_tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    io_task: Mutex<Option<JoinHandle<()>>>,
}

impl DeepgramLink {
    pub fn new(config: LinkConfig) -> Self {
        Self {
            config,
            connected: Arc::new(AtomicBool::new(false)),
            closing: Arc::new(AtomicBool::new(false)),
            audio_tx: Mutex::new(None),
            io_task: Mutex::new(None),
        }
    }
}

#[async_trait::async_trait]
impl TranscriptionLink for DeepgramLink {
    async fn connect(&self, events: mpsc::Sender<LinkEvent>) -> Result<()> {
        let mut io_task = self.io_task.lock().await;
        if io_task.is_some() {
            return Err(anyhow!("link already connected"));
        }

        let url = build_listen_url(&self.config)?;
        let mut request = url.as_str().into_client_request()?;
        let auth = HeaderValue::from_str(&format!("Token {}", self.config.api_key))
            .map_err(|_| anyhow!("API key contains invalid header characters"))?;
        request.headers_mut().insert("Authorization", auth);

        let (audio_tx, audio_rx) = mpsc::channel::<Vec<u8>>(64);
        *self.audio_tx.lock().await = Some(audio_tx);

        let connected = Arc::clone(&self.connected);
        let closing = Arc::clone(&self.closing);
        let keepalive = self.config.keepalive_interval;

        info!("Opening transcription link to {}", self.config.endpoint);
        *io_task = Some(tokio::spawn(async move {
            run_io(request, audio_rx, events, connected, closing, keepalive).await;
        }));

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_audio(&self, frame: AudioFrame) -> Result<()> {
        if !self.is_connected() {
            debug!("Link not connected, dropping audio frame");
            return Ok(());
        }

        let guard = self.audio_tx.lock().await;
        if let Some(tx) = guard.as_ref() {
            // Never block the frame pump on a slow connection
            if tx.try_send(frame.pcm_bytes()).is_err() {
                debug!("Link send buffer full, dropping audio frame");
            }
        }

        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.closing.store(true, Ordering::SeqCst);

        // Closing the audio channel tells the I/O task to send CloseStream
        // and shut down
        self.audio_tx.lock().await.take();

        if let Some(handle) = self.io_task.lock().await.take() {
            let abort = handle.abort_handle();
            if tokio::time::timeout(CLOSE_TIMEOUT, handle).await.is_err() {
                warn!("Link did not confirm close in time, aborting I/O task");
                abort.abort();
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// The single I/O task owning the socket for the lifetime of the connection.
async fn run_io(
    request: tokio_tungstenite::tungstenite::handshake::client::Request,
    mut audio_rx: mpsc::Receiver<Vec<u8>>,
    events: mpsc::Sender<LinkEvent>,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    keepalive_interval: Duration,
) {
    let (ws, _response) = match connect_async(request).await {
        Ok(ok) => ok,
        Err(e) => {
            if !closing.load(Ordering::SeqCst) {
                let _ = events
                    .send(LinkEvent::Error(SessionError::ConnectionFailed(e.to_string())))
                    .await;
            }
            return;
        }
    };

    info!("Transcription link established");
    connected.store(true, Ordering::SeqCst);

    let (mut sink, mut stream) = ws.split();

    let mut keepalive = tokio::time::interval(keepalive_interval);
    keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = keepalive.tick() => {
                // Keeps the backend from closing the socket during silence,
                // including the post-stop flush window
                if let Err(e) = sink.send(Message::Text(ControlMessage::KeepAlive.to_json())).await {
                    if !closing.load(Ordering::SeqCst) {
                        let _ = events
                            .send(LinkEvent::Error(SessionError::ConnectionLost(e.to_string())))
                            .await;
                    }
                    break;
                }
            }
            chunk = audio_rx.recv() => match chunk {
                Some(bytes) => {
                    if let Err(e) = sink.send(Message::Binary(bytes)).await {
                        if !closing.load(Ordering::SeqCst) {
                            let _ = events
                                .send(LinkEvent::Error(SessionError::ConnectionLost(e.to_string())))
                                .await;
                        }
                        break;
                    }
                }
                None => {
                    // Deliberate disconnect: let the backend finalize, then close
                    let _ = sink.send(Message::Text(ControlMessage::CloseStream.to_json())).await;
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(update) = parse_transcript_event(&text) {
                        let event = LinkEvent::Transcript {
                            text: update.text,
                            is_final: update.is_final,
                        };
                        if events.send(event).await.is_err() {
                            // Session side is gone
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    if !closing.load(Ordering::SeqCst) {
                        let _ = events
                            .send(LinkEvent::Error(SessionError::ConnectionLost(
                                "connection closed by server".to_string(),
                            )))
                            .await;
                    }
                    break;
                }
                Some(Ok(_)) => {
                    // Ping/pong and binary frames are not transcript events
                }
                Some(Err(e)) => {
                    if !closing.load(Ordering::SeqCst) {
                        let _ = events
                            .send(LinkEvent::Error(SessionError::ConnectionLost(e.to_string())))
                            .await;
                    }
                    break;
                }
            },
        }
    }

    connected.store(false, Ordering::SeqCst);
    debug!("Link I/O task exiting");
}

/// Produces a `DeepgramLink` per start-request, stamping in the API key the
/// session resolved at start time.
pub struct DeepgramLinkFactory {
    base: LinkConfig,
}

impl DeepgramLinkFactory {
    pub fn new(base: LinkConfig) -> Self {
        Self { base }
    }
}

impl LinkFactory for DeepgramLinkFactory {
    fn create(&self, api_key: &str) -> Arc<dyn TranscriptionLink> {
        let mut config = self.base.clone();
        config.api_key = api_key.to_string();
        Arc::new(DeepgramLink::new(config))
    }
}
