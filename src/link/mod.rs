//! Streaming transcription link
//!
//! The link owns one persistent bidirectional connection to the speech-to-
//! text backend: audio frames go out as binary PCM, transcript updates come
//! back as `LinkEvent`s on an mpsc channel. Readiness is observed through the
//! non-blocking `is_connected()` probe rather than a completion future.

pub mod client;
pub mod messages;

pub use client::{DeepgramLink, DeepgramLinkFactory};
pub use messages::{build_listen_url, parse_transcript_event, ControlMessage, TranscriptUpdate};

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::audio::AudioFrame;
use crate::session::SessionError;

/// Event emitted by the link toward the session.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// A transcript update: zero or more non-final (interim) updates followed
    /// by exactly one final update per utterance, in chronological order.
    Transcript { text: String, is_final: bool },
    /// The connection failed to open or dropped; the session decides how to
    /// surface it.
    Error(SessionError),
}

/// Configuration for the streaming backend connection.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// WebSocket endpoint of the transcription backend
    pub endpoint: String,
    /// API key sent in the `Authorization` header
    pub api_key: String,
    /// Transcription model name
    pub model: String,
    /// PCM sample rate the session will send
    pub sample_rate: u32,
    /// PCM channel count the session will send
    pub channels: u16,
    /// Request interim (non-final) transcript updates
    pub interim_results: bool,
    /// Backend-side punctuation
    pub punctuate: bool,
    /// Backend-side smart formatting (dates, numbers, etc.)
    pub smart_format: bool,
    /// Interval between `KeepAlive` control messages, so the backend does
    /// not drop the connection during silence or the post-stop flush window
    pub keepalive_interval: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://api.deepgram.com/v1/listen".to_string(),
            api_key: String::new(),
            model: "nova-2".to_string(),
            sample_rate: 16000,
            channels: 1,
            interim_results: true,
            punctuate: true,
            smart_format: false,
            keepalive_interval: Duration::from_secs(5),
        }
    }
}

/// Streaming transcription connection.
///
/// At most one connection may be open per link instance; the session opens a
/// fresh link for every start-request and disconnects it before reconnecting.
#[async_trait::async_trait]
pub trait TranscriptionLink: Send + Sync {
    /// Open the connection asynchronously. Returns once the I/O task is
    /// spawned; readiness is observed via `is_connected()`. A failed dial is
    /// reported as `LinkEvent::Error`, not as a return value.
    async fn connect(&self, events: mpsc::Sender<LinkEvent>) -> Result<()>;

    /// Non-blocking readiness probe.
    fn is_connected(&self) -> bool;

    /// Forward one audio frame. A silent no-op before the connection is
    /// ready; never panics.
    async fn send_audio(&self, frame: AudioFrame) -> Result<()>;

    /// Close the connection. Idempotent, bounded, and safe to call when
    /// never connected. A deliberate disconnect never surfaces
    /// `ConnectionLost`.
    async fn disconnect(&self) -> Result<()>;
}

/// Creates a fresh link per start-request.
pub trait LinkFactory: Send + Sync {
    fn create(&self, api_key: &str) -> Arc<dyn TranscriptionLink>;
}
