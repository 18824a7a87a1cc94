use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::error::SessionError;
use super::snapshot::{SessionSnapshot, SessionState};
use super::transcript::Transcript;
use crate::audio::{convert_frame, AudioCapture};
use crate::link::{LinkEvent, LinkFactory, TranscriptionLink};

/// Upper bound on waiting for the event reducer to drain after the link
/// closes.
const REDUCER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// State shared between the controller, the event reducer, and the frame
/// pump. All transcript reductions and state transitions go through this one
/// lock, which is the crate's single event-processing context.
struct Shared {
    state: SessionState,
    connected: bool,
    last_error: Option<SessionError>,
    transcript: Transcript,
    started_at: Option<DateTime<Utc>>,
}

/// The orchestrator for one recording session.
///
/// Owns the session state machine, wires audio capture into the
/// transcription link, reduces link events into the transcript, and exposes a
/// read-only snapshot to observers. Exactly one link is open at a time: every
/// start-request tears down whatever came before it.
pub struct SessionController {
    config: SessionConfig,
    api_key: Option<String>,
    capture: Box<dyn AudioCapture>,
    links: Box<dyn LinkFactory>,
    shared: Arc<Mutex<Shared>>,
    link: Option<Arc<dyn TranscriptionLink>>,
    pump_task: Option<JoinHandle<()>>,
    event_task: Option<JoinHandle<()>>,
    /// Distinguishes a deliberate stop from the capture channel dying
    stopping: Arc<AtomicBool>,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        api_key: Option<String>,
        capture: Box<dyn AudioCapture>,
        links: Box<dyn LinkFactory>,
    ) -> Self {
        Self {
            config,
            api_key,
            capture,
            links,
            shared: Arc::new(Mutex::new(Shared {
                state: SessionState::Idle,
                connected: false,
                last_error: None,
                transcript: Transcript::new(),
                started_at: None,
            })),
            link: None,
            pump_task: None,
            event_task: None,
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    /// Request microphone permission up front (once per process). Denial is
    /// recorded but not fatal; the next start-request surfaces it again.
    pub async fn request_permission(&mut self) -> bool {
        let granted = match self.capture.request_permission().await {
            Ok(granted) => granted,
            Err(e) => {
                warn!("Permission request failed: {}", e);
                false
            }
        };

        if !granted {
            self.shared.lock().await.last_error = Some(SessionError::PermissionDenied);
        }

        granted
    }

    /// Start-request: `Idle`/`Error` → `Recording`.
    ///
    /// Guarded by a configured credential and granted microphone permission;
    /// guard failures leave the state untouched so the caller can redirect
    /// the user. Connection and device failures transition to `Error`.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        let api_key = match self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => key.to_string(),
            None => return Err(SessionError::MissingCredential),
        };

        if !self.request_permission().await {
            return Err(SessionError::PermissionDenied);
        }

        // Never two streams at once: fully tear down any previous session
        self.abort_previous().await;

        {
            let mut s = self.shared.lock().await;
            s.state = SessionState::Recording;
            s.last_error = None;
            s.started_at = Some(Utc::now());
            s.transcript.clear_interim();
        }
        info!("Starting session {}", self.config.session_id);

        let (event_tx, event_rx) = mpsc::channel::<LinkEvent>(64);
        let link = self.links.create(&api_key);
        if let Err(e) = link.connect(event_tx).await {
            let err = SessionError::ConnectionFailed(e.to_string());
            self.fail(err.clone()).await;
            return Err(err);
        }

        self.event_task = Some(tokio::spawn(reduce_events(
            event_rx,
            Arc::clone(&self.shared),
        )));

        // Connect-then-poll, with a hard bound so a dead backend cannot spin
        // the session forever
        let deadline = tokio::time::Instant::now() + self.config.connect_timeout;
        while !link.is_connected() {
            {
                let s = self.shared.lock().await;
                if s.state == SessionState::Error {
                    // The dial already failed; surface the reducer's error
                    let err = s.last_error.clone().unwrap_or_else(|| {
                        SessionError::ConnectionFailed("link failed while connecting".to_string())
                    });
                    drop(s);
                    let _ = link.disconnect().await;
                    return Err(err);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                let err = SessionError::ConnectionFailed(format!(
                    "link not ready within {:?}",
                    self.config.connect_timeout
                ));
                let _ = link.disconnect().await;
                self.fail(err.clone()).await;
                return Err(err);
            }
            tokio::time::sleep(self.config.connect_poll).await;
        }

        self.shared.lock().await.connected = true;
        info!("Transcription link ready");

        let mut frames = match self.capture.start().await {
            Ok(rx) => rx,
            Err(e) => {
                let err = SessionError::DeviceError(e.to_string());
                let _ = link.disconnect().await;
                self.fail(err.clone()).await;
                return Err(err);
            }
        };

        // Frame pump: capture → format conversion → link
        self.stopping.store(false, Ordering::SeqCst);
        let pump_link = Arc::clone(&link);
        let pump_shared = Arc::clone(&self.shared);
        let stopping = Arc::clone(&self.stopping);
        let target_rate = self.config.target_sample_rate;
        let target_channels = self.config.target_channels;

        self.pump_task = Some(tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                let frame = convert_frame(frame, target_rate, target_channels);
                if let Err(e) = pump_link.send_audio(frame).await {
                    warn!("Failed to forward audio frame: {}", e);
                }
            }

            // Frame channel closed. Without a stop-request this means the
            // device died; funnel it into the Error transition.
            if !stopping.load(Ordering::SeqCst) {
                let mut s = pump_shared.lock().await;
                if s.state == SessionState::Recording {
                    warn!("Audio capture ended unexpectedly");
                    s.state = SessionState::Error;
                    s.connected = false;
                    s.last_error = Some(SessionError::DeviceError(
                        "audio capture stopped unexpectedly".to_string(),
                    ));
                    drop(s);
                    let _ = pump_link.disconnect().await;
                }
            }
            debug!("Frame pump exiting");
        }));

        self.link = Some(link);
        info!("Session {} recording", self.config.session_id);
        Ok(())
    }

    /// Stop-request: `Recording` → `Processing` → `Idle`.
    ///
    /// Safe to call from any state; never blocks unboundedly. Capture is
    /// fully stopped before the link is touched, and the link stays open for
    /// the flush grace window so trailing audio can still produce a final
    /// transcript event.
    pub async fn stop(&mut self) {
        let prior = { self.shared.lock().await.state };
        if prior == SessionState::Idle && self.link.is_none() {
            return;
        }

        info!("Stopping session {}", self.config.session_id);
        self.stopping.store(true, Ordering::SeqCst);

        if prior == SessionState::Recording {
            self.shared.lock().await.state = SessionState::Processing;
        }

        // Ordering guarantee: capture halts before the link goes away
        if let Err(e) = self.capture.stop().await {
            warn!("Failed to stop audio capture: {}", e);
        }
        if let Some(pump) = self.pump_task.take() {
            let _ = pump.await;
        }

        if prior == SessionState::Recording && self.link.is_some() {
            debug!("Waiting {:?} for trailing transcripts", self.config.flush_grace);
            tokio::time::sleep(self.config.flush_grace).await;
        }

        self.teardown_link().await;

        let mut s = self.shared.lock().await;
        s.connected = false;
        s.state = SessionState::Idle;
        s.transcript.clear_interim();
        info!("Session {} idle", self.config.session_id);
    }

    /// Empty the transcript atomically. Does not touch session state; a
    /// recording session keeps recording.
    pub async fn clear_transcript(&self) {
        self.shared.lock().await.transcript.clear();
    }

    /// Read-only view for presentation layers.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let s = self.shared.lock().await;
        let duration_secs = s
            .started_at
            .map(|t| (Utc::now() - t).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        SessionSnapshot {
            state: s.state,
            connected: s.connected,
            segments: s.transcript.segments().to_vec(),
            interim: s.transcript.interim().map(str::to_string),
            last_error: s.last_error.as_ref().map(|e| e.to_string()),
            started_at: s.started_at,
            duration_secs,
        }
    }

    /// The full finalized transcript text.
    pub async fn full_text(&self) -> String {
        self.shared.lock().await.transcript.full_text()
    }

    async fn fail(&self, err: SessionError) {
        error!("Session error: {}", err);
        let mut s = self.shared.lock().await;
        s.state = SessionState::Error;
        s.connected = false;
        s.last_error = Some(err);
    }

    /// Immediate teardown of a previous session's stream and link, without
    /// the flush grace window. Used by start-requests.
    async fn abort_previous(&mut self) {
        self.stopping.store(true, Ordering::SeqCst);
        if self.capture.is_capturing() {
            if let Err(e) = self.capture.stop().await {
                warn!("Failed to stop previous capture: {}", e);
            }
        }
        if let Some(pump) = self.pump_task.take() {
            pump.abort();
        }
        self.teardown_link().await;
    }

    async fn teardown_link(&mut self) {
        if let Some(link) = self.link.take() {
            if let Err(e) = link.disconnect().await {
                warn!("Link disconnect failed: {}", e);
            }
        }
        if let Some(task) = self.event_task.take() {
            // The reducer drains once the link drops its event sender
            let abort = task.abort_handle();
            if tokio::time::timeout(REDUCER_DRAIN_TIMEOUT, task).await.is_err() {
                abort.abort();
            }
        }
    }
}

/// The single event-reduction task: drains link events into the shared
/// session state in arrival order.
async fn reduce_events(mut events: mpsc::Receiver<LinkEvent>, shared: Arc<Mutex<Shared>>) {
    while let Some(event) = events.recv().await {
        let mut s = shared.lock().await;
        match event {
            LinkEvent::Transcript { text, is_final } => {
                s.transcript.apply(&text, is_final);
            }
            LinkEvent::Error(err) => {
                error!("Link error: {}", err);
                s.state = SessionState::Error;
                s.connected = false;
                s.last_error = Some(err);
            }
        }
    }
    debug!("Event reducer exiting");
}
