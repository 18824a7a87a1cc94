use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier
    pub session_id: String,

    /// PCM sample rate the transcription backend expects
    pub target_sample_rate: u32,

    /// PCM channel count the transcription backend expects (1 = mono)
    pub target_channels: u16,

    /// Interval between link readiness probes after a start-request
    pub connect_poll: Duration,

    /// Upper bound on waiting for the link to become ready; exceeding it
    /// fails the start-request instead of spinning forever
    pub connect_timeout: Duration,

    /// How long the link stays open after capture stops, so trailing audio
    /// can still produce a final transcript
    pub flush_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            target_sample_rate: 16000, // Backend contract: linear16 mono 16kHz
            target_channels: 1,
            connect_poll: Duration::from_millis(50),
            connect_timeout: Duration::from_secs(5),
            flush_grace: Duration::from_secs(3),
        }
    }
}
