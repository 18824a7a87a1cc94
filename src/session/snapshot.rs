use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::transcript::TranscriptSegment;

/// Lifecycle state of the recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Not recording; ready for a start-request
    Idle,
    /// Capturing audio and streaming it to the backend
    Recording,
    /// Capture stopped, waiting out the flush grace window
    Processing,
    /// A connection or device failure; requires an explicit restart
    Error,
}

/// Read-only view of the session for presentation layers.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Current lifecycle state
    pub state: SessionState,

    /// Whether the transcription link is currently connected
    pub connected: bool,

    /// Finalized transcript segments in arrival order
    pub segments: Vec<TranscriptSegment>,

    /// Provisional text for the utterance in flight, if any
    pub interim: Option<String>,

    /// Human-readable message for the most recent failure
    pub last_error: Option<String>,

    /// When the current or most recent recording started
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds elapsed since `started_at`
    pub duration_secs: f64,
}
