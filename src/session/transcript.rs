use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A finalized transcript segment.
///
/// Immutable once created; only backend-confirmed final updates produce
/// segments. Ids are a process-local monotone counter, so generation order is
/// arrival order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptSegment {
    /// Unique id; never reused, strictly increasing
    pub id: u64,

    /// Transcribed text (non-empty)
    pub text: String,

    /// When this segment was received
    pub created_at: DateTime<Utc>,

    /// Always true for stored segments; interim text is never stored here
    pub is_final: bool,
}

/// The ordered transcript of one session: append-only final segments plus at
/// most one interim text.
///
/// Interim text is replaced wholesale on every non-final update and cleared
/// when a final update arrives or the session stops. It never reaches the
/// segment list, so a late interim arriving after a final can only repaint
/// the provisional line; stored segments are never corrupted.
#[derive(Debug, Default)]
pub struct Transcript {
    segments: Vec<TranscriptSegment>,
    interim: Option<String>,
    next_id: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reduce one transcript update into the model.
    ///
    /// Empty updates are dropped; segments must carry non-empty text.
    pub fn apply(&mut self, text: &str, is_final: bool) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        if is_final {
            let id = self.next_id;
            self.next_id += 1;
            self.segments.push(TranscriptSegment {
                id,
                text: text.to_string(),
                created_at: Utc::now(),
                is_final: true,
            });
            self.interim = None;
        } else {
            self.interim = Some(text.to_string());
        }
    }

    /// Drop the interim text without touching stored segments (used when the
    /// session stops while an utterance is still provisional).
    pub fn clear_interim(&mut self) {
        self.interim = None;
    }

    /// Atomically empty the transcript. Ids are not reused afterwards.
    pub fn clear(&mut self) {
        self.segments.clear();
        self.interim = None;
    }

    pub fn segments(&self) -> &[TranscriptSegment] {
        &self.segments
    }

    pub fn interim(&self) -> Option<&str> {
        self.interim.as_deref()
    }

    /// The full finalized text, segments joined in arrival order.
    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
