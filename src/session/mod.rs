//! Recording session management
//!
//! This module provides the `SessionController` abstraction that manages:
//! - The session state machine (Idle / Recording / Processing / Error)
//! - Wiring microphone capture into the transcription link
//! - Reduction of interim and final transcript events into an ordered
//!   transcript
//! - The read-only snapshot surface consumed by presentation layers

mod config;
mod controller;
mod error;
mod snapshot;
mod transcript;

pub use config::SessionConfig;
pub use controller::SessionController;
pub use error::SessionError;
pub use snapshot::{SessionSnapshot, SessionState};
pub use transcript::{Transcript, TranscriptSegment};
