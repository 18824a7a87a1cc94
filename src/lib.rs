pub mod audio;
pub mod config;
pub mod link;
pub mod session;

pub use audio::{AudioCapture, AudioFrame, CaptureConfig, MicrophoneCapture};
pub use config::{Config, CredentialStore};
pub use link::{
    DeepgramLink, DeepgramLinkFactory, LinkConfig, LinkEvent, LinkFactory, TranscriptionLink,
};
pub use session::{
    SessionConfig, SessionController, SessionError, SessionSnapshot, SessionState, Transcript,
    TranscriptSegment,
};
