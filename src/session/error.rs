use thiserror::Error;

/// Failure taxonomy for a transcription session.
///
/// `PermissionDenied` and `MissingCredential` are guard failures: the session
/// stays in `Idle` and the caller is expected to redirect the user to the
/// appropriate prompt. The remaining variants funnel into the `Error` state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Microphone access was denied by the user or platform.
    #[error("microphone permission denied")]
    PermissionDenied,

    /// No API key is configured for the transcription backend.
    #[error("no API key configured")]
    MissingCredential,

    /// The streaming connection could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The streaming connection dropped while the session was active.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The audio capture device failed.
    #[error("audio device error: {0}")]
    DeviceError(String),
}
