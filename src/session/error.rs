//! Errors surfaced to the session's observer.

use thiserror::Error;

use crate::audio::DeviceError;
use crate::transport::TransportError;

/// A terminal session failure, reported once via `SessionEvent::Error`.
///
/// Carries strings rather than the source errors so it can be cloned into
/// the shared status and sent across channels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("audio device error: {0}")]
    Device(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("session task is no longer running")]
    ControllerGone,
}

impl From<DeviceError> for SessionError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::PermissionDenied(msg) => SessionError::PermissionDenied(msg),
            other => SessionError::Device(other.to_string()),
        }
    }
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        SessionError::Transport(err.to_string())
    }
}
