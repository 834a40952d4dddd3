//! Session state machine and shared status.
//!
//! [`SessionState`] is owned by the controller task. A snapshot of it, plus
//! a few live counters, is published in [`SessionStatus`] behind
//! [`SharedStatus`] so callers can inspect the session without messaging it.

use std::sync::{Arc, Mutex, PoisonError};

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// States of the duplex session.
///
/// ```text
/// Disconnected ──connect──▶ Connecting ──transport open──▶ Connected
/// Error        ──connect──▶ Connecting
/// Connecting / Connected ──transport closed──▶ Disconnected
/// Connecting / Connected ──failure──────────▶ Error
/// any state ──disconnect──▶ Disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No devices held, no channel open.
    #[default]
    Disconnected,

    /// Output device acquired; waiting for the service to accept the setup.
    Connecting,

    /// Audio flows both ways. The microphone is held only in this state.
    Connected,

    /// A failure ended the last session. Everything has been released.
    Error,
}

impl SessionState {
    /// `true` while a session is being set up or running.
    ///
    /// ```
    /// use extruder_voice::session::SessionState;
    ///
    /// assert!(!SessionState::Disconnected.is_active());
    /// assert!(SessionState::Connecting.is_active());
    /// assert!(SessionState::Connected.is_active());
    /// assert!(!SessionState::Error.is_active());
    /// ```
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Connected)
    }

    /// A short human-readable label for status displays.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Connecting => "Connecting",
            SessionState::Connected => "Connected",
            SessionState::Error => "Error",
        }
    }
}

// ---------------------------------------------------------------------------
// SessionStatus
// ---------------------------------------------------------------------------

/// Snapshot published by the controller after every event it handles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Playback buffers scheduled and not yet finished.
    pub live_handles: usize,
    /// Whether the microphone is currently held.
    pub capture_active: bool,
    /// Message of the failure that put the session in `Error`.
    pub last_error: Option<String>,
}

/// Thread-safe handle to [`SessionStatus`]. Do not hold the lock across
/// `.await` points.
pub type SharedStatus = Arc<Mutex<SessionStatus>>;

pub fn new_shared_status() -> SharedStatus {
    Arc::new(Mutex::new(SessionStatus::default()))
}

/// Copy out the current status, recovering from a poisoned lock.
pub fn read_status(status: &SharedStatus) -> SessionStatus {
    status
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_disconnected() {
        assert_eq!(SessionState::default(), SessionState::Disconnected);
        assert_eq!(SessionStatus::default().state, SessionState::Disconnected);
    }

    #[test]
    fn labels() {
        assert_eq!(SessionState::Disconnected.label(), "Disconnected");
        assert_eq!(SessionState::Connecting.label(), "Connecting");
        assert_eq!(SessionState::Connected.label(), "Connected");
        assert_eq!(SessionState::Error.label(), "Error");
    }

    #[test]
    fn shared_status_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedStatus>();
    }

    #[test]
    fn shared_status_can_be_cloned_and_mutated() {
        let status = new_shared_status();
        let status2 = Arc::clone(&status);

        status.lock().unwrap().state = SessionState::Connected;
        assert_eq!(read_status(&status2).state, SessionState::Connected);
    }
}
