//! Duplex session: state machine, caller handle and observer events.
//!
//! # Architecture
//!
//! ```text
//! SessionHandle ──SessionCommand (mpsc)──▶ SessionController::run()  ← tokio task
//!                                              │
//!                                              ├─ PlaybackPipeline  (speaker, per connect)
//!                                              ├─ TransportLink     (service, per connect)
//!                                              └─ CapturePipeline   (microphone, Connected only)
//!
//! observer ◀──SessionEvent (unbounded mpsc)── Opened / Message / Error / Closed
//! SharedStatus (Arc<Mutex<SessionStatus>>) ◀── refreshed after every event
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use extruder_voice::audio::CpalDevices;
//! use extruder_voice::config::AppConfig;
//! use extruder_voice::session::{self, SessionEvent};
//! use extruder_voice::transport::GeminiLiveTransport;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let (handle, _task) = session::spawn(
//!         config.clone(),
//!         Arc::new(GeminiLiveTransport::new(config.audio.outbound_queue)),
//!         Arc::new(CpalDevices::new(&config.audio)),
//!     );
//!
//!     let (events_tx, mut events) = mpsc::unbounded_channel();
//!     handle.connect(events_tx).await.unwrap();
//!     while let Some(event) = events.recv().await {
//!         if matches!(event, SessionEvent::Closed(_) | SessionEvent::Error(_)) {
//!             break;
//!         }
//!     }
//! }
//! ```

pub mod controller;
pub mod error;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::audio::AudioDevices;
use crate::config::AppConfig;
use crate::transport::Transport;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use controller::{
    SessionCommand, SessionController, SessionEvent, SessionHandle, CLIENT_DISCONNECT_REASON,
};
pub use error::SessionError;
pub use state::{new_shared_status, read_status, SessionState, SessionStatus, SharedStatus};

/// Capacity of the caller → controller command queue.
const COMMAND_QUEUE: usize = 16;

/// Spawn a [`SessionController`] on the current tokio runtime.
///
/// The controller stops, releasing any devices it holds, once every clone of
/// the returned handle has been dropped.
pub fn spawn(
    config: AppConfig,
    transport: Arc<dyn Transport>,
    devices: Arc<dyn AudioDevices>,
) -> (SessionHandle, JoinHandle<()>) {
    let status = new_shared_status();
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE);
    let controller = SessionController::new(config, transport, devices, Arc::clone(&status));
    let task = tokio::spawn(controller.run(commands_rx));
    (SessionHandle::new(commands_tx, status), task)
}
