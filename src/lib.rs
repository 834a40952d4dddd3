//! Duplex real-time audio session for the extruder control panel's voice
//! support assistant.
//!
//! ```text
//! Microphone ─▶ CaptureDevice ─▶ SessionController ─▶ encode ─▶ Transport
//!                                       ▲                          │
//!                                       │                          ▼
//! Speaker ◀─ OutputDevice ◀─ PlaybackPipeline ◀─ decode ◀─ ServerMessage
//! ```
//!
//! See [`session`] for the state machine, [`audio`] for the capture and
//! playback pipelines, and [`transport`] for the streaming channel.

pub mod audio;
pub mod config;
pub mod session;
pub mod transport;
