//! Bidirectional streaming channel to the conversational audio service.
//!
//! # Overview
//!
//! [`Transport`] is the seam the session controller talks to. `open` returns
//! a [`TransportLink`]: a bounded outbound queue of [`TransportCommand`]s and
//! an inbound stream of [`TransportEvent`]s. The link's worker task owns the
//! socket; dropping the outbound sender (or sending
//! [`TransportCommand::Close`]) closes it.
//!
//! [`GeminiLiveTransport`] is the production implementation over a Gemini
//! Live WebSocket.

pub mod gemini;
pub mod message;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::audio::EncodedChunk;
use crate::config::LiveConfig;

pub use gemini::GeminiLiveTransport;
pub use message::{parse_server_frame, realtime_input_message, setup_message, ServerFrame};

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// Failures while opening or running the streaming channel.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no API key configured for the live service")]
    MissingApiKey,

    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("no answer from the live service within {0}s")]
    Timeout(u64),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Content of one inbound service message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServerMessage {
    /// Raw PCM16 LE speech at the playback rate, in receipt order.
    pub audio_chunks: Vec<Vec<u8>>,
    /// Transcript fragment of the operator's speech.
    pub input_transcript: Option<String>,
    /// Transcript fragment of the assistant's speech.
    pub output_transcript: Option<String>,
    /// The operator barged in; queued speech must stop.
    pub interrupted: bool,
    /// The assistant finished its turn.
    pub turn_complete: bool,
}

impl ServerMessage {
    pub fn has_audio(&self) -> bool {
        !self.audio_chunks.is_empty()
    }
}

/// Inbound events, delivered in the order the service produced them.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The service accepted the session setup; audio may flow.
    Open,
    Message(ServerMessage),
    /// The channel failed. No further events follow.
    Error(String),
    /// The channel closed normally. No further events follow.
    Closed(Option<String>),
}

/// Outbound requests to the link's worker.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCommand {
    Audio(EncodedChunk),
    Close,
}

/// An open channel: send with `outbound`, receive from `events`.
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::Sender<TransportCommand>,
    pub events: mpsc::Receiver<TransportEvent>,
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Opens streaming channels to the conversational audio service.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect and send the session setup described by `config`.
    ///
    /// Returning `Ok` does not mean the session is usable yet; wait for
    /// [`TransportEvent::Open`].
    async fn open(&self, config: &LiveConfig) -> Result<TransportLink, TransportError>;
}

// Compile-time assertion: Arc<dyn Transport> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: std::sync::Arc<dyn Transport>) {}
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_display() {
        assert!(TransportError::MissingApiKey.to_string().contains("API key"));
        let e = TransportError::Connect("refused".into());
        assert!(e.to_string().contains("refused"));
        assert!(TransportError::Timeout(10).to_string().contains("10s"));
    }

    #[test]
    fn server_message_audio_flag() {
        let mut msg = ServerMessage::default();
        assert!(!msg.has_audio());
        msg.audio_chunks.push(vec![0, 0]);
        assert!(msg.has_audio());
    }
}
