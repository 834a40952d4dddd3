//! Gemini Live transport over a WebSocket.
//!
//! ```text
//!  SessionController                 LinkWorker (tokio task)            service
//!  ─────────────────                 ───────────────────────            ───────
//!  outbound.try_send(Audio) ───────► realtimeInput JSON ──────────────► ws write
//!  events.recv()            ◄─────── Open / Message / Error / Closed ◄─ ws read
//! ```
//!
//! `open` connects, sends the `setup` message and hands the socket to a
//! worker task. Connecting and sending setup together are bounded by
//! [`LiveConfig::connect_timeout_secs`]. The worker emits [`TransportEvent::Open`] once the service
//! answers `setupComplete`, and exactly one terminal event (`Error` or
//! `Closed`) before it exits.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::message::{parse_server_frame, realtime_input_message, setup_message, ServerFrame};
use super::{Transport, TransportCommand, TransportError, TransportEvent, TransportLink};
use crate::config::LiveConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default capacity of the inbound event queue.
const DEFAULT_EVENT_QUEUE: usize = 64;
/// Default capacity of the outbound command queue.
const DEFAULT_OUTBOUND_QUEUE: usize = 64;

// ---------------------------------------------------------------------------
// GeminiLiveTransport
// ---------------------------------------------------------------------------

/// Opens Gemini Live sessions.
#[derive(Debug, Clone)]
pub struct GeminiLiveTransport {
    outbound_queue: usize,
    event_queue: usize,
}

impl GeminiLiveTransport {
    /// `outbound_queue` bounds the audio chunks waiting for the socket.
    pub fn new(outbound_queue: usize) -> Self {
        Self {
            outbound_queue: outbound_queue.max(1),
            event_queue: DEFAULT_EVENT_QUEUE,
        }
    }
}

impl Default for GeminiLiveTransport {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOUND_QUEUE)
    }
}

#[async_trait]
impl Transport for GeminiLiveTransport {
    async fn open(&self, config: &LiveConfig) -> Result<TransportLink, TransportError> {
        let url = live_url(config)?;
        let setup = setup_message(config)?;

        log::info!(
            "transport: connecting to {} (model {})",
            config.endpoint,
            config.model
        );
        let secs = config.connect_timeout_secs.max(1);
        let (write, read) =
            tokio::time::timeout(Duration::from_secs(secs), handshake(&url, setup))
                .await
                .map_err(|_| TransportError::Timeout(secs))??;
        log::debug!("transport: setup sent");

        let (outbound_tx, outbound_rx) = mpsc::channel(self.outbound_queue);
        let (event_tx, event_rx) = mpsc::channel(self.event_queue);

        let worker = LinkWorker {
            write,
            read,
            commands: outbound_rx,
            events: event_tx,
        };
        tokio::spawn(worker.run());

        Ok(TransportLink {
            outbound: outbound_tx,
            events: event_rx,
        })
    }
}

/// Connect and send `setup`.
async fn handshake(
    url: &Url,
    setup: String,
) -> Result<(SplitSink<WsStream, Message>, SplitStream<WsStream>), TransportError> {
    let (ws, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;

    let (mut write, read) = ws.split();
    write
        .send(Message::Text(setup.into()))
        .await
        .map_err(|e| TransportError::WebSocket(e.to_string()))?;
    Ok((write, read))
}

/// Endpoint URL with the API key as the `key` query parameter.
fn live_url(config: &LiveConfig) -> Result<Url, TransportError> {
    let key = config
        .api_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .ok_or(TransportError::MissingApiKey)?;

    let mut url = Url::parse(&config.endpoint)?;
    url.query_pairs_mut().append_pair("key", key);
    Ok(url)
}

// ---------------------------------------------------------------------------
// LinkWorker
// ---------------------------------------------------------------------------

struct LinkWorker {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    commands: mpsc::Receiver<TransportCommand>,
    events: mpsc::Sender<TransportEvent>,
}

impl LinkWorker {
    async fn run(mut self) {
        let terminal = self.pump().await;
        match &terminal {
            TransportEvent::Error(e) => log::warn!("transport: link failed: {e}"),
            TransportEvent::Closed(reason) => log::info!("transport: link closed ({reason:?})"),
            _ => {}
        }
        // The receiver may already be gone when the session closed us.
        let _ = self.events.send(terminal).await;
    }

    /// Move frames both ways until the link ends; returns the terminal event.
    async fn pump(&mut self) -> TransportEvent {
        loop {
            tokio::select! {
                msg = self.read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if !self.handle_text(text.as_str()).await {
                                return TransportEvent::Closed(None);
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            match std::str::from_utf8(&data) {
                                Ok(text) => {
                                    if !self.handle_text(text).await {
                                        return TransportEvent::Closed(None);
                                    }
                                }
                                Err(_) => log::warn!(
                                    "transport: ignoring non-UTF-8 binary frame ({} bytes)",
                                    data.len()
                                ),
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame
                                .map(|f| f.reason.as_str().to_owned())
                                .filter(|r| !r.is_empty());
                            return TransportEvent::Closed(reason);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return TransportEvent::Error(e.to_string()),
                        None => return TransportEvent::Closed(None),
                    }
                }
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(TransportCommand::Audio(chunk)) => {
                            let json = match realtime_input_message(&chunk) {
                                Ok(json) => json,
                                Err(e) => {
                                    log::warn!("transport: dropping chunk: {e}");
                                    continue;
                                }
                            };
                            if let Err(e) = self.write.send(Message::Text(json.into())).await {
                                return TransportEvent::Error(e.to_string());
                            }
                        }
                        Some(TransportCommand::Close) | None => {
                            let _ = self.write.send(Message::Close(None)).await;
                            let _ = self.write.close().await;
                            return TransportEvent::Closed(None);
                        }
                    }
                }
            }
        }
    }

    /// Forward one JSON frame. Returns `false` once nobody listens for
    /// events any more.
    async fn handle_text(&mut self, text: &str) -> bool {
        let event = match parse_server_frame(text) {
            Ok(ServerFrame::SetupComplete) => {
                log::info!("transport: setup complete");
                TransportEvent::Open
            }
            Ok(ServerFrame::Content(msg)) => TransportEvent::Message(msg),
            Ok(ServerFrame::GoAway(time_left)) => {
                log::warn!("transport: service going away (time left {time_left:?})");
                return true;
            }
            Ok(ServerFrame::Other) => return true,
            Err(e) => {
                log::warn!("transport: unparseable frame: {e}");
                return true;
            }
        };
        self.events.send(event).await.is_ok()
    }
}
