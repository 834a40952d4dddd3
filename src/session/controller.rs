//! Session controller: the single task that owns a duplex audio session.
//!
//! [`SessionController::run`] `select!`s over five sources and handles each
//! event to completion before taking the next:
//!
//! ```text
//! SessionCommand (caller)    ──▶ connect / disconnect
//! Opening        (connect)   ──▶ install speaker and link, or fail
//! TransportEvent (service)   ──▶ open capture / schedule audio / teardown
//! EncodedChunk   (microphone)──▶ try_send to the transport (Connected only)
//! HandleId       (speaker)   ──▶ retire finished playback buffer
//! ```
//!
//! Acquiring the speaker and opening the link run as a pending future polled
//! by the same `select!`, so a slow handshake never holds up a disconnect.
//!
//! Devices and the transport link are owned `Option` fields, so a teardown
//! is just `take()` and close; running it twice is harmless.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::audio::{AudioDevices, CapturePipeline, EncodedChunk, HandleId, PlaybackPipeline};
use crate::config::AppConfig;
use crate::transport::{ServerMessage, Transport, TransportCommand, TransportEvent, TransportLink};

use super::error::SessionError;
use super::state::{read_status, SessionState, SessionStatus, SharedStatus};

/// Reason attached to the close event of a caller-initiated disconnect.
pub const CLIENT_DISCONNECT_REASON: &str = "disconnected by client";

/// Speaker and link acquired by one connect.
type OpenOutcome = Result<(PlaybackPipeline, TransportLink), SessionError>;

/// A connect in progress. Dropping it releases whatever it acquired.
type Opening = Pin<Box<dyn Future<Output = OpenOutcome> + Send>>;

// ---------------------------------------------------------------------------
// Commands and events
// ---------------------------------------------------------------------------

/// Requests from a [`SessionHandle`].
#[derive(Debug)]
pub enum SessionCommand {
    /// Start a session and report its lifecycle on `events`.
    Connect {
        events: mpsc::UnboundedSender<SessionEvent>,
    },
    Disconnect,
}

/// Lifecycle notifications sent to the observer passed to `connect`.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The service accepted the session and the microphone is live.
    Opened,
    /// An inbound message, after its audio has been scheduled.
    Message(ServerMessage),
    /// The session failed and has been torn down. Sent once.
    Error(SessionError),
    /// The session ended without error.
    Closed(Option<String>),
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Caller-side handle to a running [`SessionController`]. Cheap to clone.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    status: SharedStatus,
}

impl SessionHandle {
    pub(crate) fn new(commands: mpsc::Sender<SessionCommand>, status: SharedStatus) -> Self {
        Self { commands, status }
    }

    /// Ask the controller to connect. A no-op if already connecting or
    /// connected; the outcome arrives on `events`.
    pub async fn connect(
        &self,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<(), SessionError> {
        self.commands
            .send(SessionCommand::Connect { events })
            .await
            .map_err(|_| SessionError::ControllerGone)
    }

    /// Ask the controller to tear everything down. Safe in any state.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.commands
            .send(SessionCommand::Disconnect)
            .await
            .map_err(|_| SessionError::ControllerGone)
    }

    pub fn status(&self) -> SessionStatus {
        read_status(&self.status)
    }

    pub fn state(&self) -> SessionState {
        self.status().state
    }
}

// ---------------------------------------------------------------------------
// SessionController
// ---------------------------------------------------------------------------

/// Owns the capture pipeline, the playback pipeline and the transport link
/// of one session at a time.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use extruder_voice::audio::CpalDevices;
/// use extruder_voice::config::AppConfig;
/// use extruder_voice::session::{new_shared_status, SessionController};
/// use extruder_voice::transport::GeminiLiveTransport;
///
/// # async fn example() {
/// let config = AppConfig::default();
/// let controller = SessionController::new(
///     config.clone(),
///     Arc::new(GeminiLiveTransport::new(config.audio.outbound_queue)),
///     Arc::new(CpalDevices::new(&config.audio)),
///     new_shared_status(),
/// );
/// let (_commands_tx, commands_rx) = tokio::sync::mpsc::channel(8);
/// controller.run(commands_rx).await;
/// # }
/// ```
pub struct SessionController {
    config: AppConfig,
    transport: Arc<dyn Transport>,
    devices: Arc<dyn AudioDevices>,
    status: SharedStatus,

    state: SessionState,
    observer: Option<mpsc::UnboundedSender<SessionEvent>>,
    opening: Option<Opening>,
    link: Option<TransportLink>,
    capture: Option<CapturePipeline>,
    playback: Option<PlaybackPipeline>,
}

impl SessionController {
    pub fn new(
        config: AppConfig,
        transport: Arc<dyn Transport>,
        devices: Arc<dyn AudioDevices>,
        status: SharedStatus,
    ) -> Self {
        Self {
            config,
            transport,
            devices,
            status,
            state: SessionState::Disconnected,
            observer: None,
            opening: None,
            link: None,
            capture: None,
            playback: None,
        }
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run until `commands` is closed, then release everything.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        loop {
            let opening = self.opening.as_mut();
            let link_events = self.link.as_mut().map(|link| &mut link.events);
            let capture = self.capture.as_mut();
            let playback = self.playback.as_mut();

            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                opened = next_opened(opening) => {
                    self.opening = None;
                    self.on_opened(opened);
                }
                event = recv_opt(link_events) => {
                    // A worker that vanished without a terminal event counts as closed.
                    let event = event.unwrap_or(TransportEvent::Closed(None));
                    self.handle_transport_event(event).await;
                }
                chunk = next_chunk(capture) => match chunk {
                    Some(chunk) => self.forward_chunk(chunk),
                    None => self.fail(SessionError::Device("microphone stream ended".into())),
                },
                id = next_completed(playback) => match id {
                    Some(id) => self.on_completed(id),
                    None => self.fail(SessionError::Device("output stream ended".into())),
                },
            }
        }

        log::info!("session: command channel closed, controller shutting down");
        self.disconnect();
    }

    // -----------------------------------------------------------------------
    // Caller commands
    // -----------------------------------------------------------------------

    fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Connect { events } => self.connect(events),
            SessionCommand::Disconnect => self.disconnect(),
        }
    }

    /// Disconnected / Error → Connecting: start acquiring the output device
    /// and then opening the transport. The microphone waits for the
    /// transport's `Open`.
    fn connect(&mut self, events: mpsc::UnboundedSender<SessionEvent>) {
        if self.state.is_active() {
            log::debug!("session: already connecting");
            return;
        }

        self.observer = Some(events);
        self.set_state(SessionState::Connecting);
        self.with_status(|st| st.last_error = None);
        log::info!("session: connecting");
        self.opening = Some(self.open_link());
    }

    fn open_link(&self) -> Opening {
        let devices = Arc::clone(&self.devices);
        let transport = Arc::clone(&self.transport);
        let live = self.config.live.clone();
        let sample_rate = self.config.audio.playback_sample_rate;

        Box::pin(async move {
            let playback = PlaybackPipeline::open(&*devices, sample_rate).await?;
            match transport.open(&live).await {
                Ok(link) => Ok((playback, link)),
                Err(e) => {
                    playback.close();
                    Err(e.into())
                }
            }
        })
    }

    /// The connect started by [`connect`](Self::connect) has finished.
    fn on_opened(&mut self, opened: OpenOutcome) {
        match opened {
            Ok((playback, link)) => {
                self.playback = Some(playback);
                self.link = Some(link);
                log::debug!("session: link open, waiting for the service");
                self.refresh_status();
            }
            Err(e) => self.fail(e),
        }
    }

    /// Any state → Disconnected. Emits `Closed` only if a session was
    /// active.
    fn disconnect(&mut self) {
        let was_active = self.state.is_active();
        self.teardown();
        self.set_state(SessionState::Disconnected);
        if was_active {
            log::info!("session: disconnected by client");
            self.emit(SessionEvent::Closed(Some(CLIENT_DISCONNECT_REASON.into())));
        }
        self.observer = None;
    }

    // -----------------------------------------------------------------------
    // Transport events
    // -----------------------------------------------------------------------

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => self.on_open().await,
            TransportEvent::Message(msg) => self.on_message(msg),
            TransportEvent::Error(cause) => self.fail(SessionError::Transport(cause)),
            TransportEvent::Closed(reason) => {
                log::info!("session: closed by service ({reason:?})");
                self.teardown();
                self.set_state(SessionState::Disconnected);
                self.emit(SessionEvent::Closed(reason));
                self.observer = None;
            }
        }
    }

    /// Connecting → Connected: acquire the microphone and start streaming.
    async fn on_open(&mut self) {
        if self.state != SessionState::Connecting {
            log::debug!("session: ignoring open in state {}", self.state.label());
            return;
        }

        match CapturePipeline::open(&*self.devices, &self.config.audio).await {
            Ok(capture) => {
                self.capture = Some(capture);
                self.set_state(SessionState::Connected);
                log::info!("session: connected");
                self.emit(SessionEvent::Opened);
            }
            Err(e) => self.fail(e.into()),
        }
    }

    /// Interrupt first, then schedule the message's audio in order.
    fn on_message(&mut self, msg: ServerMessage) {
        if let Some(playback) = self.playback.as_mut() {
            if msg.interrupted {
                let stopped = playback.interrupt();
                log::debug!("session: interrupted, {stopped} buffer(s) stopped");
            }
            for payload in &msg.audio_chunks {
                if let Err(e) = playback.enqueue(payload) {
                    log::warn!("session: dropping inbound audio: {e}");
                }
            }
        }
        if let Some(text) = &msg.input_transcript {
            log::debug!("session: operator said {text:?}");
        }
        self.refresh_status();
        self.emit(SessionEvent::Message(msg));
    }

    // -----------------------------------------------------------------------
    // Device events
    // -----------------------------------------------------------------------

    /// Hand a captured chunk to the transport without waiting.
    fn forward_chunk(&mut self, chunk: EncodedChunk) {
        if self.state != SessionState::Connected {
            return;
        }
        let Some(link) = &self.link else {
            return;
        };
        match link.outbound.try_send(TransportCommand::Audio(chunk)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::debug!("session: outbound queue full, dropping captured chunk");
            }
            // The worker's terminal event is already on its way.
            Err(TrySendError::Closed(_)) => {}
        }
    }

    fn on_completed(&mut self, id: HandleId) {
        if let Some(playback) = self.playback.as_mut() {
            if !playback.on_completed(id) {
                log::trace!("session: stale completion for #{id}");
            }
        }
        self.refresh_status();
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Release everything and enter `Error`, reporting `err` once.
    fn fail(&mut self, err: SessionError) {
        log::error!("session: {err}");
        self.teardown();
        self.set_state(SessionState::Error);
        self.with_status(|st| st.last_error = Some(err.to_string()));
        self.emit(SessionEvent::Error(err));
        self.observer = None;
    }

    /// Pending connect first, then microphone, link and speaker.
    fn teardown(&mut self) {
        if self.opening.take().is_some() {
            log::debug!("session: abandoning connect in progress");
        }
        if let Some(capture) = self.capture.take() {
            capture.close();
        }
        if let Some(link) = self.link.take() {
            // Dropping the sender closes the link even if the queue is full.
            let _ = link.outbound.try_send(TransportCommand::Close);
        }
        if let Some(playback) = self.playback.take() {
            playback.close();
        }
        self.refresh_status();
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn emit(&self, event: SessionEvent) {
        if let Some(observer) = &self.observer {
            if observer.send(event).is_err() {
                log::debug!("session: observer gone, event dropped");
            }
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            log::debug!("session: {} → {}", self.state.label(), state.label());
        }
        self.state = state;
        self.refresh_status();
    }

    fn refresh_status(&self) {
        let state = self.state;
        let live_handles = self.playback.as_ref().map_or(0, PlaybackPipeline::live_count);
        let capture_active = self.capture.is_some();
        self.with_status(|st| {
            st.state = state;
            st.live_handles = live_handles;
            st.capture_active = capture_active;
        });
    }

    fn with_status(&self, f: impl FnOnce(&mut SessionStatus)) {
        let mut st = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut st);
    }
}

async fn next_opened(opening: Option<&mut Opening>) -> OpenOutcome {
    match opening {
        Some(opening) => opening.await,
        None => std::future::pending().await,
    }
}

/// Receive from an optional channel; pends forever when there is none.
async fn recv_opt<T>(rx: Option<&mut mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_chunk(capture: Option<&mut CapturePipeline>) -> Option<EncodedChunk> {
    match capture {
        Some(capture) => capture.next_chunk().await,
        None => std::future::pending().await,
    }
}

async fn next_completed(playback: Option<&mut PlaybackPipeline>) -> Option<HandleId> {
    match playback {
        Some(playback) => playback.next_completed().await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
