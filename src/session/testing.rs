//! In-crate test doubles for the device and transport seams.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audio::{AudioDevices, AudioFrame, CaptureDevice, DeviceError, HandleId, OutputDevice};
use crate::config::LiveConfig;
use crate::transport::{Transport, TransportCommand, TransportError, TransportEvent, TransportLink};

// ---------------------------------------------------------------------------
// MockDevices
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DeviceLog {
    clock: f64,
    deny_input: bool,
    fail_output: bool,
    frames: Option<mpsc::Sender<AudioFrame>>,
    completed: Option<mpsc::UnboundedSender<HandleId>>,
    played: Vec<(HandleId, f64)>,
    stopped: Vec<HandleId>,
    inputs_open: usize,
    outputs_open: usize,
    input_acquisitions: usize,
    output_acquisitions: usize,
}

/// Records every acquisition, scheduled buffer and stop.
#[derive(Clone, Default)]
pub(crate) struct MockDevices {
    log: Arc<Mutex<DeviceLog>>,
}

impl MockDevices {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Refuse microphone access like an OS permission prompt would.
    pub(crate) fn deny_input(self) -> Self {
        self.log.lock().unwrap().deny_input = true;
        self
    }

    pub(crate) fn fail_output(self) -> Self {
        self.log.lock().unwrap().fail_output = true;
        self
    }

    /// Deliver a captured block. Returns `false` when no microphone is open.
    pub(crate) fn push_frame(&self, frame: AudioFrame) -> bool {
        let log = self.log.lock().unwrap();
        log.frames
            .as_ref()
            .is_some_and(|tx| tx.try_send(frame).is_ok())
    }

    pub(crate) fn set_clock(&self, secs: f64) {
        self.log.lock().unwrap().clock = secs;
    }

    /// `(id, start)` of every buffer handed to the output device.
    pub(crate) fn played(&self) -> Vec<(HandleId, f64)> {
        self.log.lock().unwrap().played.clone()
    }

    pub(crate) fn stopped(&self) -> Vec<HandleId> {
        self.log.lock().unwrap().stopped.clone()
    }

    /// Report `id` as fully rendered.
    pub(crate) fn complete(&self, id: HandleId) {
        if let Some(tx) = &self.log.lock().unwrap().completed {
            let _ = tx.send(id);
        }
    }

    pub(crate) fn inputs_open(&self) -> usize {
        self.log.lock().unwrap().inputs_open
    }

    pub(crate) fn outputs_open(&self) -> usize {
        self.log.lock().unwrap().outputs_open
    }

    pub(crate) fn input_acquisitions(&self) -> usize {
        self.log.lock().unwrap().input_acquisitions
    }

    pub(crate) fn output_acquisitions(&self) -> usize {
        self.log.lock().unwrap().output_acquisitions
    }
}

#[async_trait]
impl AudioDevices for MockDevices {
    async fn open_output(
        &self,
        completed: mpsc::UnboundedSender<HandleId>,
    ) -> Result<Box<dyn OutputDevice>, DeviceError> {
        let mut log = self.log.lock().unwrap();
        if log.fail_output {
            return Err(DeviceError::NoDevice("output"));
        }
        log.completed = Some(completed);
        log.outputs_open += 1;
        log.output_acquisitions += 1;
        Ok(Box::new(MockOutput {
            log: Arc::clone(&self.log),
            open: true,
        }))
    }

    async fn open_input(
        &self,
        frames: mpsc::Sender<AudioFrame>,
    ) -> Result<Box<dyn CaptureDevice>, DeviceError> {
        let mut log = self.log.lock().unwrap();
        if log.deny_input {
            return Err(DeviceError::PermissionDenied("microphone blocked".into()));
        }
        log.frames = Some(frames);
        log.inputs_open += 1;
        log.input_acquisitions += 1;
        Ok(Box::new(MockCapture {
            log: Arc::clone(&self.log),
            open: true,
        }))
    }
}

struct MockCapture {
    log: Arc<Mutex<DeviceLog>>,
    open: bool,
}

impl CaptureDevice for MockCapture {
    fn close(&mut self) {
        if std::mem::take(&mut self.open) {
            let mut log = self.log.lock().unwrap();
            log.inputs_open -= 1;
            log.frames = None;
        }
    }
}

impl Drop for MockCapture {
    fn drop(&mut self) {
        self.close();
    }
}

struct MockOutput {
    log: Arc<Mutex<DeviceLog>>,
    open: bool,
}

impl OutputDevice for MockOutput {
    fn now(&self) -> f64 {
        self.log.lock().unwrap().clock
    }

    fn play(&mut self, id: HandleId, _frame: AudioFrame, start: f64) {
        self.log.lock().unwrap().played.push((id, start));
    }

    fn stop(&mut self, id: HandleId) {
        self.log.lock().unwrap().stopped.push(id);
    }

    fn close(&mut self) {
        if std::mem::take(&mut self.open) {
            let mut log = self.log.lock().unwrap();
            log.outputs_open -= 1;
            log.completed = None;
        }
    }
}

impl Drop for MockOutput {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

/// The service side of one mock link.
pub(crate) struct MockServer {
    pub(crate) events: mpsc::Sender<TransportEvent>,
    pub(crate) outbound: mpsc::Receiver<TransportCommand>,
}

#[derive(Default)]
struct TransportLog {
    fail_open: bool,
    hang_open: bool,
    opened: usize,
    servers: Vec<MockServer>,
}

/// Hands out in-memory links; the test plays the service through
/// [`MockServer`].
#[derive(Clone, Default)]
pub(crate) struct MockTransport {
    log: Arc<Mutex<TransportLog>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_open(self) -> Self {
        self.log.lock().unwrap().fail_open = true;
        self
    }

    /// Accept the open call but never finish the handshake.
    pub(crate) fn hang_open(self) -> Self {
        self.log.lock().unwrap().hang_open = true;
        self
    }

    /// Open calls that got past the failure check, hanging ones included.
    pub(crate) fn opened(&self) -> usize {
        self.log.lock().unwrap().opened
    }

    /// Service end of the oldest link not yet taken.
    pub(crate) fn take_server(&self) -> Option<MockServer> {
        let mut log = self.log.lock().unwrap();
        (!log.servers.is_empty()).then(|| log.servers.remove(0))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, _config: &LiveConfig) -> Result<TransportLink, TransportError> {
        let link = {
            let mut log = self.log.lock().unwrap();
            if log.fail_open {
                return Err(TransportError::Connect("connection refused".into()));
            }
            log.opened += 1;
            if log.hang_open {
                None
            } else {
                let (outbound_tx, outbound_rx) = mpsc::channel(4);
                let (events_tx, events_rx) = mpsc::channel(16);
                log.servers.push(MockServer {
                    events: events_tx,
                    outbound: outbound_rx,
                });
                Some(TransportLink {
                    outbound: outbound_tx,
                    events: events_rx,
                })
            }
        };
        match link {
            Some(link) => Ok(link),
            None => std::future::pending().await,
        }
    }
}
