//! Audio device seams.
//!
//! The session never talks to `cpal` directly: it asks an [`AudioDevices`]
//! factory for one [`CaptureDevice`] and one [`OutputDevice`] per connect and
//! drops them on teardown. [`CpalDevices`] is the production factory; tests
//! inject a mock.
//!
//! `cpal::Stream` is not `Send` on every platform, so each cpal stream is
//! created on and owned by a dedicated OS thread ([`DeviceThread`]). The
//! handle returned to the session only holds the stop signal.

use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use super::capture::CpalCapture;
use super::frame::AudioFrame;
use super::output::CpalOutput;
use super::resample::ConversionError;
use super::scheduler::HandleId;
use crate::config::AudioConfig;

// ---------------------------------------------------------------------------
// DeviceError
// ---------------------------------------------------------------------------

/// Errors raised while acquiring or running an audio device.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("no {0} device found on the default audio host")]
    NoDevice(&'static str),

    #[error("audio device not found: {0}")]
    NotFound(String),

    #[error("failed to enumerate audio devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default stream config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("sample-rate conversion unavailable: {0}")]
    Conversion(#[from] ConversionError),

    #[error("audio thread failed: {0}")]
    Thread(String),
}

impl DeviceError {
    /// Map a stream build failure, recognising OS permission refusals.
    pub(crate) fn from_build(err: cpal::BuildStreamError) -> Self {
        match &err {
            cpal::BuildStreamError::BackendSpecific { err: inner }
                if is_permission_message(&inner.description) =>
            {
                DeviceError::PermissionDenied(inner.description.clone())
            }
            _ => DeviceError::BuildStream(err),
        }
    }

    pub(crate) fn from_play(err: cpal::PlayStreamError) -> Self {
        match &err {
            cpal::PlayStreamError::BackendSpecific { err: inner }
                if is_permission_message(&inner.description) =>
            {
                DeviceError::PermissionDenied(inner.description.clone())
            }
            _ => DeviceError::PlayStream(err),
        }
    }
}

fn is_permission_message(description: &str) -> bool {
    let lower = description.to_ascii_lowercase();
    lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
}

// ---------------------------------------------------------------------------
// Device traits
// ---------------------------------------------------------------------------

/// An acquired microphone. Frames flow through the channel handed to
/// [`AudioDevices::open_input`] until the device is closed.
pub trait CaptureDevice: Send {
    /// Stop capturing and release the device. Safe to call more than once.
    fn close(&mut self);
}

/// An acquired output device with its own monotonic clock.
pub trait OutputDevice: Send {
    /// Seconds of audio rendered since the device was opened.
    fn now(&self) -> f64;

    /// Queue `frame` to start at `start` seconds on the device clock.
    ///
    /// When it has been fully rendered, `id` is sent on the completion
    /// channel handed to [`AudioDevices::open_output`].
    fn play(&mut self, id: HandleId, frame: AudioFrame, start: f64);

    /// Stop a queued or playing buffer immediately. No completion is sent.
    fn stop(&mut self, id: HandleId);

    /// Silence everything and release the device. Safe to call more than once.
    fn close(&mut self);
}

/// Factory for session-owned audio devices.
#[async_trait]
pub trait AudioDevices: Send + Sync {
    /// Acquire the output device.
    async fn open_output(
        &self,
        completed: mpsc::UnboundedSender<HandleId>,
    ) -> Result<Box<dyn OutputDevice>, DeviceError>;

    /// Acquire the microphone and start pushing fixed-size mono blocks at
    /// the capture rate into `frames`.
    async fn open_input(
        &self,
        frames: mpsc::Sender<AudioFrame>,
    ) -> Result<Box<dyn CaptureDevice>, DeviceError>;
}

// ---------------------------------------------------------------------------
// CpalDevices
// ---------------------------------------------------------------------------

/// Production [`AudioDevices`] backed by `cpal`.
#[derive(Debug, Clone)]
pub struct CpalDevices {
    config: AudioConfig,
}

impl CpalDevices {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl AudioDevices for CpalDevices {
    async fn open_output(
        &self,
        completed: mpsc::UnboundedSender<HandleId>,
    ) -> Result<Box<dyn OutputDevice>, DeviceError> {
        let output = CpalOutput::open(
            self.config.output_device.clone(),
            self.config.playback_sample_rate,
            completed,
        )
        .await?;
        Ok(Box::new(output))
    }

    async fn open_input(
        &self,
        frames: mpsc::Sender<AudioFrame>,
    ) -> Result<Box<dyn CaptureDevice>, DeviceError> {
        let capture = CpalCapture::open(
            self.config.input_device.clone(),
            self.config.capture_block_size,
            self.config.capture_sample_rate,
            frames,
        )
        .await?;
        Ok(Box::new(capture))
    }
}

// ---------------------------------------------------------------------------
// DeviceThread
// ---------------------------------------------------------------------------

/// Owns an OS thread that keeps a non-`Send` stream guard alive until
/// [`stop`](Self::stop) is called or the handle is dropped.
pub(crate) struct DeviceThread {
    stop: Option<std_mpsc::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl DeviceThread {
    /// Run `build` on a new thread named `name`.
    ///
    /// `build` returns the guard to keep alive on the thread plus a `Send`
    /// value reported back to the caller once the stream is running.
    pub(crate) async fn spawn<F, G, T>(name: &str, build: F) -> Result<(Self, T), DeviceError>
    where
        F: FnOnce() -> Result<(G, T), DeviceError> + Send + 'static,
        G: 'static,
        T: Send + 'static,
    {
        let (ready_tx, ready_rx) = oneshot::channel::<Result<T, DeviceError>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let guard = match build() {
                    Ok((guard, info)) => {
                        let _ = ready_tx.send(Ok(info));
                        guard
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Returns once the sender is dropped.
                let _ = stop_rx.recv();
                drop(guard);
            })
            .map_err(|e| DeviceError::Thread(e.to_string()))?;

        match ready_rx.await {
            Ok(Ok(info)) => Ok((
                Self {
                    stop: Some(stop_tx),
                    join: Some(join),
                },
                info,
            )),
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => {
                let _ = join.join();
                Err(DeviceError::Thread(format!("{name} exited during start-up")))
            }
        }
    }

    /// Signal the thread to release the stream.
    ///
    /// Inside a tokio runtime the thread is reaped on the blocking pool so a
    /// slow driver never stalls an async worker; elsewhere this waits for it.
    pub(crate) fn stop(&mut self) {
        self.stop.take();
        let Some(join) = self.join.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(move || reap(join));
            }
            Err(_) => reap(join),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.join.is_some()
    }
}

fn reap(join: JoinHandle<()>) {
    if join.join().is_err() {
        log::error!("audio device thread panicked");
    }
}

impl Drop for DeviceThread {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn device_thread_reports_info_and_stops() {
        let (mut thread, info) = DeviceThread::spawn("test-device", || Ok(((), 48_000u32)))
            .await
            .expect("spawn");
        assert_eq!(info, 48_000);
        assert!(thread.is_running());
        thread.stop();
        assert!(!thread.is_running());
        // Second stop is a no-op.
        thread.stop();
    }

    /// Stream guard whose release takes a while, like a driver draining.
    struct SlowRelease(Arc<AtomicBool>);

    impl Drop for SlowRelease {
        fn drop(&mut self) {
            thread::sleep(Duration::from_millis(300));
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn stop_does_not_wait_for_a_slow_release() {
        let released = Arc::new(AtomicBool::new(false));
        let guard = SlowRelease(Arc::clone(&released));
        let (mut thread, ()) = DeviceThread::spawn("test-device", move || Ok((guard, ())))
            .await
            .expect("spawn");

        let started = Instant::now();
        thread.stop();
        assert!(started.elapsed() < Duration::from_millis(200));
        assert!(!thread.is_running());

        // The current-thread runtime stays responsive while it releases.
        tokio::time::timeout(Duration::from_secs(5), async {
            while !released.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("stream released");
    }

    #[test]
    fn stop_outside_a_runtime_waits_for_release() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        let released = Arc::new(AtomicBool::new(false));
        let guard = SlowRelease(Arc::clone(&released));
        let (thread, ()) = runtime
            .block_on(DeviceThread::spawn("test-device", move || Ok((guard, ()))))
            .expect("spawn");
        drop(runtime);

        drop(thread);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn device_thread_propagates_build_error() {
        let result = DeviceThread::spawn::<_, (), ()>("test-device", || {
            Err(DeviceError::NoDevice("input"))
        })
        .await;
        assert!(matches!(result, Err(DeviceError::NoDevice("input"))));
    }

    #[test]
    fn permission_messages_are_recognised() {
        let err = cpal::BuildStreamError::BackendSpecific {
            err: cpal::BackendSpecificError {
                description: "Microphone permission denied by user".into(),
            },
        };
        assert!(matches!(
            DeviceError::from_build(err),
            DeviceError::PermissionDenied(_)
        ));

        let err = cpal::BuildStreamError::DeviceNotAvailable;
        assert!(matches!(DeviceError::from_build(err), DeviceError::BuildStream(_)));
    }

    #[test]
    fn device_error_display() {
        let e = DeviceError::NotFound("USB Mic".into());
        assert!(e.to_string().contains("USB Mic"));
        assert!(DeviceError::NoDevice("output").to_string().contains("output"));
    }
}
