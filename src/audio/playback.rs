//! Playback pipeline: inbound payload → decode → schedule → output device.
//!
//! The pipeline owns the output device, the [`PlaybackScheduler`] (cursor and
//! live-handle set) and the receiving end of the device's completion channel.
//! It is driven entirely from the session task, so none of its state is
//! touched concurrently.

use tokio::sync::mpsc;

use super::decoder::{decode_pcm16, DecodeError};
use super::device::{AudioDevices, DeviceError, OutputDevice};
use super::scheduler::{HandleId, PlaybackHandle, PlaybackScheduler};

pub struct PlaybackPipeline {
    device: Box<dyn OutputDevice>,
    scheduler: PlaybackScheduler,
    completed: mpsc::UnboundedReceiver<HandleId>,
    sample_rate: u32,
}

impl PlaybackPipeline {
    /// Acquire the output device through `devices`. Inbound payloads are
    /// decoded at `sample_rate`.
    pub async fn open(devices: &dyn AudioDevices, sample_rate: u32) -> Result<Self, DeviceError> {
        let (tx, completed) = mpsc::unbounded_channel();
        let device = devices.open_output(tx).await?;
        Ok(Self {
            device,
            scheduler: PlaybackScheduler::new(),
            completed,
            sample_rate,
        })
    }

    /// Decode `payload` and queue it right after everything already queued.
    ///
    /// # Errors
    ///
    /// A [`DecodeError`] leaves the cursor and the live set untouched.
    pub fn enqueue(&mut self, payload: &[u8]) -> Result<PlaybackHandle, DecodeError> {
        let frame = decode_pcm16(payload, self.sample_rate)?;
        let handle = self
            .scheduler
            .schedule(frame.duration_secs(), self.device.now());
        log::trace!(
            "playback: #{} at {:.3}s for {:.3}s",
            handle.id,
            handle.start,
            handle.duration
        );
        self.device.play(handle.id, frame, handle.start);
        Ok(handle)
    }

    /// Stop every live buffer and reset the cursor to "now".
    ///
    /// Returns the number of buffers that were cut off.
    pub fn interrupt(&mut self) -> usize {
        let stopped = self.scheduler.interrupt();
        for handle in &stopped {
            self.device.stop(handle.id);
        }
        stopped.len()
    }

    /// Wait for the device to report a naturally finished buffer.
    pub async fn next_completed(&mut self) -> Option<HandleId> {
        self.completed.recv().await
    }

    /// Retire a finished buffer. Stale notices are ignored.
    pub fn on_completed(&mut self, id: HandleId) -> bool {
        self.scheduler.complete(id).is_some()
    }

    pub fn cursor(&self) -> f64 {
        self.scheduler.cursor()
    }

    pub fn live_count(&self) -> usize {
        self.scheduler.live_count()
    }

    /// Current output device clock in seconds.
    pub fn now(&self) -> f64 {
        self.device.now()
    }

    /// Cut off everything and release the output device.
    pub fn close(mut self) {
        self.interrupt();
        self.device.close();
        self.completed.close();
    }
}
