//! Microphone capture via `cpal`, and the capture pipeline built on it.
//!
//! [`AudioCapture`] wraps the cpal host/device/stream lifecycle. Its callback
//! downmixes to mono, resamples to the wire rate and cuts the stream into
//! fixed-size blocks, pushing each block as an [`AudioFrame`] with
//! `try_send`: when the session is behind, the block is dropped rather than
//! blocking the audio thread.
//!
//! [`CpalCapture`] keeps the stream on its own thread and is what the session
//! holds. [`CapturePipeline`] pairs any [`CaptureDevice`] with its frame queue
//! and encodes frames on the way out.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;

use super::buffer::BlockAccumulator;
use super::device::{AudioDevices, CaptureDevice, DeviceError, DeviceThread};
use super::encoder::{encode_pcm16, SampleOverflow};
use super::frame::{AudioFrame, EncodedChunk};
use super::resample::{stereo_to_mono, StreamResampler};
use crate::config::AudioConfig;

// ---------------------------------------------------------------------------
// StreamHandle
// ---------------------------------------------------------------------------

/// RAII guard that keeps the cpal stream alive.
///
/// Dropping this value stops the underlying hardware stream.
pub struct StreamHandle {
    _stream: cpal::Stream,
}

impl StreamHandle {
    pub(crate) fn new(stream: cpal::Stream) -> Self {
        Self { _stream: stream }
    }
}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

/// Microphone device wrapper built on top of `cpal`.
pub struct AudioCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    /// Native sample rate reported by the device (Hz).
    sample_rate: u32,
    /// Number of interleaved channels reported by the device.
    channels: u16,
}

impl AudioCapture {
    /// Open the input device called `name`, or the host default when `None`.
    ///
    /// # Errors
    ///
    /// [`DeviceError::NoDevice`] when there is no default input,
    /// [`DeviceError::NotFound`] when `name` matches nothing.
    pub fn new(name: Option<&str>) -> Result<Self, DeviceError> {
        let host = cpal::default_host();
        let device = match name {
            None => host
                .default_input_device()
                .ok_or(DeviceError::NoDevice("input"))?,
            Some(wanted) => host
                .input_devices()?
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                .ok_or_else(|| DeviceError::NotFound(wanted.to_string()))?,
        };

        let supported = device.default_input_config()?;

        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        Ok(Self {
            device,
            config,
            sample_rate,
            channels,
        })
    }

    /// Start recording, sending `block_size`-sample mono blocks at
    /// `target_rate` to `tx`.
    ///
    /// # Errors
    ///
    /// [`DeviceError::PermissionDenied`] when the OS refuses microphone
    /// access, otherwise [`DeviceError::BuildStream`] or
    /// [`DeviceError::PlayStream`].
    pub fn start(
        &self,
        block_size: usize,
        target_rate: u32,
        tx: mpsc::Sender<AudioFrame>,
    ) -> Result<StreamHandle, DeviceError> {
        let sample_rate = self.sample_rate;
        let channels = self.channels;
        let mut blocks = BlockAccumulator::new(block_size);
        let mut resampler = StreamResampler::new(sample_rate, target_rate)?;

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono = stereo_to_mono(data, channels);
                    let converted = match resampler.process(&mono) {
                        Ok(converted) => converted,
                        Err(e) => {
                            log::error!("capture: {e}");
                            return;
                        }
                    };
                    for block in blocks.push_slice(&converted) {
                        // Full queue or closed session: drop the block.
                        let _ = tx.try_send(AudioFrame::mono(block, target_rate));
                    }
                },
                |err: cpal::StreamError| {
                    log::error!("capture: cpal stream error: {err}");
                },
                None,
            )
            .map_err(DeviceError::from_build)?;

        stream.play().map_err(DeviceError::from_play)?;
        Ok(StreamHandle::new(stream))
    }

    /// Native sample rate of the capture stream in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of interleaved channels delivered by the device.
    pub fn channels(&self) -> u16 {
        self.channels
    }
}

// ---------------------------------------------------------------------------
// CpalCapture
// ---------------------------------------------------------------------------

/// A running microphone stream owned by a dedicated thread.
pub struct CpalCapture {
    thread: DeviceThread,
}

impl CpalCapture {
    /// Acquire the microphone and start streaming blocks into `frames`.
    pub async fn open(
        device_name: Option<String>,
        block_size: usize,
        target_rate: u32,
        frames: mpsc::Sender<AudioFrame>,
    ) -> Result<Self, DeviceError> {
        let (thread, native_rate) = DeviceThread::spawn("audio-capture", move || {
            let capture = AudioCapture::new(device_name.as_deref())?;
            let stream = capture.start(block_size, target_rate, frames)?;
            Ok((stream, capture.sample_rate()))
        })
        .await?;

        log::info!("capture: microphone open at {native_rate} Hz, sending {target_rate} Hz");
        Ok(Self { thread })
    }
}

impl CaptureDevice for CpalCapture {
    fn close(&mut self) {
        if self.thread.is_running() {
            self.thread.stop();
            log::info!("capture: microphone released");
        }
    }
}

// ---------------------------------------------------------------------------
// CapturePipeline
// ---------------------------------------------------------------------------

/// Microphone → encoder. Exists only while the session is connected.
pub struct CapturePipeline {
    device: Box<dyn CaptureDevice>,
    frames: mpsc::Receiver<AudioFrame>,
    overflow: SampleOverflow,
}

impl CapturePipeline {
    /// Acquire the microphone through `devices`.
    pub async fn open(devices: &dyn AudioDevices, config: &AudioConfig) -> Result<Self, DeviceError> {
        let (tx, frames) = mpsc::channel(config.capture_queue.max(1));
        let device = devices.open_input(tx).await?;
        Ok(Self {
            device,
            frames,
            overflow: config.overflow,
        })
    }

    /// Wait for the next captured block and encode it.
    ///
    /// Returns `None` once the device has stopped producing frames.
    pub async fn next_chunk(&mut self) -> Option<EncodedChunk> {
        let frame = self.frames.recv().await?;
        Some(encode_pcm16(&frame, self.overflow))
    }

    /// Stop the microphone. Blocks already queued are discarded.
    pub fn close(mut self) {
        self.device.close();
        self.frames.close();
    }
}
