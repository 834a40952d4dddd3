//! Speaker output via `cpal`.
//!
//! The output callback renders from a [`Mixer`]: a list of voices, each a
//! mono buffer pinned to a start position on the mix clock. Mixing happens
//! at the wire rate, so a voice is exactly as long as its decoded frame and
//! a voice queued at the previous one's end frame abuts it with no overlap.
//! One [`StreamResampler`] per stream converts the mixed signal to the
//! device rate.
//!
//! The clock counts mixed frames since the stream started, independent of
//! wall time. It runs ahead of the speaker by at most one mix block plus the
//! converter's buffering.
//!
//! The mixer and clock are the only state shared with the audio thread; the
//! mixer sits behind a `Mutex` and the clock is an atomic counter.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;

use super::capture::StreamHandle;
use super::device::{DeviceError, DeviceThread, OutputDevice};
use super::frame::AudioFrame;
use super::resample::{stereo_to_mono, StreamResampler, RESAMPLE_CHUNK};
use super::scheduler::HandleId;

// ---------------------------------------------------------------------------
// Mixer
// ---------------------------------------------------------------------------

/// A mono buffer at the mix rate, starting at `start_frame`.
#[derive(Debug, Clone)]
struct Voice {
    id: HandleId,
    start_frame: u64,
    samples: Vec<f32>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Sums every voice overlapping the frames being rendered.
#[derive(Debug, Default)]
pub struct Mixer {
    voices: Vec<Voice>,
}

impl Mixer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: HandleId, start_frame: u64, samples: Vec<f32>) {
        self.voices.push(Voice {
            id,
            start_frame,
            samples,
        });
    }

    /// Remove a voice without reporting it as finished.
    pub fn remove(&mut self, id: HandleId) -> bool {
        let before = self.voices.len();
        self.voices.retain(|v| v.id != id);
        self.voices.len() != before
    }

    pub fn clear(&mut self) {
        self.voices.clear();
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Fill `out` (interleaved, `channels` wide) starting at device frame
    /// `clock`, and report every voice that has now been fully rendered.
    ///
    /// Returns the clock value after this block.
    pub fn render(
        &mut self,
        out: &mut [f32],
        channels: usize,
        clock: u64,
        mut on_finished: impl FnMut(HandleId),
    ) -> u64 {
        if channels == 0 {
            return clock;
        }

        for (i, frame) in out.chunks_mut(channels).enumerate() {
            let pos = clock + i as u64;
            let mut acc = 0.0_f32;
            for voice in &self.voices {
                if pos >= voice.start_frame {
                    if let Some(s) = voice.samples.get((pos - voice.start_frame) as usize) {
                        acc += *s;
                    }
                }
            }
            let sample = acc.clamp(-1.0, 1.0);
            for slot in frame.iter_mut() {
                *slot = sample;
            }
        }

        let end = clock + (out.len() / channels) as u64;
        self.voices.retain(|voice| {
            let done = voice.end_frame() <= end;
            if done {
                on_finished(voice.id);
            }
            !done
        });
        end
    }
}

fn lock(mixer: &Mutex<Mixer>) -> MutexGuard<'_, Mixer> {
    mixer.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// AudioOutput
// ---------------------------------------------------------------------------

/// Output device wrapper built on top of `cpal`.
pub struct AudioOutput {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_rate: u32,
    channels: u16,
}

impl AudioOutput {
    /// Open the output device called `name`, or the host default when `None`.
    pub fn new(name: Option<&str>) -> Result<Self, DeviceError> {
        let host = cpal::default_host();
        let device = match name {
            None => host
                .default_output_device()
                .ok_or(DeviceError::NoDevice("output"))?,
            Some(wanted) => host
                .output_devices()?
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                .ok_or_else(|| DeviceError::NotFound(wanted.to_string()))?,
        };

        let supported = device.default_output_config()?;
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

    /// Start rendering `mixer` at `mix_rate`, advancing `clock` by one per
    /// mixed frame.
    pub fn start(
        &self,
        mixer: Arc<Mutex<Mixer>>,
        mix_rate: u32,
        clock: Arc<AtomicU64>,
        completed: mpsc::UnboundedSender<HandleId>,
    ) -> Result<StreamHandle, DeviceError> {
        let channels = self.channels as usize;
        let mut resampler = StreamResampler::new(mix_rate, self.sample_rate)?;
        let mut block = vec![0.0_f32; RESAMPLE_CHUNK];
        let mut ready: VecDeque<f32> = VecDeque::new();

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if channels == 0 {
                        return;
                    }
                    let frames = data.len() / channels;
                    while ready.len() < frames {
                        let now = clock.load(Ordering::Acquire);
                        let end = lock(&mixer).render(&mut block, 1, now, |id| {
                            let _ = completed.send(id);
                        });
                        clock.store(end, Ordering::Release);
                        match resampler.process(&block) {
                            Ok(converted) => ready.extend(converted),
                            Err(e) => {
                                log::error!("playback: {e}");
                                break;
                            }
                        }
                    }
                    for frame in data.chunks_mut(channels) {
                        let sample = ready.pop_front().unwrap_or(0.0);
                        frame.fill(sample);
                    }
                },
                |err: cpal::StreamError| {
                    log::error!("playback: cpal stream error: {err}");
                },
                None,
            )
            .map_err(DeviceError::from_build)?;

        stream.play().map_err(DeviceError::from_play)?;
        Ok(StreamHandle::new(stream))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

// ---------------------------------------------------------------------------
// CpalOutput
// ---------------------------------------------------------------------------

/// A running output stream owned by a dedicated thread.
pub struct CpalOutput {
    thread: DeviceThread,
    mixer: Arc<Mutex<Mixer>>,
    clock: Arc<AtomicU64>,
    mix_rate: u32,
}

impl CpalOutput {
    /// Acquire the output device and start rendering silence. Frames handed
    /// to [`play`](OutputDevice::play) are expected at `mix_rate`.
    pub async fn open(
        device_name: Option<String>,
        mix_rate: u32,
        completed: mpsc::UnboundedSender<HandleId>,
    ) -> Result<Self, DeviceError> {
        let mixer = Arc::new(Mutex::new(Mixer::new()));
        let clock = Arc::new(AtomicU64::new(0));

        let (thread, device_rate) = {
            let mixer = Arc::clone(&mixer);
            let clock = Arc::clone(&clock);
            DeviceThread::spawn("audio-playback", move || {
                let output = AudioOutput::new(device_name.as_deref())?;
                let stream = output.start(mixer, mix_rate, clock, completed)?;
                Ok((stream, output.sample_rate()))
            })
            .await?
        };

        log::info!("playback: output device open at {device_rate} Hz, mixing at {mix_rate} Hz");
        Ok(Self {
            thread,
            mixer,
            clock,
            mix_rate,
        })
    }
}

/// Mix-clock frame for `start` seconds.
fn start_frame(start: f64, rate: u32) -> u64 {
    (start * rate as f64).round().max(0.0) as u64
}

impl OutputDevice for CpalOutput {
    fn now(&self) -> f64 {
        self.clock.load(Ordering::Acquire) as f64 / self.mix_rate as f64
    }

    fn play(&mut self, id: HandleId, frame: AudioFrame, start: f64) {
        if frame.sample_rate != self.mix_rate {
            log::warn!(
                "playback: {} Hz frame on a {} Hz mixer",
                frame.sample_rate,
                self.mix_rate
            );
        }
        let samples = stereo_to_mono(&frame.samples, frame.channels);
        lock(&self.mixer).add(id, start_frame(start, self.mix_rate), samples);
    }

    fn stop(&mut self, id: HandleId) {
        lock(&self.mixer).remove(id);
    }

    fn close(&mut self) {
        lock(&self.mixer).clear();
        if self.thread.is_running() {
            self.thread.stop();
            log::info!("playback: output device released");
        }
    }
}
