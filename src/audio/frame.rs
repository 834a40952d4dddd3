//! Audio data types shared by the capture and playback pipelines.

/// Fixed capture rate expected by the remote service (Hz).
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Fixed rate of the synthetic speech streamed back by the service (Hz).
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Samples per captured block.
pub const CAPTURE_BLOCK_SIZE: usize = 4_096;

/// Mime-style tag attached to every outbound chunk.
pub const CAPTURE_MIME_TYPE: &str = "audio/pcm;rate=16000";

// ---------------------------------------------------------------------------
// AudioFrame
// ---------------------------------------------------------------------------

/// A block of linear samples, either captured from the microphone or decoded
/// from an inbound payload.
///
/// Samples are interleaved `f32` in `[-1.0, 1.0]`. A frame is moved through
/// the pipeline and consumed exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Interleaved PCM samples.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
}

impl AudioFrame {
    /// Build a mono frame.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        match self.channels {
            0 => 0,
            n => self.samples.len() / n as usize,
        }
    }

    /// Playback duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ---------------------------------------------------------------------------
// EncodedChunk
// ---------------------------------------------------------------------------

/// Wire-ready audio: an opaque payload plus its format tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub data: Vec<u8>,
    /// e.g. `"audio/pcm;rate=16000"`.
    pub mime_type: String,
}
