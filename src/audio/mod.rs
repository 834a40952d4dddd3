//! Audio pipelines: capture → encode, and decode → schedule → playback.
//!
//! # Pipelines
//!
//! ```text
//! Microphone → cpal callback → stereo_to_mono → StreamResampler(16 kHz)
//!            → BlockAccumulator(4096) → AudioFrame (mpsc) → encode_pcm16
//!
//! PCM16 payload → decode_pcm16(24 kHz) → PlaybackScheduler
//!            → OutputDevice (Mixer at 24 kHz → StreamResampler → cpal)
//! ```
//!
//! Devices are acquired per session through the [`AudioDevices`] factory;
//! nothing in this module holds process-wide device state.

pub mod buffer;
pub mod capture;
pub mod decoder;
pub mod device;
pub mod encoder;
pub mod frame;
pub mod output;
pub mod playback;
pub mod resample;
pub mod scheduler;

pub use buffer::BlockAccumulator;
pub use capture::{AudioCapture, CapturePipeline, CpalCapture, StreamHandle};
pub use decoder::{decode_pcm16, DecodeError};
pub use device::{AudioDevices, CaptureDevice, CpalDevices, DeviceError, OutputDevice};
pub use encoder::{encode_pcm16, pcm_mime_type, sample_to_i16, SampleOverflow, PCM16_SCALE};
pub use frame::{
    AudioFrame, EncodedChunk, CAPTURE_BLOCK_SIZE, CAPTURE_MIME_TYPE, CAPTURE_SAMPLE_RATE,
    PLAYBACK_SAMPLE_RATE,
};
pub use output::{AudioOutput, CpalOutput, Mixer};
pub use playback::PlaybackPipeline;
pub use resample::{stereo_to_mono, ConversionError, StreamResampler, RESAMPLE_CHUNK};
pub use scheduler::{HandleId, PlaybackHandle, PlaybackScheduler};
