//! Frame encoder: `f32` samples → 16-bit little-endian PCM.
//!
//! Each sample is scaled by `32768` and truncated toward zero. No dithering is
//! applied. How values outside `[-1.0, 1.0)` are packed is selected by
//! [`SampleOverflow`].
//!
//! # Example
//!
//! ```rust
//! use extruder_voice::audio::{encode_pcm16, AudioFrame, SampleOverflow};
//!
//! let frame = AudioFrame::mono(vec![0.5_f32; 4], 16_000);
//! let chunk = encode_pcm16(&frame, SampleOverflow::Clamp);
//! assert_eq!(chunk.data, vec![0x00, 0x40, 0x00, 0x40, 0x00, 0x40, 0x00, 0x40]);
//! assert_eq!(chunk.mime_type, "audio/pcm;rate=16000");
//! ```

use serde::{Deserialize, Serialize};

use super::frame::{AudioFrame, EncodedChunk};

/// Scale factor between `f32` samples and 16-bit PCM.
pub const PCM16_SCALE: f32 = 32_768.0;

/// What to do with scaled samples that fall outside the `i16` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SampleOverflow {
    /// Saturate at `i16::MIN` / `i16::MAX`. `1.0` packs as `32767`.
    #[default]
    Clamp,
    /// Keep the low 16 bits of the scaled integer. `1.0` packs as `-32768`.
    Wrap,
}

/// Convert a single sample to a 16-bit integer under `overflow`.
pub fn sample_to_i16(sample: f32, overflow: SampleOverflow) -> i16 {
    let scaled = sample * PCM16_SCALE;
    match overflow {
        SampleOverflow::Clamp => scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16,
        // `as i32` saturates only far outside the audio range; the second cast
        // truncates to the low 16 bits.
        SampleOverflow::Wrap => scaled as i32 as i16,
    }
}

/// Encode `frame` as raw 16-bit little-endian PCM tagged with its rate.
///
/// The output is exactly `2 * frame.samples.len()` bytes.
pub fn encode_pcm16(frame: &AudioFrame, overflow: SampleOverflow) -> EncodedChunk {
    let mut data = Vec::with_capacity(frame.samples.len() * 2);
    for &sample in &frame.samples {
        data.extend_from_slice(&sample_to_i16(sample, overflow).to_le_bytes());
    }
    EncodedChunk {
        data,
        mime_type: pcm_mime_type(frame.sample_rate),
    }
}

/// `audio/pcm;rate=<rate>`.
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={sample_rate}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::frame::{CAPTURE_BLOCK_SIZE, CAPTURE_MIME_TYPE, CAPTURE_SAMPLE_RATE};

    fn read_i16s(data: &[u8]) -> Vec<i16> {
        data.chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    #[test]
    fn full_block_of_half_scale() {
        let frame = AudioFrame::mono(vec![0.5; CAPTURE_BLOCK_SIZE], CAPTURE_SAMPLE_RATE);
        let chunk = encode_pcm16(&frame, SampleOverflow::Clamp);

        assert_eq!(chunk.data.len(), 8_192);
        assert_eq!(chunk.mime_type, CAPTURE_MIME_TYPE);
        assert!(read_i16s(&chunk.data).iter().all(|&v| v == 16_384));
    }

    #[test]
    fn byte_length_is_twice_sample_count() {
        for n in [0usize, 1, 7, 160, 4_096] {
            let frame = AudioFrame::mono(vec![0.1; n], CAPTURE_SAMPLE_RATE);
            assert_eq!(encode_pcm16(&frame, SampleOverflow::Clamp).data.len(), 2 * n);
        }
    }

    #[test]
    fn inverse_scale_recovers_samples_within_one_step() {
        let samples: Vec<f32> = (0..2_000).map(|i| (i as f32 / 1_000.0) - 1.0).collect();
        let frame = AudioFrame::mono(samples.clone(), CAPTURE_SAMPLE_RATE);
        let chunk = encode_pcm16(&frame, SampleOverflow::Wrap);

        for (orig, v) in samples.iter().zip(read_i16s(&chunk.data)) {
            let back = v as f32 / PCM16_SCALE;
            assert!(
                (orig - back).abs() <= 1.0 / PCM16_SCALE,
                "{orig} decoded as {back}"
            );
        }
    }

    #[test]
    fn negative_full_scale_is_exact() {
        assert_eq!(sample_to_i16(-1.0, SampleOverflow::Clamp), i16::MIN);
        assert_eq!(sample_to_i16(-1.0, SampleOverflow::Wrap), i16::MIN);
    }

    #[test]
    fn positive_full_scale_clamps() {
        assert_eq!(sample_to_i16(1.0, SampleOverflow::Clamp), i16::MAX);
        assert_eq!(sample_to_i16(3.0, SampleOverflow::Clamp), i16::MAX);
        assert_eq!(sample_to_i16(-3.0, SampleOverflow::Clamp), i16::MIN);
    }

    #[test]
    fn positive_full_scale_wraps() {
        assert_eq!(sample_to_i16(1.0, SampleOverflow::Wrap), i16::MIN);
        // 1.5 * 32768 = 49152 → 49152 - 65536
        assert_eq!(sample_to_i16(1.5, SampleOverflow::Wrap), -16_384);
    }

    #[test]
    fn mime_type_follows_frame_rate() {
        let frame = AudioFrame::mono(vec![0.0; 2], 24_000);
        assert_eq!(
            encode_pcm16(&frame, SampleOverflow::Clamp).mime_type,
            "audio/pcm;rate=24000"
        );
    }
}
