//! Frame decoder: inbound 16-bit little-endian PCM → [`AudioFrame`].

use thiserror::Error;

use super::encoder::PCM16_SCALE;
use super::frame::AudioFrame;

/// Reason an inbound payload could not be turned into playable audio.
///
/// Decode failures are never fatal to a session: the payload is dropped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty audio payload")]
    Empty,

    #[error("PCM16 payload has odd length {0}")]
    OddLength(usize),

    #[error("invalid base64 audio payload: {0}")]
    Base64(String),
}

/// Decode raw mono PCM16 LE bytes at `sample_rate`.
///
/// # Errors
///
/// [`DecodeError::Empty`] for a zero-length payload and
/// [`DecodeError::OddLength`] when the byte count is not a whole number of
/// samples.
pub fn decode_pcm16(payload: &[u8], sample_rate: u32) -> Result<AudioFrame, DecodeError> {
    if payload.is_empty() {
        return Err(DecodeError::Empty);
    }
    if payload.len() % 2 != 0 {
        return Err(DecodeError::OddLength(payload.len()));
    }

    let samples = payload
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / PCM16_SCALE)
        .collect();

    Ok(AudioFrame::mono(samples, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::frame::PLAYBACK_SAMPLE_RATE;

    #[test]
    fn decodes_little_endian_samples() {
        // 16384, -16384, 0
        let payload = [0x00, 0x40, 0x00, 0xC0, 0x00, 0x00];
        let frame = decode_pcm16(&payload, PLAYBACK_SAMPLE_RATE).unwrap();
        assert_eq!(frame.samples, vec![0.5, -0.5, 0.0]);
        assert_eq!(frame.sample_rate, PLAYBACK_SAMPLE_RATE);
        assert_eq!(frame.channels, 1);
    }

    #[test]
    fn half_second_payload_has_half_second_duration() {
        let payload = vec![0u8; 24_000];
        let frame = decode_pcm16(&payload, PLAYBACK_SAMPLE_RATE).unwrap();
        assert!((frame.duration_secs() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn empty_payload_is_rejected() {
        assert_eq!(decode_pcm16(&[], PLAYBACK_SAMPLE_RATE), Err(DecodeError::Empty));
    }

    #[test]
    fn odd_payload_is_rejected() {
        assert_eq!(
            decode_pcm16(&[1, 2, 3], PLAYBACK_SAMPLE_RATE),
            Err(DecodeError::OddLength(3))
        );
    }
}
