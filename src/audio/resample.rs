//! Sample-rate conversion and channel mixing.
//!
//! Devices run at their own native format (commonly 44.1 or 48 kHz, stereo)
//! while the wire formats are fixed: 16 kHz mono upstream and 24 kHz mono
//! downstream. This module provides the two conversion steps used on both
//! sides:
//!
//! 1. [`stereo_to_mono`]: downmix any number of interleaved channels to mono.
//! 2. [`StreamResampler`]: rate conversion for a continuous stream fed in
//!    arbitrary slices, built on `rubato`'s polynomial fixed-input resampler.
//!
//! Device callbacks hand over whatever buffer size the host picked. The
//! resampler keeps its interpolation position and history between calls, so
//! the output of many small slices is the same stream as one large one.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use thiserror::Error;

/// Input frames converted per `rubato` call.
pub const RESAMPLE_CHUNK: usize = 256;

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`.
///
/// * If `channels == 1` the input slice is returned as an owned `Vec`.
/// * If `channels == 0` an empty vector is returned.
///
/// # Example
///
/// ```rust
/// use extruder_voice::audio::stereo_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, -0.2]; // L R L R
/// let mono = stereo_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// StreamResampler
// ---------------------------------------------------------------------------

/// Errors from [`StreamResampler`].
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("cannot convert {source_rate} Hz to {target_rate} Hz")]
    InvalidRate { source_rate: u32, target_rate: u32 },

    #[error("failed to create resampler: {0}")]
    Construction(#[from] rubato::ResamplerConstructionError),

    #[error("resampling failed: {0}")]
    Process(#[from] rubato::ResampleError),
}

/// Mono sample-rate converter for one continuous stream.
///
/// Input is buffered until a full chunk of [`RESAMPLE_CHUNK`] frames is
/// available; the remainder waits for the next call. Equal rates pass the
/// input straight through.
///
/// # Example
///
/// ```rust
/// use extruder_voice::audio::StreamResampler;
///
/// let mut down = StreamResampler::new(48_000, 16_000).unwrap();
/// let mut produced = 0;
/// for _ in 0..30 {
///     produced += down.process(&[0.0_f32; 441]).unwrap().len();
/// }
/// let consumed = 30 * 441 - down.pending();
/// assert!(produced.abs_diff(consumed / 3) <= 8);
/// ```
pub struct StreamResampler {
    inner: Option<FastFixedIn<f32>>,
    pending: Vec<f32>,
    output: Vec<Vec<f32>>,
}

impl StreamResampler {
    /// Converter from `source_rate` Hz to `target_rate` Hz.
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self, ConversionError> {
        if source_rate == 0 || target_rate == 0 {
            return Err(ConversionError::InvalidRate {
                source_rate,
                target_rate,
            });
        }
        if source_rate == target_rate {
            return Ok(Self {
                inner: None,
                pending: Vec::new(),
                output: Vec::new(),
            });
        }

        let ratio = target_rate as f64 / source_rate as f64;
        let inner = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, RESAMPLE_CHUNK, 1)?;
        let output = vec![vec![0.0; inner.output_frames_max()]];
        Ok(Self {
            inner: Some(inner),
            pending: Vec::with_capacity(RESAMPLE_CHUNK * 2),
            output,
        })
    }

    /// Feed the next slice of the stream and return every sample that could
    /// be produced so far.
    pub fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>, ConversionError> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(samples.to_vec());
        };

        self.pending.extend_from_slice(samples);
        let mut converted = Vec::new();
        let mut consumed = 0;
        while self.pending.len() - consumed >= inner.input_frames_next() {
            let needed = inner.input_frames_next();
            let chunk: [&[f32]; 1] = [&self.pending[consumed..consumed + needed]];
            let (used, produced) =
                inner.process_into_buffer(&chunk[..], self.output.as_mut_slice(), None)?;
            converted.extend_from_slice(&self.output[0][..produced]);
            consumed += used;
        }
        self.pending.drain(..consumed);
        Ok(converted)
    }

    /// Input samples buffered and not yet converted.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
