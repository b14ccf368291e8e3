//! # WAV Payload Extraction
//!
//! Turns a fully buffered WAV file into mono 16-bit PCM samples.
//!
//! ## Format Assumptions:
//! - **Header**: fixed 44 bytes, no variable chunk parsing
//! - **Sample rate**: little-endian `u32` at byte offset 24 (the `fmt ` sample-rate field)
//! - **Payload**: everything after byte 44, signed 16-bit little-endian samples
//!
//! No other header field is read. Channel count and bit depth are taken on trust.

use crate::error::{PipelineError, PipelineResult};
use byteorder::{ByteOrder, LittleEndian};

/// Size of the canonical RIFF/WAVE header in bytes.
pub const WAV_HEADER_LEN: usize = 44;

/// Byte offset of the sample-rate field inside the header.
pub const SAMPLE_RATE_OFFSET: usize = 24;

/// Mono PCM decoded from a WAV container.
///
/// ## Fields:
/// - **sample_rate**: rate declared by the header (Hz)
/// - **samples**: signed 16-bit samples in stream order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavPcm {
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

impl WavPcm {
    /// Validate and decode raw WAV bytes.
    ///
    /// ## Validation Checks:
    /// 1. **Length**: at least 44 bytes, otherwise it cannot carry a header
    /// 2. **Alignment**: payload length must be even (2 bytes per sample)
    /// 3. **Sample rate**: header rate must be non-zero
    ///
    /// ## Returns:
    /// - **Ok(WavPcm)**: `(len - 44) / 2` samples plus the header sample rate
    /// - **Err(PipelineError::MalformedInput)**: any check above failed
    pub fn parse(wav: &[u8]) -> PipelineResult<Self> {
        if wav.len() < WAV_HEADER_LEN {
            return Err(PipelineError::MalformedInput("bytes are not wav".to_string()));
        }

        let payload = &wav[WAV_HEADER_LEN..];
        if payload.len() % 2 != 0 {
            return Err(PipelineError::MalformedInput(format!(
                "wav payload of {} bytes is not aligned to 16-bit samples",
                payload.len()
            )));
        }

        let sample_rate = read_sample_rate(wav);
        if sample_rate == 0 {
            return Err(PipelineError::MalformedInput(
                "wav header declares a sample rate of 0".to_string(),
            ));
        }

        Ok(Self {
            sample_rate,
            samples: decode_samples(payload),
        })
    }

    /// Number of mono samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of the payload in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

/// Read the sample-rate field. Caller guarantees `wav.len() >= 44`.
fn read_sample_rate(wav: &[u8]) -> u32 {
    LittleEndian::read_u32(&wav[SAMPLE_RATE_OFFSET..SAMPLE_RATE_OFFSET + 4])
}

/// Reinterpret an even-length byte slice as little-endian `i16` samples.
///
/// ## Rust Concepts:
/// - **ByteOrder::read_i16_into**: decodes the whole slice in one pass, each sample
///   being `low | (high << 8)` reinterpreted as signed
fn decode_samples(payload: &[u8]) -> Vec<i16> {
    let mut samples = vec![0i16; payload.len() / 2];
    LittleEndian::read_i16_into(payload, &mut samples);
    samples
}
