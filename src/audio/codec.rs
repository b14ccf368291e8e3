//! # Opus Codec Boundary
//!
//! The pipeline treats the Opus bitstream encoder as a black box with one
//! capability: take a fixed-size interleaved PCM frame, write an encoded packet
//! into a caller-provided buffer, and report how many bytes were written.
//!
//! ## Key Components:
//! - **FrameEncoder**: the trait the frame driver is written against
//! - **OpusFrameEncoder**: libopus-backed implementation (stereo, low-delay, max bitrate)
//!
//! Keeping the codec behind a trait lets every pipeline stage be tested with
//! mock encoders that never touch libopus.

use crate::error::{PipelineError, PipelineResult};
use opus::{Application, Bitrate, Channels};

/// Sample rates libopus accepts for encoding.
pub const SUPPORTED_SAMPLE_RATES: [u32; 5] = [8000, 12000, 16000, 24000, 48000];

/// Channel count after upmixing. Every frame handed to an encoder is stereo.
pub const OPUS_CHANNELS: usize = 2;

/// Duration of one Opus frame in milliseconds.
pub const FRAME_DURATION_MS: usize = 20;

/// Whether libopus can encode at `sample_rate`.
pub fn is_supported_sample_rate(sample_rate: u32) -> bool {
    SUPPORTED_SAMPLE_RATES.contains(&sample_rate)
}

/// Samples per frame (both channels) for a 20 ms window at `sample_rate`.
///
/// ## Calculation:
/// `sample_rate * 20 / 1000 * 2`, e.g. 48 kHz → 960 samples per channel → 1920.
pub fn frame_size(sample_rate: u32) -> usize {
    sample_rate as usize * FRAME_DURATION_MS / 1000 * OPUS_CHANNELS
}

/// Something that can encode one fixed-size PCM frame.
///
/// ## Contract:
/// - **frame**: exactly one frame of interleaved stereo samples
/// - **out**: scratch buffer the packet is written into
/// - **returns**: number of bytes written at the start of `out`
///
/// Implementations are used by exactly one pipeline run at a time (`&mut self`).
pub trait FrameEncoder {
    fn encode_frame(&mut self, frame: &[i16], out: &mut [u8]) -> anyhow::Result<usize>;
}

impl<E: FrameEncoder + ?Sized> FrameEncoder for Box<E> {
    fn encode_frame(&mut self, frame: &[i16], out: &mut [u8]) -> anyhow::Result<usize> {
        (**self).encode_frame(frame, out)
    }
}

/// Opus encoder wrapper configured for streaming voice transport.
///
/// ## Configuration
///
/// - Channels: Stereo (input is always upmixed first)
/// - Application: restricted low delay
/// - Bitrate: maximum the codec allows
pub struct OpusFrameEncoder {
    encoder: opus::Encoder,
    sample_rate: u32,
}

impl OpusFrameEncoder {
    /// Create a stereo low-delay encoder at `sample_rate`.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::EncoderConstruction` if:
    /// - the sample rate is not one libopus supports
    /// - libopus rejects the encoder or the bitrate setting
    pub fn new(sample_rate: u32) -> PipelineResult<Self> {
        if !is_supported_sample_rate(sample_rate) {
            return Err(PipelineError::EncoderConstruction(format!(
                "unsupported opus sample rate {} (expected one of {:?})",
                sample_rate, SUPPORTED_SAMPLE_RATES
            )));
        }

        let mut encoder = opus::Encoder::new(sample_rate, Channels::Stereo, Application::LowDelay)
            .map_err(|e| PipelineError::EncoderConstruction(e.to_string()))?;

        encoder
            .set_bitrate(Bitrate::Max)
            .map_err(|e| PipelineError::EncoderConstruction(format!("failed to set bitrate: {}", e)))?;

        Ok(Self { encoder, sample_rate })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl FrameEncoder for OpusFrameEncoder {
    fn encode_frame(&mut self, frame: &[i16], out: &mut [u8]) -> anyhow::Result<usize> {
        Ok(self.encoder.encode(frame, out)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_sizes() {
        assert_eq!(frame_size(8000), 320);
        assert_eq!(frame_size(16000), 640);
        assert_eq!(frame_size(48000), 1920);
        assert_eq!(frame_size(44100), 1764);
        assert_eq!(frame_size(0), 0);
    }

    #[test]
    fn test_supported_rates() {
        assert!(is_supported_sample_rate(48000));
        assert!(is_supported_sample_rate(8000));
        assert!(!is_supported_sample_rate(44100));
        assert!(!is_supported_sample_rate(0));
    }

    #[test]
    fn test_unsupported_rate_fails_construction() {
        match OpusFrameEncoder::new(44100) {
            Err(PipelineError::EncoderConstruction(msg)) => assert!(msg.contains("44100")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("44.1 kHz must be rejected"),
        }
    }

    #[test]
    fn test_encode_silence() {
        let mut encoder = OpusFrameEncoder::new(48000).expect("encoder creation failed");
        assert_eq!(encoder.sample_rate(), 48000);

        let silence = vec![0i16; frame_size(48000)];
        let mut out = vec![0u8; frame_size(48000) * 2];
        let written = encoder.encode_frame(&silence, &mut out).unwrap();

        assert!(written > 0);
        assert!(written <= out.len());
    }

    #[test]
    fn test_encode_wrong_frame_size_fails() {
        let mut encoder = OpusFrameEncoder::new(16000).expect("encoder creation failed");
        // 7 stereo samples is not a legal opus frame duration
        let mut out = vec![0u8; 1280];
        assert!(encoder.encode_frame(&[0i16; 14], &mut out).is_err());
    }
}
