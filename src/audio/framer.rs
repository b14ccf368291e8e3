//! # Frame Driver
//!
//! Slices an interleaved stereo sample stream into 20 ms frames, hands each one
//! to a `FrameEncoder`, and forwards the resulting packet to a `FrameSink`.
//!
//! ## Framing Rules:
//! - Windows start at index 0 and advance by exactly one frame, never overlapping
//! - Only complete windows are encoded
//! - The trailing `len % frame_size` samples are dropped, never zero-padded
//! - Packets are sent one at a time, in timeline order

use crate::audio::codec::{frame_size, FrameEncoder};
use crate::audio::sink::FrameSink;
use crate::error::{PipelineError, PipelineResult};
use tracing::{debug, trace};

/// Outcome of one `drive` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames encoded and delivered
    pub frames: usize,
    /// Trailing samples that did not fill a frame
    pub dropped_samples: usize,
    /// Sum of encoded packet lengths
    pub encoded_bytes: usize,
}

/// Owns an encoder plus the scratch buffer packets are written into.
///
/// ## Memory:
/// The scratch buffer holds `frame_size * 2` bytes and is reused for every
/// frame; only the written prefix is copied out per packet.
pub struct FrameDriver<E> {
    encoder: E,
    frame_size: usize,
    scratch: Vec<u8>,
}

impl<E: FrameEncoder> FrameDriver<E> {
    /// Create a driver for stereo frames at `sample_rate`.
    ///
    /// Fails with `EncoderConstruction` when the rate is too low to hold a
    /// single sample per 20 ms window.
    pub fn new(encoder: E, sample_rate: u32) -> PipelineResult<Self> {
        let frame_size = frame_size(sample_rate);
        if frame_size == 0 {
            return Err(PipelineError::EncoderConstruction(format!(
                "sample rate {} yields an empty 20ms frame",
                sample_rate
            )));
        }

        Ok(Self {
            encoder,
            frame_size,
            scratch: vec![0u8; frame_size * 2],
        })
    }

    /// Samples per frame, both channels included.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Number of complete frames `samples` stereo samples produce.
    pub fn frame_count(&self, samples: usize) -> usize {
        samples / self.frame_size
    }

    /// Encode every complete frame of `stereo` and send each packet to `sink`.
    ///
    /// ## Error Handling:
    /// - **Encoder error**: stops immediately with `EncodeFailure { frame, .. }`
    /// - **Closed sink**: stops immediately with `ChannelClosed { frame }`
    ///
    /// Frames sent before the failure are not recalled.
    pub fn drive<S: FrameSink + ?Sized>(&mut self, stereo: &[i16], sink: &mut S) -> PipelineResult<FrameStats> {
        let mut stats = FrameStats::default();

        let windows = stereo.chunks_exact(self.frame_size);
        stats.dropped_samples = windows.remainder().len();

        for (index, frame) in windows.enumerate() {
            let written = self
                .encoder
                .encode_frame(frame, &mut self.scratch)
                .map_err(|e| PipelineError::EncodeFailure {
                    frame: index,
                    reason: format!("{:#}", e),
                })?;

            if written > self.scratch.len() {
                return Err(PipelineError::EncodeFailure {
                    frame: index,
                    reason: format!(
                        "encoder reported {} bytes for a {} byte buffer",
                        written,
                        self.scratch.len()
                    ),
                });
            }

            trace!(frame = index, bytes = written, "frame encoded");
            sink.send_frame(self.scratch[..written].to_vec())
                .map_err(|_| PipelineError::ChannelClosed { frame: index })?;

            stats.frames += 1;
            stats.encoded_bytes += written;
        }

        if stats.dropped_samples > 0 {
            debug!(
                dropped_samples = stats.dropped_samples,
                frame_size = self.frame_size,
                "trailing partial frame dropped"
            );
        }

        Ok(stats)
    }

    /// Give back the wrapped encoder.
    pub fn into_inner(self) -> E {
        self.encoder
    }
}
