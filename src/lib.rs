//! # wav2opus
//!
//! Transcodes 16-bit mono WAV files into a stream of stereo 20ms Opus packets.
//!
//! ## Pipeline:
//! 1. **wav**: strip the 44-byte header, read the sample rate, decode PCM
//! 2. **resampler**: linear interpolation to the Opus sample rate
//! 3. **upmix**: duplicate every sample into a left/right pair
//! 4. **framer**: cut 20ms frames and hand each to the encoder
//! 5. **sink**: deliver packets in order, waiting when the consumer is slow
//!
//! The same pipeline backs the library entry point [`pipeline::encode`], the
//! streaming HTTP endpoint and the WebSocket endpoint.

pub mod audio;
pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod pipeline;
pub mod state;
pub mod websocket;

pub use error::{AppError, PipelineError};
pub use pipeline::{encode, EncodeReport, Encoder};
