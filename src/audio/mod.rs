//! # Audio Processing Module
//!
//! Sample-format conversion and framing stages of the WAV → Opus pipeline.
//!
//! ## Key Components:
//! - **WAV Extractor**: 44-byte header stripped, payload decoded as 16-bit LE PCM
//! - **Resampler**: linear-interpolation sample-rate conversion
//! - **Upmixer**: mono duplicated into interleaved stereo
//! - **Frame Driver**: fixed 20 ms framing, encoding and delivery
//! - **Codec / Sink**: the encoder and output-channel seams the driver is written against
//!
//! ## Audio Format Requirements:
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono in, stereo out
//! - **Encoding**: Little-endian signed integers

pub mod codec;      // FrameEncoder trait and the libopus implementation
pub mod framer;     // 20ms framing and packet delivery
pub mod resampler;  // Linear interpolation resampling
pub mod sink;       // Output channels for encoded packets
pub mod upmix;      // Mono to stereo
pub mod wav;        // WAV payload extraction
