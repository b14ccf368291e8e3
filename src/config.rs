//! # Configuration Management
//!
//! This module handles loading and managing service configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: Serialization/deserialization library for converting between Rust structs and data formats
//! - **derive macros**: Automatically generate code for common traits (Debug, Clone, Serialize, Deserialize)
//! - **Result<T, E>**: Error handling that forces you to handle potential failures
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER__HOST, APP_ENCODER__DEFAULT_SAMPLE_RATE, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)

use crate::audio::codec::{is_supported_sample_rate, SUPPORTED_SAMPLE_RATES};
use anyhow::Result;              // Better error handling with context
use serde::{Deserialize, Serialize};  // For converting to/from TOML, JSON, etc.
use std::env;                    // For reading environment variables

/// Hard ceiling for `encoder.max_wav_bytes`.
///
/// The HTTP payload extractor is sized to this once at startup; the live
/// `max_wav_bytes` is checked per request, so runtime updates below the
/// ceiling apply without a restart.
pub const MAX_WAV_BYTES_CEILING: usize = 512 * 1024 * 1024;

/// Main service configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, encoder, performance)
/// keeps each concern readable as the service grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub encoder: EncoderConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address or hostname to bind the server to (e.g., "127.0.0.1", "0.0.0.0")
/// - `port`: TCP port number to listen on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Transcoding settings.
///
/// ## Fields:
/// - `default_sample_rate`: Opus rate used when a request doesn't name one
/// - `channel_capacity`: encoded frames buffered between encoder and client;
///   once full the encoder waits for the client to catch up
/// - `max_wav_bytes`: largest WAV upload accepted (HTTP body or WebSocket message)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub default_sample_rate: u32,
    pub channel_capacity: usize,
    pub max_wav_bytes: usize,
}

/// Performance tuning configuration.
///
/// ## Fields:
/// - `max_concurrent_sessions`: transcodes allowed to run at the same time;
///   each one owns its own Opus encoder and buffers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_sessions: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),  // Localhost only (safe for development)
                port: 8080,
            },
            encoder: EncoderConfig {
                default_sample_rate: 48000,     // Opus fullband
                channel_capacity: 32,           // 640ms of audio in flight
                max_wav_bytes: 64 * 1024 * 1024,
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 10,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST and PORT environment variables
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_PERFORMANCE__MAX_CONCURRENT_SESSIONS=4`: Override session limit
    /// - `PORT=3000`: Special case for deployment platforms
    ///
    /// Sections are separated by a double underscore since field names
    /// contain single underscores.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // required(false) means "don't error if missing"
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        // Deployment platforms set these without the APP_ prefix
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - Default sample rate is one libopus can encode at
    /// - Channel capacity, upload limit and session limit are all positive
/// - Upload limit stays under `MAX_WAV_BYTES_CEILING`
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if !is_supported_sample_rate(self.encoder.default_sample_rate) {
            return Err(anyhow::anyhow!(
                "Default sample rate {} is not an Opus rate (expected one of {:?})",
                self.encoder.default_sample_rate,
                SUPPORTED_SAMPLE_RATES
            ));
        }

        if self.encoder.channel_capacity == 0 {
            return Err(anyhow::anyhow!("Channel capacity must be greater than 0"));
        }

        if self.encoder.max_wav_bytes < crate::audio::wav::WAV_HEADER_LEN {
            return Err(anyhow::anyhow!("Max WAV size must hold at least a 44 byte header"));
        }

        if self.encoder.max_wav_bytes > MAX_WAV_BYTES_CEILING {
            return Err(anyhow::anyhow!(
                "Max WAV size {} exceeds the {} byte ceiling",
                self.encoder.max_wav_bytes,
                MAX_WAV_BYTES_CEILING
            ));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        Ok(())
    }

    /// Update configuration from a JSON string (used for runtime config updates).
    ///
    /// ## Partial updates:
    /// Only fields present in the JSON are changed. For example
    /// `{"encoder": {"default_sample_rate": 16000}}` changes just the rate.
    /// The result is validated before returning.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial_config.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = u16::try_from(port)
                    .map_err(|_| anyhow::anyhow!("Server port {} is out of range", port))?;
            }
        }

        if let Some(encoder) = partial_config.get("encoder") {
            if let Some(rate) = encoder.get("default_sample_rate").and_then(|v| v.as_u64()) {
                self.encoder.default_sample_rate = u32::try_from(rate)
                    .map_err(|_| anyhow::anyhow!("Sample rate {} is out of range", rate))?;
            }
            if let Some(capacity) = encoder.get("channel_capacity").and_then(|v| v.as_u64()) {
                self.encoder.channel_capacity = capacity as usize;
            }
            if let Some(max_bytes) = encoder.get("max_wav_bytes").and_then(|v| v.as_u64()) {
                self.encoder.max_wav_bytes = max_bytes as usize;
            }
        }

        if let Some(performance) = partial_config.get("performance") {
            if let Some(sessions) = performance.get("max_concurrent_sessions").and_then(|v| v.as_u64()) {
                self.performance.max_concurrent_sessions = sessions as usize;
            }
        }

        self.validate()?;
        Ok(())
    }
}
