//! # Application State Management
//!
//! Shared state accessed by every HTTP handler and WebSocket actor at once.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc<RwLock<T>> Pattern
//! - **Arc**: Multiple ownership (many handlers hold a reference)
//! - **RwLock**: Multiple readers OR one writer at a time
//! - **T**: The actual data type being protected
//!
//! ### RAII Guards
//! - **SessionGuard**: holds one slot of the concurrent-transcode budget and gives
//!   it back in `Drop`, so a panicking or failing transcode can't leak a slot

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::pipeline::EncodeReport;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// The main application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Service configuration (can be updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// Request and transcoding metrics
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,
}

/// Metrics collected across all requests.
///
/// ## Why these metrics matter:
/// - **request_count / error_count**: load and reliability monitoring
/// - **active_sessions**: transcodes in flight, bounded by the config
/// - **encode**: totals across completed and failed transcodes
/// - **endpoint_metrics**: per-endpoint latency and error rates
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,
    pub active_sessions: u32,
    pub encode: EncodeMetrics,
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Totals over every transcode the server has run.
#[derive(Debug, Default, Clone)]
pub struct EncodeMetrics {
    pub completed: u64,
    pub failed: u64,
    pub frames_encoded: u64,
    pub bytes_encoded: u64,
    pub total_encode_ms: u64,
}

/// Detailed performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

/// One reserved transcode slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct SessionGuard {
    metrics: Arc<RwLock<AppMetrics>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Ok(mut metrics) = self.metrics.write() {
            metrics.active_sessions = metrics.active_sessions.saturating_sub(1);
        }
    }
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// ## Why clone:
    /// Cloning releases the lock immediately, so other threads aren't blocked.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Replace the configuration after validating it.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        match new_config.validate() {
            Ok(_) => {
                *self.config.write().unwrap() = new_config;
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint (e.g. "POST /api/v1/encode").
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Reserve a transcode slot.
    ///
    /// ## Returns:
    /// - **Ok(SessionGuard)**: slot reserved until the guard is dropped
    /// - **Err(AppError::Unavailable)**: `max_concurrent_sessions` already in flight
    ///
    /// The check and the increment happen under one write lock, so two requests
    /// can never both take the last slot.
    pub fn try_start_session(&self) -> AppResult<SessionGuard> {
        let limit = self.get_config().performance.max_concurrent_sessions;
        let mut metrics = self.metrics.write().unwrap();

        if metrics.active_sessions as usize >= limit {
            return Err(AppError::Unavailable(format!(
                "{} encode sessions already running",
                metrics.active_sessions
            )));
        }

        metrics.active_sessions += 1;
        Ok(SessionGuard {
            metrics: Arc::clone(&self.metrics),
        })
    }

    pub fn record_encode_success(&self, report: &EncodeReport) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.encode.completed += 1;
        metrics.encode.frames_encoded += report.frames as u64;
        metrics.encode.bytes_encoded += report.encoded_bytes as u64;
        metrics.encode.total_encode_ms += report.elapsed_ms;
    }

    pub fn record_encode_failure(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.encode.failed += 1;
    }

    /// Get a snapshot of current metrics (used for the /metrics endpoint).
    ///
    /// ## Why a snapshot:
    /// Cloning under a read lock means the lock isn't held while the HTTP
    /// response is serialized.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().unwrap().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    /// Average = Total Duration ÷ Number of Requests
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error Rate = Number of Errors ÷ Total Requests, from 0.0 to 1.0
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

impl AppMetrics {
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_limit(limit: usize) -> AppState {
        let mut config = AppConfig::default();
        config.performance.max_concurrent_sessions = limit;
        AppState::new(config)
    }

    #[test]
    fn test_session_limit_and_release() {
        let state = state_with_limit(2);

        let first = state.try_start_session().unwrap();
        let _second = state.try_start_session().unwrap();
        assert_eq!(state.get_metrics_snapshot().active_sessions, 2);
        assert!(matches!(state.try_start_session(), Err(AppError::Unavailable(_))));

        drop(first);
        assert_eq!(state.get_metrics_snapshot().active_sessions, 1);
        assert!(state.try_start_session().is_ok());
    }

    #[test]
    fn test_encode_totals() {
        let state = state_with_limit(1);
        let report = EncodeReport {
            frames: 5,
            encoded_bytes: 400,
            elapsed_ms: 3,
            ..Default::default()
        };
        state.record_encode_success(&report);
        state.record_encode_success(&report);
        state.record_encode_failure();

        let encode = state.get_metrics_snapshot().encode;
        assert_eq!(encode.completed, 2);
        assert_eq!(encode.failed, 1);
        assert_eq!(encode.frames_encoded, 10);
        assert_eq!(encode.bytes_encoded, 800);
    }

    #[test]
    fn test_endpoint_metrics() {
        let state = state_with_limit(1);
        state.record_endpoint_request("POST /api/v1/encode", 10, false);
        state.record_endpoint_request("POST /api/v1/encode", 30, true);

        let metrics = state.get_metrics_snapshot();
        let endpoint = &metrics.endpoint_metrics["POST /api/v1/encode"];
        assert_eq!(endpoint.average_duration_ms(), 20.0);
        assert_eq!(endpoint.error_rate(), 0.5);
    }

    #[test]
    fn test_update_config_validates() {
        let state = state_with_limit(1);
        let mut bad = state.get_config();
        bad.encoder.default_sample_rate = 11025;
        assert!(state.update_config(bad).is_err());
        assert_eq!(state.get_config().encoder.default_sample_rate, 48000);
    }
}
