//! # Error Handling
//!
//! This module defines the two error types used across the crate:
//!
//! - **PipelineError**: failures of the WAV → Opus transcoding pipeline itself.
//!   These are plain library errors with no knowledge of HTTP.
//! - **AppError**: errors surfaced by the HTTP/WebSocket service, converted into
//!   JSON responses with a matching status code.
//!
//! ## Key Rust Concepts for Error Handling:
//!
//! ### Result<T, E> Type
//! - **T**: The success type (what you get when everything works)
//! - **E**: The error type (what you get when something goes wrong)
//! - **?**: Returns early with the error, converting it through `From` if needed
//!
//! ### Traits for Error Conversion
//! - **From trait**: Automatically converts between error types
//! - **ResponseError trait**: Converts errors to HTTP responses
//! - **Display trait**: Defines how errors are formatted as strings

use actix_web::{HttpResponse, ResponseError};  // Web framework error handling
use serde_json::json;                          // For creating JSON error responses
use std::fmt;                                  // For implementing Display trait

/// Errors produced by the transcoding pipeline.
///
/// ## Stages:
/// - **MalformedInput**: detected during WAV extraction; nothing has been sent yet
/// - **EncoderConstruction**: the codec rejected the requested configuration;
///   nothing has been sent yet
/// - **EncodeFailure**: a single frame failed to encode; frames before it were
///   already delivered to the output channel and stay delivered
/// - **ChannelClosed**: the consumer dropped its end of the output channel
///
/// There is no retry anywhere in the pipeline: every variant is terminal for the
/// invocation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Input bytes are not a usable 16-bit PCM WAV payload
    MalformedInput(String),

    /// The Opus encoder could not be created or configured
    EncoderConstruction(String),

    /// Encoding of frame number `frame` (zero based) failed
    EncodeFailure { frame: usize, reason: String },

    /// The output channel was closed before frame `frame` could be delivered
    ChannelClosed { frame: usize },
}

impl PipelineError {
    /// Short machine-readable name of the failing stage.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::MalformedInput(_) => "malformed_input",
            PipelineError::EncoderConstruction(_) => "encoder_construction",
            PipelineError::EncodeFailure { .. } => "encode_failure",
            PipelineError::ChannelClosed { .. } => "channel_closed",
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::MalformedInput(msg) => write!(f, "malformed input: {}", msg),
            PipelineError::EncoderConstruction(msg) => {
                write!(f, "opus encoder construction failed: {}", msg)
            }
            PipelineError::EncodeFailure { frame, reason } => {
                write!(f, "opus encode failed at frame {}: {}", frame, reason)
            }
            PipelineError::ChannelClosed { frame } => {
                write!(f, "output channel closed before frame {} was sent", frame)
            }
        }
    }
}

impl std::error::Error for PipelineError {}

/// Convenience alias for pipeline results.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Custom error types for the service.
///
/// ## Error Categories:
/// - **Internal**: Server-side problems (500 errors)
/// - **BadRequest**: Client sent invalid data (400 errors)
/// - **ConfigError**: Configuration problems (500 errors)
/// - **ValidationError**: Data validation failed (400 errors)
/// - **Unavailable**: Too many encode sessions in flight (503 errors)
///
/// ## Usage Example:
/// ```rust
/// use wav2opus::error::AppError;
/// let err = AppError::BadRequest("Invalid JSON".to_string());
/// assert!(err.to_string().contains("Invalid JSON"));
/// ```
#[derive(Debug)]
pub enum AppError {
    /// Internal server errors (encoder failures, task failures, etc.)
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// User input failed validation rules
    ValidationError(String),

    /// The server is at its concurrent session limit
    Unavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Unavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

/// Lets `AppError` travel as the error half of a streaming response body.
impl std::error::Error for AppError {}

/// Implementation of the ResponseError trait for AppError.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "bad_request",
///     "message": "malformed input: bytes are not wav",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            AppError::Internal(_) | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error_type, message) = match self {
            AppError::Internal(msg) => ("internal_error", msg),
            AppError::BadRequest(msg) => ("bad_request", msg),
            AppError::ConfigError(msg) => ("config_error", msg),
            AppError::ValidationError(msg) => ("validation_error", msg),
            AppError::Unavailable(msg) => ("service_unavailable", msg),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": error_type,           // Machine-readable error type
                "message": message,           // Human-readable error message
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// Pipeline failures map onto HTTP semantics by stage.
///
/// ## Mapping:
/// - Malformed input is the client's fault → BadRequest (400)
/// - Everything else happens server-side → Internal (500)
impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::MalformedInput(_) => AppError::BadRequest(err.to_string()),
            _ => AppError::Internal(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing errors are almost always the client's fault, hence BadRequest.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Type alias for Results that use the service error type.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_messages() {
        let err = PipelineError::EncodeFailure { frame: 3, reason: "bad arg".to_string() };
        assert_eq!(err.to_string(), "opus encode failed at frame 3: bad arg");
        assert_eq!(err.kind(), "encode_failure");

        let err = PipelineError::MalformedInput("bytes are not wav".to_string());
        assert!(err.to_string().contains("bytes are not wav"));
    }

    #[test]
    fn test_pipeline_error_status_mapping() {
        let bad: AppError = PipelineError::MalformedInput("odd payload".to_string()).into();
        assert_eq!(bad.status_code(), actix_web::http::StatusCode::BAD_REQUEST);

        let internal: AppError = PipelineError::ChannelClosed { frame: 0 }.into();
        assert_eq!(internal.status_code(), actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);

        let busy = AppError::Unavailable("full".to_string());
        assert_eq!(busy.status_code(), actix_web::http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_every_variant_has_a_response() {
        use actix_web::http::StatusCode;

        let cases = [
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (AppError::ConfigError("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::ValidationError("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Unavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{}", err);
            assert_eq!(err.error_response().status(), status);
        }
    }
}
