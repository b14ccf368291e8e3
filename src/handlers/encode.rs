//! # Streaming Encode Endpoint
//!
//! `POST /api/v1/encode?sample_rate=48000` with a WAV file as the request body.
//!
//! ## Response Body:
//! A stream of Opus packets, each prefixed with its length:
//!
//! ```text
//! [u32 little-endian length][packet bytes][u32 length][packet bytes]...
//! ```
//!
//! Packets are written as soon as the encoder produces them; the response starts
//! before the transcode finishes. When the client reads slowly the bounded
//! channel fills and the encoder thread waits.
//!
//! ## Error Handling:
//! - Malformed WAV, unsupported rate → 400 before any body is sent
//! - Session limit reached → 503
//! - Failure mid-stream → the body is aborted after the packets already sent

use crate::audio::codec::{is_supported_sample_rate, SUPPORTED_SAMPLE_RATES};
use crate::audio::sink::{FrameSink, SinkClosed};
use crate::audio::wav::WavPcm;
use crate::error::{AppError, AppResult};
use crate::middleware::RequestId;
use crate::pipeline::Encoder;
use crate::state::AppState;
use actix_web::{web, HttpRequest, HttpResponse};
use byteorder::{LittleEndian, WriteBytesExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

/// Length of the per-packet prefix in the response body.
pub const LENGTH_PREFIX_BYTES: usize = 4;

type BodyChunk = Result<web::Bytes, AppError>;

#[derive(Debug, Deserialize)]
pub struct EncodeQuery {
    /// Target Opus sample rate; falls back to `encoder.default_sample_rate`
    pub sample_rate: Option<u32>,
}

/// Frame sink that writes length-prefixed packets into a response body channel.
pub struct LengthPrefixedSink {
    tx: mpsc::Sender<BodyChunk>,
}

impl LengthPrefixedSink {
    pub fn new(tx: mpsc::Sender<BodyChunk>) -> Self {
        Self { tx }
    }
}

impl FrameSink for LengthPrefixedSink {
    fn send_frame(&mut self, payload: Vec<u8>) -> Result<(), SinkClosed> {
        let mut chunk = Vec::with_capacity(LENGTH_PREFIX_BYTES + payload.len());
        chunk
            .write_u32::<LittleEndian>(payload.len() as u32)
            .map_err(|_| SinkClosed)?;
        chunk.extend_from_slice(&payload);
        self.tx
            .blocking_send(Ok(web::Bytes::from(chunk)))
            .map_err(|_| SinkClosed)
    }
}

/// Pick the target rate and make sure libopus can encode at it.
pub fn resolve_sample_rate(requested: Option<u32>, default: u32) -> AppResult<u32> {
    let rate = requested.unwrap_or(default);
    if !is_supported_sample_rate(rate) {
        return Err(AppError::BadRequest(format!(
            "sample_rate {} is not supported (expected one of {:?})",
            rate, SUPPORTED_SAMPLE_RATES
        )));
    }
    Ok(rate)
}

pub async fn encode_wav(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<EncodeQuery>,
    body: web::Bytes,
) -> AppResult<HttpResponse> {
    let config = state.get_config();
    if body.len() > config.encoder.max_wav_bytes {
        return Err(AppError::BadRequest(format!(
            "WAV body of {} bytes exceeds the {} byte limit",
            body.len(),
            config.encoder.max_wav_bytes
        )));
    }

    let sample_rate = resolve_sample_rate(query.sample_rate, config.encoder.default_sample_rate)?;
    let pcm = WavPcm::parse(&body)?;
    let session = state.try_start_session()?;
    let session_id = RequestId::of(&req).0;

    // The encoder is built here so a libopus rejection is still a clean error response.
    let mut encoder = Encoder::opus(sample_rate)?;

    info!(
        session_id = %session_id,
        source_rate = pcm.sample_rate,
        target_rate = sample_rate,
        duration_ms = pcm.duration_ms(),
        "Starting streaming encode"
    );

    let (tx, rx) = mpsc::channel::<BodyChunk>(config.encoder.channel_capacity);
    let state = state.into_inner();

    tokio::task::spawn_blocking(move || {
        let _session = session;
        let mut sink = LengthPrefixedSink::new(tx.clone());

        match encoder.encode_pcm(&pcm, &mut sink) {
            Ok(report) => {
                state.record_encode_success(&report);
                info!(session_id = %session_id, frames = report.frames, "Streaming encode finished");
            }
            Err(err) => {
                state.record_encode_failure();
                warn!(session_id = %session_id, error = %err, "Streaming encode failed");
                // Aborts the response body; ignored if the client already left
                let _ = tx.blocking_send(Err(AppError::from(err)));
            }
        }
    });

    Ok(HttpResponse::Ok()
        .content_type("application/octet-stream")
        .insert_header(("x-opus-sample-rate", sample_rate.to_string()))
        .insert_header(("x-opus-channels", "2"))
        .streaming(ReceiverStream::new(rx)))
}

/// Split a response body back into packets. Used by clients and tests.
pub fn split_packets(mut body: &[u8]) -> Option<Vec<Vec<u8>>> {
    use byteorder::ReadBytesExt;

    let mut packets = Vec::new();
    while !body.is_empty() {
        let len = body.read_u32::<LittleEndian>().ok()? as usize;
        if body.len() < len {
            return None;
        }
        packets.push(body[..len].to_vec());
        body = &body[len..];
    }
    Some(packets)
}
