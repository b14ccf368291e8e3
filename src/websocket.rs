//! # WebSocket Encode Handler
//!
//! Clients connect to `/ws/encode` and send WAV files as binary messages; the
//! server answers with the encoded Opus packets as they are produced.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: optional `?sample_rate=N` query selects the Opus rate
//! 2. **Ready**: server sends a JSON `ready` message with the session id and rate
//! 3. **Configure** (optional): JSON `configure` message changes the rate
//! 4. **Audio**: one binary message = one complete WAV file
//! 5. **Packets**: one binary message per 20ms Opus frame, in order
//! 6. **Result**: JSON `complete` with the encode report, or `error`
//!
//! One WAV is encoded at a time per connection. Frames flow through a bounded
//! channel, and the forwarding task waits for the actor to handle each frame
//! before taking the next one, so a slow client slows the encoder down.

use crate::error::PipelineError;
use crate::handlers::encode::{resolve_sample_rate, EncodeQuery};
use crate::pipeline::{EncodeReport, Encoder};
use crate::audio::wav::WavPcm;
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_http::ws::Item;
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// JSON control messages exchanged over the socket.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WebSocketMessage {
    /// Client → server: change the target Opus sample rate
    Configure { sample_rate: u32 },

    /// Server → client: connection ready for WAV data
    Ready { session_id: String, sample_rate: u32 },

    /// Server → client: the last WAV was fully encoded
    Complete { session_id: String, report: EncodeReport },

    /// Server → client: something went wrong
    Error { code: String, message: String },

    /// Heartbeat ping (server → client)
    Ping { timestamp: u64 },

    /// Heartbeat response (client → server)
    Pong { timestamp: u64 },
}

/// Progress of an encode running on the blocking pool.
#[derive(Debug, Message)]
#[rtype(result = "()")]
pub enum EncodeEvent {
    Frame(Vec<u8>),
    Finished(Result<EncodeReport, PipelineError>),
}

impl From<Vec<u8>> for EncodeEvent {
    fn from(payload: Vec<u8>) -> Self {
        EncodeEvent::Frame(payload)
    }
}

/// One WebSocket connection.
pub struct EncodeWebSocket {
    state: web::Data<AppState>,
    session_id: Uuid,
    sample_rate: u32,
    last_heartbeat: Instant,
    /// An encode is in flight; further WAVs are refused until it finishes
    encoding: bool,
    /// Fragments of a binary message split across continuation frames
    fragments: Option<Vec<u8>>,
}

impl EncodeWebSocket {
    pub fn new(state: web::Data<AppState>, session_id: Uuid, sample_rate: u32) -> Self {
        Self {
            state,
            session_id,
            sample_rate,
            last_heartbeat: Instant::now(),
            encoding: false,
            fragments: None,
        }
    }

    fn send_json(&self, ctx: &mut ws::WebsocketContext<Self>, msg: &WebSocketMessage) {
        if let Ok(json) = serde_json::to_string(msg) {
            ctx.text(json);
        }
    }

    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, code: &str, message: &str) {
        warn!(session_id = %self.session_id, code, "WebSocket error: {}", message);
        self.send_json(
            ctx,
            &WebSocketMessage::Error {
                code: code.to_string(),
                message: message.to_string(),
            },
        );
    }

    /// Validate a WAV message and start encoding it on the blocking pool.
    fn handle_wav(&mut self, data: &[u8], ctx: &mut ws::WebsocketContext<Self>) -> Result<(), (&'static str, String)> {
        if self.encoding {
            return Err(("busy", "An encode is already running on this connection".to_string()));
        }

        let config = self.state.get_config();
        if data.len() > config.encoder.max_wav_bytes {
            return Err((
                "too_large",
                format!("WAV of {} bytes exceeds the {} byte limit", data.len(), config.encoder.max_wav_bytes),
            ));
        }

        let pcm = WavPcm::parse(data).map_err(|e| (e.kind(), e.to_string()))?;
        let session = self
            .state
            .try_start_session()
            .map_err(|e| ("unavailable", e.to_string()))?;
        let mut encoder = Encoder::opus(self.sample_rate).map_err(|e| (e.kind(), e.to_string()))?;

        debug!(
            session_id = %self.session_id,
            bytes = data.len(),
            source_rate = pcm.sample_rate,
            "Encoding WAV message"
        );

        self.encoding = true;
        let (tx, mut rx) = mpsc::channel::<EncodeEvent>(config.encoder.channel_capacity);
        let state = self.state.clone().into_inner();

        tokio::task::spawn_blocking(move || {
            let _session = session;
            let mut frames = tx.clone();
            let result = encoder.encode_pcm(&pcm, &mut frames);

            match &result {
                Ok(report) => state.record_encode_success(report),
                Err(_) => state.record_encode_failure(),
            }
            let _ = tx.blocking_send(EncodeEvent::Finished(result));
        });

        // Dropping `rx` when the actor is gone closes the sink and stops the encoder.
        let addr = ctx.address();
        actix::spawn(async move {
            while let Some(event) = rx.recv().await {
                if addr.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(())
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::from_str::<WebSocketMessage>(text) {
            Ok(WebSocketMessage::Configure { sample_rate }) => {
                match resolve_sample_rate(Some(sample_rate), self.sample_rate) {
                    Ok(rate) => {
                        self.sample_rate = rate;
                        info!(session_id = %self.session_id, sample_rate = rate, "WebSocket reconfigured");
                        self.send_json(
                            ctx,
                            &WebSocketMessage::Ready {
                                session_id: self.session_id.to_string(),
                                sample_rate: rate,
                            },
                        );
                    }
                    Err(err) => self.send_error(ctx, "invalid_sample_rate", &err.to_string()),
                }
            }
            Ok(WebSocketMessage::Pong { .. }) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(_) => self.send_error(ctx, "unexpected_message", "Message type is not accepted from clients"),
            Err(err) => self.send_error(ctx, "invalid_json", &format!("Invalid JSON: {}", err)),
        }
    }

    /// Reassemble a binary message sent as continuation frames.
    fn handle_fragment(&mut self, item: Item, ctx: &mut ws::WebsocketContext<Self>) {
        match item {
            Item::FirstBinary(data) => {
                self.fragments = Some(Vec::new());
                self.push_fragment(&data, ctx);
            }
            Item::Continue(data) => {
                self.push_fragment(&data, ctx);
            }
            Item::Last(data) => {
                if self.push_fragment(&data, ctx) {
                    if let Some(buffer) = self.fragments.take() {
                        self.handle_binary(&buffer, ctx);
                    }
                }
            }
            Item::FirstText(_) => {
                self.send_error(ctx, "unsupported", "Fragmented text messages are not supported");
            }
        }
    }

    /// Append to the pending message. Returns false when there is none, or when
    /// this fragment would push it past `max_wav_bytes` and it was discarded.
    fn push_fragment(&mut self, data: &[u8], ctx: &mut ws::WebsocketContext<Self>) -> bool {
        let pending = match self.fragments.as_ref() {
            Some(buffer) => buffer.len(),
            None => return false,
        };

        let limit = self.state.get_config().encoder.max_wav_bytes;
        if pending + data.len() > limit {
            self.fragments = None;
            self.send_error(
                ctx,
                "too_large",
                &format!("Fragmented WAV exceeds the {} byte limit", limit),
            );
            return false;
        }

        if let Some(buffer) = self.fragments.as_mut() {
            buffer.extend_from_slice(data);
        }
        true
    }

    fn handle_binary(&mut self, data: &[u8], ctx: &mut ws::WebsocketContext<Self>) {
        if let Err((code, message)) = self.handle_wav(data, ctx) {
            self.send_error(ctx, code, &message);
        }
    }
}

impl Actor for EncodeWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(session_id = %self.session_id, sample_rate = self.sample_rate, "WebSocket connection started");

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(session_id = %act.session_id, "WebSocket heartbeat timeout, closing connection");
                ctx.stop();
                return;
            }
            let timestamp = chrono::Utc::now().timestamp_millis().max(0) as u64;
            act.send_json(ctx, &WebSocketMessage::Ping { timestamp });
        });

        self.send_json(
            ctx,
            &WebSocketMessage::Ready {
                session_id: self.session_id.to_string(),
                sample_rate: self.sample_rate,
            },
        );
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(session_id = %self.session_id, "WebSocket connection stopped");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for EncodeWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => self.handle_text(&text, ctx),
            Ok(ws::Message::Binary(data)) => self.handle_binary(&data, ctx),
            Ok(ws::Message::Continuation(item)) => self.handle_fragment(item, ctx),
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(session_id = %self.session_id, "WebSocket closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                warn!(session_id = %self.session_id, "WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

impl Handler<EncodeEvent> for EncodeWebSocket {
    type Result = ();

    fn handle(&mut self, event: EncodeEvent, ctx: &mut Self::Context) {
        match event {
            EncodeEvent::Frame(payload) => ctx.binary(payload),
            EncodeEvent::Finished(Ok(report)) => {
                self.encoding = false;
                self.send_json(
                    ctx,
                    &WebSocketMessage::Complete {
                        session_id: self.session_id.to_string(),
                        report,
                    },
                );
            }
            EncodeEvent::Finished(Err(err)) => {
                self.encoding = false;
                self.send_error(ctx, err.kind(), &err.to_string());
            }
        }
    }
}

/// WebSocket endpoint handler.
///
/// ## HTTP to WebSocket Upgrade:
/// The initial request is upgraded here; the `EncodeWebSocket` actor handles
/// everything afterwards. Frame size is raised to the WAV upload limit so a
/// whole file fits in one binary message.
pub async fn encode_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let query = web::Query::<EncodeQuery>::from_query(req.query_string())
        .map_err(|e| crate::error::AppError::BadRequest(e.to_string()))?;

    let config = state.get_config();
    let sample_rate = resolve_sample_rate(query.sample_rate, config.encoder.default_sample_rate)?;
    let session_id = crate::middleware::RequestId::of(&req).0;

    info!(
        session_id = %session_id,
        peer = ?req.connection_info().peer_addr(),
        "New WebSocket connection request"
    );

    ws::WsResponseBuilder::new(EncodeWebSocket::new(state, session_id, sample_rate), &req, stream)
        .frame_size(config.encoder.max_wav_bytes)
        .start()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_message_parsing() {
        let msg: WebSocketMessage = serde_json::from_str(r#"{"type":"configure","sample_rate":16000}"#).unwrap();
        match msg {
            WebSocketMessage::Configure { sample_rate } => assert_eq!(sample_rate, 16000),
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_complete_message_serialization() {
        let report = EncodeReport {
            source_sample_rate: 8000,
            target_sample_rate: 48000,
            frames: 12,
            ..Default::default()
        };
        let json = serde_json::to_string(&WebSocketMessage::Complete {
            session_id: "abc".to_string(),
            report,
        })
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "complete");
        assert_eq!(value["report"]["frames"], 12);
        assert_eq!(value["report"]["target_sample_rate"], 48000);
    }

    #[test]
    fn test_error_message_creation() {
        let json = serde_json::to_string(&WebSocketMessage::Error {
            code: "malformed_input".to_string(),
            message: "bytes are not wav".to_string(),
        })
        .unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains("malformed_input"));
    }

    #[test]
    fn test_frames_convert_to_events() {
        assert!(matches!(EncodeEvent::from(vec![1, 2]), EncodeEvent::Frame(p) if p == vec![1, 2]));
    }

    use crate::audio::wav::tests::wav_from_samples;
    use crate::config::AppConfig;
    use actix_web::{web::Bytes, App};
    use futures_util::{SinkExt, Stream, StreamExt};

    #[derive(Default)]
    struct Transcript {
        packets: Vec<Bytes>,
        messages: Vec<serde_json::Value>,
    }

    /// Read frames until the server reports `complete`.
    async fn read_until_complete<S, E>(socket: &mut S) -> Transcript
    where
        S: Stream<Item = Result<ws::Frame, E>> + Unpin,
        E: std::fmt::Debug,
    {
        let mut transcript = Transcript::default();
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(10), socket.next())
                .await
                .expect("server went quiet")
                .expect("socket closed")
                .expect("protocol error");

            match frame {
                ws::Frame::Binary(packet) => transcript.packets.push(packet),
                ws::Frame::Text(text) => {
                    let value: serde_json::Value = serde_json::from_slice(&text).unwrap();
                    let done = value["type"] == "complete";
                    transcript.messages.push(value);
                    if done {
                        return transcript;
                    }
                }
                _ => {}
            }
        }
    }

    fn start_server(config: AppConfig) -> actix_test::TestServer {
        let state = web::Data::new(AppState::new(config));
        actix_test::start(move || {
            App::new()
                .app_data(state.clone())
                .route("/ws/encode", web::get().to(encode_websocket))
        })
    }

    #[actix_web::test]
    async fn test_wav_message_streams_packets_then_complete() {
        let mut srv = start_server(AppConfig::default());
        let mut socket = srv.ws_at("/ws/encode?sample_rate=16000").await.unwrap();

        // 100ms at 16 kHz → 5 frames
        let wav = wav_from_samples(16000, &vec![0i16; 1600]);
        socket.send(ws::Message::Binary(Bytes::from(wav))).await.unwrap();

        let transcript = read_until_complete(&mut socket).await;
        assert_eq!(transcript.messages.len(), 2);
        assert_eq!(transcript.messages[0]["type"], "ready");
        assert_eq!(transcript.messages[0]["sample_rate"], 16000);
        assert_eq!(transcript.packets.len(), 5);
        assert!(transcript.packets.iter().all(|p| !p.is_empty()));
        assert_eq!(transcript.messages[1]["report"]["frames"], 5);
    }

    #[actix_web::test]
    async fn test_fragmented_wav_is_reassembled() {
        let mut srv = start_server(AppConfig::default());
        let mut socket = srv.ws_at("/ws/encode?sample_rate=16000").await.unwrap();

        let wav = Bytes::from(wav_from_samples(16000, &vec![7i16; 1600]));
        let pieces = [
            Item::FirstBinary(wav.slice(..1000)),
            Item::Continue(wav.slice(1000..2000)),
            Item::Last(wav.slice(2000..)),
        ];
        for piece in pieces {
            socket.send(ws::Message::Continuation(piece)).await.unwrap();
        }

        let transcript = read_until_complete(&mut socket).await;
        assert_eq!(transcript.messages.len(), 2);
        assert_eq!(transcript.packets.len(), 5);
        assert_eq!(transcript.messages[1]["report"]["mono_samples"], 1600);
    }

    #[actix_web::test]
    async fn test_oversized_fragments_are_dropped() {
        let mut config = AppConfig::default();
        config.encoder.max_wav_bytes = 100;
        let mut srv = start_server(config);
        let mut socket = srv.ws_at("/ws/encode?sample_rate=8000").await.unwrap();

        // 120 bytes pending after the second fragment: over the limit
        let chunk = Bytes::from(vec![0u8; 60]);
        socket.send(ws::Message::Continuation(Item::FirstBinary(chunk.clone()))).await.unwrap();
        socket.send(ws::Message::Continuation(Item::Continue(chunk.clone()))).await.unwrap();
        // Tail of the discarded message is ignored
        socket.send(ws::Message::Continuation(Item::Last(chunk))).await.unwrap();

        // The connection still accepts a WAV under the limit (84 bytes, no full frame)
        let wav = wav_from_samples(8000, &[0i16; 20]);
        socket.send(ws::Message::Binary(Bytes::from(wav))).await.unwrap();

        let transcript = read_until_complete(&mut socket).await;
        assert_eq!(transcript.messages.len(), 3);
        assert_eq!(transcript.messages[1]["type"], "error");
        assert_eq!(transcript.messages[1]["code"], "too_large");
        assert_eq!(transcript.messages[2]["report"]["frames"], 0);
        assert!(transcript.packets.is_empty());
    }

    #[actix_web::test]
    async fn test_second_wav_refused_while_encoding() {
        let mut srv = start_server(AppConfig::default());
        let mut socket = srv.ws_at("/ws/encode?sample_rate=48000").await.unwrap();

        // 10 s at 48 kHz → 500 frames, still encoding when the second copy lands
        let wav = Bytes::from(wav_from_samples(48000, &vec![0i16; 480_000]));
        socket.send(ws::Message::Binary(wav.clone())).await.unwrap();
        socket.send(ws::Message::Binary(wav)).await.unwrap();

        let transcript = read_until_complete(&mut socket).await;
        assert_eq!(transcript.packets.len(), 500);

        let errors: Vec<_> = transcript.messages.iter().filter(|m| m["type"] == "error").collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["code"], "busy");
    }

    #[actix_web::test]
    async fn test_malformed_wav_reports_error() {
        let mut srv = start_server(AppConfig::default());
        let mut socket = srv.ws_at("/ws/encode").await.unwrap();

        socket.send(ws::Message::Binary(Bytes::from(vec![0u8; 43]))).await.unwrap();
        // Follow with a valid WAV so the exchange ends with `complete`
        let wav = wav_from_samples(8000, &[0i16; 8]);
        socket.send(ws::Message::Binary(Bytes::from(wav))).await.unwrap();

        let transcript = read_until_complete(&mut socket).await;
        assert_eq!(transcript.messages[0]["sample_rate"], 48000);
        assert_eq!(transcript.messages[1]["code"], "malformed_input");
        assert_eq!(transcript.messages.len(), 3);
    }
}
