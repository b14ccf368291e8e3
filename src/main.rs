//! # wav2opus - Server Entry Point
//!
//! Runs the transcoding pipeline behind an Actix-web server.
//!
//! ## Endpoints:
//! - `GET  /health`, `GET /api/v1/health`: liveness and basic status
//! - `GET  /api/v1/metrics`: request, session and encode counters
//! - `GET|PUT /api/v1/config`: read or update runtime configuration
//! - `POST /api/v1/encode`: WAV body in, length-prefixed Opus packets out
//! - `GET  /ws/encode`: WebSocket, WAV messages in, Opus packets out
//!
//! ## Key Rust Concepts Used:
//! - **async/await**: the server and signal handling run on the Actix runtime
//! - **spawn_blocking**: encodes run on the blocking pool, never on a worker thread
//! - **Arc & RwLock**: configuration and metrics are shared by every worker

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wav2opus::config::{AppConfig, MAX_WAV_BYTES_CEILING};
use wav2opus::state::AppState;
use wav2opus::{handlers, health, middleware, websocket};

/// Set once SIGTERM or SIGINT arrives.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting wav2opus v{}", env!("CARGO_PKG_VERSION"));
    info!(
        host = %config.server.host,
        port = config.server.port,
        default_sample_rate = config.encoder.default_sample_rate,
        max_sessions = config.performance.max_concurrent_sessions,
        "Configuration loaded"
    );

    let app_state = AppState::new(config.clone());
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            // Fixed ceiling; handlers enforce the live `encoder.max_wav_bytes`
            .app_data(web::PayloadConfig::new(MAX_WAV_BYTES_CEILING))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/config", web::put().to(handlers::update_config))
                    .route("/encode", web::post().to(handlers::encode_wav)),
            )
            .route("/ws/encode", web::get().to(websocket::encode_websocket))
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            // Graceful: in-flight encodes finish streaming first
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize tracing.
///
/// `RUST_LOG` controls the filter; defaults to `wav2opus=debug,actix_web=info`.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wav2opus=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Flip `SHUTDOWN_SIGNAL` on SIGTERM or SIGINT.
fn setup_signal_handlers() {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async {
        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
