use crate::audio::codec::SUPPORTED_SAMPLE_RATES;
use crate::config::AppConfig;
use crate::state::{AppMetrics, AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": metrics.error_rate(),
            "active_sessions": metrics.active_sessions
        },
        "encoder": {
            "codec": "opus",
            "default_sample_rate": config.encoder.default_sample_rate,
            "supported_sample_rates": SUPPORTED_SAMPLE_RATES,
            "frame_duration_ms": crate::audio::codec::FRAME_DURATION_MS
        },
        "memory": get_memory_info(),
        "system": get_system_status(&config, &metrics)
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let endpoint_stats: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();

    let encode = &metrics.encode;
    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": metrics.error_rate(),
            "active_sessions": metrics.active_sessions,
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "encode": {
            "completed": encode.completed,
            "failed": encode.failed,
            "frames_encoded": encode.frames_encoded,
            "bytes_encoded": encode.bytes_encoded,
            "average_encode_ms": if encode.completed > 0 {
                encode.total_encode_ms as f64 / encode.completed as f64
            } else {
                0.0
            }
        },
        "endpoints": endpoint_stats,
        "memory": get_memory_info(),
        "performance": {
            "max_concurrent_sessions": state.get_config().performance.max_concurrent_sessions
        }
    }))
}

/// Resident and virtual memory of this process, read from /proc on Linux.
fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", std::process::id())) {
            let field_bytes = |name: &str| {
                status
                    .lines()
                    .find(|line| line.starts_with(name))
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(|kb| kb.parse::<u64>().ok())
                    .map_or(0, |kb| kb * 1024)
            };

            return json!({
                "resident_memory_bytes": field_bytes("VmRSS:"),
                "virtual_memory_bytes": field_bytes("VmSize:"),
                "available": true
            });
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false,
        "note": "Memory info not available on this platform"
    })
}

fn get_system_status(config: &AppConfig, metrics: &AppMetrics) -> serde_json::Value {
    let session_usage = metrics.active_sessions as f64 / config.performance.max_concurrent_sessions.max(1) as f64;

    let status = if session_usage > 0.9 {
        "high_load"
    } else if session_usage > 0.7 {
        "moderate_load"
    } else {
        "normal"
    };

    json!({
        "status": status,
        "session_usage_percent": (session_usage * 100.0).round(),
        "max_sessions": config.performance.max_concurrent_sessions,
        "current_sessions": metrics.active_sessions,
        "load_warnings": if session_usage > 0.8 {
            vec!["High session usage - consider increasing max_concurrent_sessions"]
        } else {
            vec![]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_health_reports_encoder() {
        let state = AppState::new(AppConfig::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["encoder"]["default_sample_rate"], 48000);
        assert_eq!(body["system"]["status"], "normal");
    }

    #[::core::prelude::v1::test]
    fn test_system_status_load_levels() {
        let config = AppConfig::default(); // 10 sessions
        let mut metrics = AppMetrics::default();
        metrics.active_sessions = 10;
        assert_eq!(get_system_status(&config, &metrics)["status"], "high_load");
        metrics.active_sessions = 8;
        assert_eq!(get_system_status(&config, &metrics)["status"], "moderate_load");
    }
}
