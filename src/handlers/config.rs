use crate::{config::AppConfig, error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

fn config_json(config: &AppConfig) -> serde_json::Value {
    json!({
        "server": {
            "host": config.server.host,
            "port": config.server.port
        },
        "encoder": {
            "default_sample_rate": config.encoder.default_sample_rate,
            "channel_capacity": config.encoder.channel_capacity,
            "max_wav_bytes": config.encoder.max_wav_bytes
        },
        "performance": {
            "max_concurrent_sessions": config.performance.max_concurrent_sessions
        }
    })
}

pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": config_json(&state.get_config())
    })))
}

/// Apply a partial JSON update. Server host/port changes only take effect on restart.
pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config
        .update_from_json(&json_str)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    state.update_config(current_config.clone()).map_err(AppError::ValidationError)?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": config_json(&current_config)
    })))
}
