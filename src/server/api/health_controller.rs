use axum::Extension;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;

use crate::server::dtos::health_dto::{HealthResponse, HealthStatus, ServerTableHealth};
use crate::server::error::Error;
use crate::server::services::edge_services::EdgeServices;
use crate::server::{get_app_version, get_uptime_seconds};

/// health endpoint, there's nothing stateful behind this service so it only reports the
/// server table it was booted with
pub async fn health_endpoint(
    Extension(services): Extension<EdgeServices>,
) -> (StatusCode, Json<HealthResponse>) {
    let table = &services.table;

    let status = if table.is_empty() {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Healthy
    };

    let response = HealthResponse {
        status,
        timestamp: Utc::now(),
        uptime_seconds: get_uptime_seconds(),
        version: get_app_version().to_string(),
        environment: format!("{:?}", services.config.cargo_env).to_lowercase(),
        server_table: ServerTableHealth {
            name: table.name.clone(),
            profiles: table.len(),
            default_server: table.default_profile().id.to_string(),
        },
    };

    let http_status = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(response))
}

/// prometheus scrape target, only mounted when metrics are enabled
pub async fn metrics_endpoint(Extension(services): Extension<EdgeServices>) -> Response {
    match &services.metrics {
        Some(handle) => handle.render().into_response(),
        None => Error::NotFound("metrics are disabled".to_string()).into_response(),
    }
}
