pub mod api;
pub mod dtos;
pub mod error;
pub mod extractors;
pub mod services;
pub mod utils;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::{
    BoxError, Extension, Json, Router,
    error_handling::HandleErrorLayer,
    extract::Request,
    http::{HeaderValue, StatusCode},
    routing::get,
};
use metrics_exporter_prometheus::PrometheusHandle;
use once_cell::sync::Lazy;
use tokio::net::TcpListener;
use tower::{Layer, ServiceBuilder, timeout::TimeoutLayer};
use tower_http::{
    cors::{Any, CorsLayer},
    normalize_path::NormalizePathLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::AppConfig;
use api::{
    health_controller::{health_endpoint, metrics_endpoint},
    proxy_controller::ProxyController,
    stats_controller::StatsController,
    stream_controller::StreamController,
    subtitle_controller::SubtitleController,
};
use error::{Error, ErrorResponse};
use services::edge_services::EdgeServices;

static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

pub fn get_uptime_seconds() -> u64 {
    START_TIME.elapsed().as_secs()
}

pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub struct EdgeApplicationServer;

impl EdgeApplicationServer {
    pub async fn serve(
        config: Arc<AppConfig>,
        metrics: Option<PrometheusHandle>,
    ) -> anyhow::Result<()> {
        Lazy::force(&START_TIME);

        let mut services = EdgeServices::new(config.clone())?;
        if let Some(handle) = metrics {
            services = services.with_metrics(handle);
        }

        // trailing slashes are trimmed before routing, so /api/v1/stream/ hits /api/v1/stream
        let app = NormalizePathLayer::trim_trailing_slash().layer(Self::router(services));

        let listener = TcpListener::bind(("0.0.0.0", config.port))
            .await
            .with_context(|| format!("failed to bind port {}", config.port))?;

        info!("routes ready, listening on {}", listener.local_addr()?);

        axum::serve(
            listener,
            axum::ServiceExt::<Request>::into_make_service(app),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("error while serving")?;

        Ok(())
    }

    /// every route with its layers, without binding anything. Tests drive this directly
    pub fn router(services: EdgeServices) -> Router {
        let cors = Self::cors_layer(&services.config.cors_origin);
        let request_timeout = Duration::from_secs(services.config.request_timeout_secs);
        let enable_metrics = services.config.enable_metrics;

        let mut router = Router::new()
            .nest("/api/v1/stream", StreamController::app())
            .nest("/api/v1/proxy", ProxyController::app())
            .nest("/api/v1/subtitles", SubtitleController::app())
            .nest("/api/v1", StatsController::app())
            .route("/api/v1/health", get(health_endpoint));

        if enable_metrics {
            router = router.route("/metrics", get(metrics_endpoint));
        }

        router.fallback(Self::not_found).layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                // wraps the timeout so preflights and 504s still carry the cors headers
                .layer(cors)
                .layer(HandleErrorLayer::new(Self::handle_timeout_error))
                .layer(TimeoutLayer::new(request_timeout))
                .layer(Extension(services)),
        )
    }

    /// answers every OPTIONS request on its own with 200 and an empty body
    fn cors_layer(origin: &str) -> CorsLayer {
        let layer = CorsLayer::new()
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(Any)
            .max_age(Duration::from_secs(86400));

        if origin.trim() == "*" {
            return layer.allow_origin(Any);
        }

        let origins: Vec<HeaderValue> = origin
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("skipping invalid cors origin '{}'", o);
                    None
                }
            })
            .collect();

        if origins.is_empty() {
            warn!("no usable cors origins in '{}', allowing any", origin);
            return layer.allow_origin(Any);
        }

        layer.allow_origin(origins)
    }

    async fn handle_timeout_error(err: BoxError) -> (StatusCode, Json<ErrorResponse>) {
        let (status, message) = if err.is::<tower::timeout::error::Elapsed>() {
            (StatusCode::GATEWAY_TIMEOUT, "Request timed out".to_string())
        } else {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Unhandled internal error: {}", err),
            )
        };

        (
            status,
            Json(ErrorResponse {
                success: false,
                error: message,
            }),
        )
    }

    async fn not_found() -> Error {
        Error::NotFound("Not found".to_string())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {}", e);
    }
    info!("shutting down");
}
