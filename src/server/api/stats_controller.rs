use axum::{
    Extension, Json, Router,
    extract::rejection::JsonRejection,
    routing::{get, post},
};
use tracing::debug;

use crate::server::{
    dtos::stats_dto::{StatsResponse, TrackRequest, TrackResponse},
    error::{AppResult, Error},
    extractors::Referer,
    services::edge_services::EdgeServices,
};

pub struct StatsController;

impl StatsController {
    pub fn app() -> Router {
        Router::new()
            .route("/track", post(Self::track_post))
            .route("/stats", get(Self::stats_get))
    }

    async fn track_post(
        Extension(services): Extension<EdgeServices>,
        Referer(referer): Referer,
        body: Result<Json<TrackRequest>, JsonRejection>,
    ) -> AppResult<Json<TrackResponse>> {
        let Json(track) = body.map_err(|rejection| {
            debug!("track body rejected: {}", rejection.body_text());
            Error::BadRequest("Invalid tracking event".to_string())
        })?;

        services
            .stats
            .record(track.event, track.bandwidth, referer.as_deref());

        Ok(Json(TrackResponse { success: true }))
    }

    async fn stats_get(Extension(services): Extension<EdgeServices>) -> Json<StatsResponse> {
        Json(StatsResponse {
            stats: services.stats.snapshot().into(),
            leaderboard: services.stats.leaderboard(),
        })
    }
}
