use axum::{
    Extension, Router,
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
    routing::get,
};

use crate::server::{
    dtos::stream_dto::MediaQuery,
    error::AppResult,
    extractors::ValidatedQuery,
    services::edge_services::EdgeServices,
};

pub struct SubtitleController;

impl SubtitleController {
    pub fn app() -> Router {
        Router::new().route("/", get(Self::subtitles_get))
    }

    /// raw srt passthrough, the player converts it itself
    async fn subtitles_get(
        Extension(services): Extension<EdgeServices>,
        ValidatedQuery(query): ValidatedQuery<MediaQuery>,
    ) -> AppResult<Response> {
        let request = query.to_request(&services.config.default_server)?;
        let subtitles = services.subtitles.fetch_subtitles(&request).await?;

        Ok((
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )],
            subtitles,
        )
            .into_response())
    }
}
