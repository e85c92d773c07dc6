use axum::{
    Extension, Json, Router,
    response::{IntoResponse, Response},
    routing::get,
};
use tracing::{info, warn};

use crate::{
    models::ServerId,
    server::{
        dtos::stream_dto::{MediaQuery, StreamResponse, SubtitlesResponse},
        error::Error,
        extractors::ValidatedQuery,
        services::{edge_services::EdgeServices, resolver_services::resolve_with_failover},
    },
};

pub struct StreamController;

impl StreamController {
    pub fn app() -> Router {
        Router::new().route("/", get(Self::stream_get))
    }

    /// resolves a movie or episode to a proxied manifest url. With `subtitles=true` the
    /// subtitles come back instead, with `failover=true` the other servers get a turn
    async fn stream_get(
        Extension(services): Extension<EdgeServices>,
        ValidatedQuery(query): ValidatedQuery<MediaQuery>,
    ) -> Response {
        let requested = ServerId::new(
            query
                .server
                .as_deref()
                .unwrap_or(&services.config.default_server),
        );

        let request = match query.to_request(&services.config.default_server) {
            Ok(request) => request,
            Err(e) => return Self::failure(Some(requested), e),
        };

        if query.subtitles {
            return match services.subtitles.fetch_subtitles(&request).await {
                Ok(subtitles) => Json(SubtitlesResponse {
                    success: true,
                    subtitles,
                    metadata: request.meta(),
                })
                .into_response(),
                Err(e) => Self::failure(None, e),
            };
        }

        info!(
            "stream request {} on {} (failover: {})",
            request.target_path(),
            request.server,
            query.failover
        );

        let result = if query.failover {
            resolve_with_failover(services.resolver.as_ref(), &request, &services.failover).await
        } else {
            services.resolver.resolve_stream(&request).await
        };

        match result {
            Ok(stream) => Json(StreamResponse::resolved(stream)).into_response(),
            Err(e) => {
                let server = match &e {
                    Error::NoStreamFound { server, .. } => ServerId::new(server.clone()),
                    _ => requested,
                };
                Self::failure(Some(server), e)
            }
        }
    }

    fn failure(server: Option<ServerId>, error: Error) -> Response {
        let status = error.status_code();
        warn!("stream request failed with {}: {}", status, error);
        (status, Json(StreamResponse::failed(server, &error))).into_response()
    }
}
