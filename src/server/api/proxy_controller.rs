// the proxy the player actually talks to. Manifests come back rewritten, segments are streamed
// through untouched. CORS is handled by the router layer so every response here (errors
// included) is readable from another origin.
use axum::{
    Extension, Router,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tracing::{debug, error, info};
use url::Url;
use validator::Validate;

use crate::{
    models::{MediaType, ServerId, StreamRequest},
    server::{
        error::{AppResult, Error},
        extractors::ValidatedQuery,
        services::{edge_services::EdgeServices, upstream_services::ProxiedAsset},
        utils::{
            encoding_utils::ContentEncoding, manifest_utils::HLS_CONTENT_TYPE,
            proxy_url_utils::decode_url,
        },
    },
};

const MANIFEST_CACHE_CONTROL: &str = "no-cache, no-store, must-revalidate";
const SEGMENT_CACHE_CONTROL: &str = "public, max-age=3600";

/// either `url` or the media fields, `url` wins when both are there
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct ProxyQuery {
    #[validate(length(min = 1, max = 4096))]
    url: Option<String>,
    #[validate(length(min = 1, max = 32))]
    tmdb_id: Option<String>,
    #[serde(rename = "type")]
    media_type: Option<MediaType>,
    #[validate(length(max = 8))]
    season: Option<String>,
    #[validate(length(max = 8))]
    episode: Option<String>,
    #[validate(length(min = 1, max = 32))]
    server: Option<String>,
}

pub struct ProxyController;

impl ProxyController {
    pub fn app() -> Router {
        Router::new().route("/", get(Self::proxy_get))
    }

    async fn proxy_get(
        Extension(services): Extension<EdgeServices>,
        ValidatedQuery(params): ValidatedQuery<ProxyQuery>,
        headers: HeaderMap,
    ) -> AppResult<Response> {
        let target = Self::target_url(&services, &params).await?;
        debug!("Proxying: {}", target);

        let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());

        match services.upstream.fetch(&target, range).await? {
            ProxiedAsset::Manifest { body } => {
                debug!("Processed M3U8, response length: {} bytes", body.len());
                Self::build_m3u8_response(&body, &headers)
            }
            ProxiedAsset::Segment {
                status,
                content_type,
                content_length,
                content_range,
                content_encoding,
                body,
            } => {
                let mut response_headers = HeaderMap::new();
                response_headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_str(&content_type).unwrap_or_else(|_| {
                        HeaderValue::from_static("application/octet-stream")
                    }),
                );
                response_headers.insert(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static(SEGMENT_CACHE_CONTROL),
                );
                response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

                if let Some(len) = content_length {
                    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
                }
                if let Some(range) = content_range.and_then(|r| HeaderValue::from_str(&r).ok()) {
                    response_headers.insert(header::CONTENT_RANGE, range);
                }
                if let Some(enc) = content_encoding.and_then(|e| HeaderValue::from_str(&e).ok()) {
                    response_headers.insert(header::CONTENT_ENCODING, enc);
                }

                Ok((status, response_headers, body).into_response())
            }
        }
    }

    /// the alternate form re-runs the resolver and proxies whatever manifest it lands on
    async fn target_url(services: &EdgeServices, params: &ProxyQuery) -> AppResult<Url> {
        if let Some(url_param) = &params.url {
            let decoded = decode_url(url_param)?;
            return Url::parse(&decoded).map_err(|e| {
                error!("Failed to parse target url: {}", e);
                Error::BadRequest("Invalid URL format".to_string())
            });
        }

        let Some(tmdb_id) = params.tmdb_id.as_deref() else {
            return Err(Error::BadRequest(
                "URL parameter is required".to_string(),
            ));
        };

        let request = StreamRequest::from_parts(
            params.media_type,
            tmdb_id,
            params.season.as_deref(),
            params.episode.as_deref(),
            ServerId::new(
                params
                    .server
                    .as_deref()
                    .unwrap_or(&services.config.default_server),
            ),
        )?;

        info!("proxy resolving {} on {}", request.target_path(), request.server);
        let resolved = services.resolver.resolve_stream(&request).await?;
        Ok(resolved.manifest_url)
    }

    /// build m3u8 response with proper headers and optional compression
    fn build_m3u8_response(processed_body: &str, headers: &HeaderMap) -> AppResult<Response> {
        // determine client's preferred encoding (apple hls likes gzip, not zstd)
        let encoding = ContentEncoding::from_accept_encoding(
            headers
                .get(header::ACCEPT_ENCODING)
                .and_then(|v| v.to_str().ok()),
        );

        let mut response_headers = HeaderMap::new();
        response_headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(HLS_CONTENT_TYPE),
        );
        response_headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static(MANIFEST_CACHE_CONTROL),
        );

        let response_body = encoding.compress(processed_body.as_bytes()).map_err(|e| {
            error!("Failed to compress response with {:?}: {}", encoding, e);
            Error::InternalServerErrorWithContext("Failed to compress response".to_string())
        })?;

        if let Some(enc_header) = encoding.as_header_value() {
            debug!(
                "Compressed M3U8 with {:?} from {} to {} bytes",
                encoding,
                processed_body.len(),
                response_body.len()
            );
            response_headers.insert(
                header::CONTENT_ENCODING,
                HeaderValue::from_static(enc_header),
            );
        }

        response_headers.insert(
            header::CONTENT_LENGTH,
            HeaderValue::from(response_body.len()),
        );

        Ok((StatusCode::OK, response_headers, response_body).into_response())
    }
}
