use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    models::{MediaMeta, MediaType, ResolvedStream, ServerId, StreamRequest},
    server::error::{AppResult, Error},
};

/// query shared by the stream, proxy (alternate form) and subtitle endpoints
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MediaQuery {
    #[validate(length(min = 1, max = 32, message = "TMDB ID is required"))]
    pub tmdb_id: Option<String>,
    #[serde(rename = "type")]
    pub media_type: Option<MediaType>,
    #[validate(length(max = 8))]
    pub season: Option<String>,
    #[validate(length(max = 8))]
    pub episode: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub server: Option<String>,
    #[serde(default)]
    pub failover: bool,
    #[serde(default)]
    pub subtitles: bool,
}

impl MediaQuery {
    pub fn to_request(&self, default_server: &str) -> AppResult<StreamRequest> {
        let tmdb_id = self
            .tmdb_id
            .as_deref()
            .ok_or_else(|| Error::BadRequest("TMDB ID is required".to_string()))?;

        StreamRequest::from_parts(
            self.media_type,
            tmdb_id,
            self.season.as_deref(),
            self.episode.as_deref(),
            ServerId::new(self.server.as_deref().unwrap_or(default_server)),
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MediaMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamResponse {
    pub fn resolved(stream: ResolvedStream) -> Self {
        Self {
            success: true,
            stream_url: Some(stream.stream_url),
            server: Some(stream.server),
            metadata: Some(stream.meta),
            error: None,
        }
    }

    pub fn failed(server: Option<ServerId>, error: &Error) -> Self {
        Self {
            success: false,
            stream_url: None,
            server,
            metadata: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubtitlesResponse {
    pub success: bool,
    pub subtitles: String,
    pub metadata: MediaMeta,
}
