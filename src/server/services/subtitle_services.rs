use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, header};
use tracing::{error, info};

use crate::{
    models::StreamRequest,
    server::error::{AppResult, Error},
};

pub type DynSubtitleService = Arc<dyn SubtitleServiceTrait + Send + Sync>;

#[async_trait]
pub trait SubtitleServiceTrait {
    /// raw srt text for a movie or an episode
    async fn fetch_subtitles(&self, request: &StreamRequest) -> AppResult<String>;
}

pub struct SubtitleService {
    http: reqwest::Client,
    provider_url: String,
    timeout: Duration,
}

impl SubtitleService {
    pub fn new(http: reqwest::Client, provider_url: &str, timeout: Duration) -> Self {
        Self {
            http,
            provider_url: provider_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn subtitle_url(&self, request: &StreamRequest) -> String {
        let mut url = format!(
            "{}/api/subtitles?tmdbId={}",
            self.provider_url,
            urlencoding::encode(&request.tmdb_id)
        );
        if let (Some(season), Some(episode)) = (request.season(), request.episode()) {
            url.push_str(&format!(
                "&season={}&episode={}",
                urlencoding::encode(season),
                urlencoding::encode(episode)
            ));
        }
        url
    }
}

#[async_trait]
impl SubtitleServiceTrait for SubtitleService {
    async fn fetch_subtitles(&self, request: &StreamRequest) -> AppResult<String> {
        let url = self.subtitle_url(request);
        info!("fetching subtitles from {}", url);

        let response = tokio::time::timeout(
            self.timeout,
            self.http
                .get(&url)
                .header(header::USER_AGENT, concat!("embed-api/", env!("CARGO_PKG_VERSION")))
                .header(header::CACHE_CONTROL, "no-cache")
                .send(),
        )
        .await
        .map_err(|_| Error::Upstream("Subtitle provider timed out".to_string()))?
        .map_err(|e| {
            error!("subtitle request failed: {}", e);
            Error::Upstream(format!("Failed to fetch subtitles: {}", e))
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound("No subtitles found".to_string()));
        }
        if !status.is_success() {
            return Err(Error::Upstream(format!(
                "Subtitle provider returned {}",
                status
            )));
        }

        let text = tokio::time::timeout(self.timeout, response.text())
            .await
            .map_err(|_| Error::Upstream("Subtitle provider timed out".to_string()))?
            .map_err(|e| Error::Upstream(format!("Failed to read subtitles: {}", e)))?;

        info!("subtitle response length: {}", text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn episode_params_only_for_tv() {
        let service = SubtitleService::new(
            reqwest::Client::new(),
            "https://subs.test/",
            Duration::from_secs(1),
        );

        let movie = StreamRequest::movie("603", "x").unwrap();
        assert_eq!(
            service.subtitle_url(&movie),
            "https://subs.test/api/subtitles?tmdbId=603"
        );

        let tv = StreamRequest::tv("1399", "3", "9", "x").unwrap();
        assert_eq!(
            service.subtitle_url(&tv),
            "https://subs.test/api/subtitles?tmdbId=1399&season=3&episode=9"
        );
    }
}
