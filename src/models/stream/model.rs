use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::server::error::{AppResult, Error};

/// these are the shapes that flow between the controllers and the resolver. Nothing here is
/// persisted, a StreamRequest lives for one resolution and a ResolvedStream for one playback
/// session on the client.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaType::Movie => f.write_str("movie"),
            MediaType::Tv => f.write_str("tv"),
        }
    }
}

/// logical server name picked by the caller, e.g. "veronica"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ServerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// season and episode only ever travel together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeRef {
    pub season: String,
    pub episode: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub media_type: MediaType,
    pub tmdb_id: String,
    pub episode: Option<EpisodeRef>,
    pub server: ServerId,
}

impl StreamRequest {
    pub fn movie(tmdb_id: &str, server: impl Into<ServerId>) -> AppResult<Self> {
        Self::from_parts(Some(MediaType::Movie), tmdb_id, None, None, server)
    }

    pub fn tv(
        tmdb_id: &str,
        season: &str,
        episode: &str,
        server: impl Into<ServerId>,
    ) -> AppResult<Self> {
        Self::from_parts(
            Some(MediaType::Tv),
            tmdb_id,
            Some(season),
            Some(episode),
            server,
        )
    }

    /// builds a request out of loose query parameters. When no media type is given it's a tv
    /// request iff season or episode is present, same as the old player did it
    pub fn from_parts(
        media_type: Option<MediaType>,
        tmdb_id: &str,
        season: Option<&str>,
        episode: Option<&str>,
        server: impl Into<ServerId>,
    ) -> AppResult<Self> {
        let tmdb_id = tmdb_id.trim();
        if tmdb_id.is_empty() {
            return Err(Error::BadRequest("TMDB ID is required".to_string()));
        }
        Self::check_segment("tmdbId", tmdb_id)?;

        // empty strings from the query are the same as missing
        let season = season.map(str::trim).filter(|s| !s.is_empty());
        let episode = episode.map(str::trim).filter(|s| !s.is_empty());

        let media_type = media_type.unwrap_or(if season.is_some() || episode.is_some() {
            MediaType::Tv
        } else {
            MediaType::Movie
        });

        let episode = match (media_type, season, episode) {
            (MediaType::Movie, None, None) => None,
            (MediaType::Movie, _, _) => {
                return Err(Error::BadRequest(
                    "season and episode are not allowed for movies".to_string(),
                ));
            }
            (MediaType::Tv, Some(season), Some(episode)) => {
                Self::check_segment("season", season)?;
                Self::check_segment("episode", episode)?;
                Some(EpisodeRef {
                    season: season.to_string(),
                    episode: episode.to_string(),
                })
            }
            (MediaType::Tv, _, _) => {
                return Err(Error::BadRequest(
                    "season and episode are both required for tv".to_string(),
                ));
            }
        };

        Ok(Self {
            media_type,
            tmdb_id: tmdb_id.to_string(),
            episode,
            server: server.into(),
        })
    }

    // everything here ends up inside a url path so keep it boring
    fn check_segment(name: &str, value: &str) -> AppResult<()> {
        if value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            Ok(())
        } else {
            Err(Error::BadRequest(format!("invalid {}: {}", name, value)))
        }
    }

    pub fn season(&self) -> Option<&str> {
        self.episode.as_ref().map(|e| e.season.as_str())
    }

    pub fn episode(&self) -> Option<&str> {
        self.episode.as_ref().map(|e| e.episode.as_str())
    }

    /// `movie/{id}` or `tv/{id}/{season}/{episode}`
    pub fn target_path(&self) -> String {
        match &self.episode {
            Some(ep) => format!("tv/{}/{}/{}", self.tmdb_id, ep.season, ep.episode),
            None => format!("movie/{}", self.tmdb_id),
        }
    }

    pub fn with_server(&self, server: ServerId) -> Self {
        Self {
            server,
            ..self.clone()
        }
    }

    pub fn meta(&self) -> MediaMeta {
        MediaMeta {
            tmdb_id: self.tmdb_id.clone(),
            media_type: self.media_type,
            season: self.season().map(str::to_string),
            episode: self.episode().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMeta {
    pub tmdb_id: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub season: Option<String>,
    pub episode: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedStream {
    /// real upstream manifest, never handed to the client
    pub manifest_url: Url,
    /// proxy-relative reference wrapping `manifest_url`
    pub stream_url: String,
    pub server: ServerId,
    /// attempt (or probe) that produced the url, for logs
    pub source: String,
    pub meta: MediaMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tv_target_path_uses_season_and_episode() {
        let req = StreamRequest::tv("1399", "2", "5", "veronica").unwrap();
        assert_eq!(req.target_path(), "tv/1399/2/5");
        assert_eq!(req.meta().season.as_deref(), Some("2"));
    }

    #[test]
    fn movie_target_path() {
        let req = StreamRequest::movie("27205", "vienna").unwrap();
        assert_eq!(req.target_path(), "movie/27205");
        assert_eq!(req.media_type, MediaType::Movie);
    }

    #[test]
    fn tv_without_episode_is_rejected() {
        let err = StreamRequest::from_parts(Some(MediaType::Tv), "1399", Some("1"), None, "x")
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[test]
    fn lone_season_infers_tv_and_fails() {
        let err = StreamRequest::from_parts(None, "1399", Some("1"), Some(""), "x").unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[test]
    fn movie_with_episode_is_rejected() {
        assert!(
            StreamRequest::from_parts(Some(MediaType::Movie), "1", Some("1"), Some("1"), "x")
                .is_err()
        );
    }

    #[test]
    fn path_like_ids_are_rejected() {
        assert!(StreamRequest::movie("../admin", "x").is_err());
        assert!(StreamRequest::movie("  ", "x").is_err());
    }

    #[test]
    fn meta_serializes_like_the_player_expects() {
        let meta = StreamRequest::movie("42", "x").unwrap().meta();
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"tmdbId": "42", "type": "movie", "season": null, "episode": null})
        );
    }
}
