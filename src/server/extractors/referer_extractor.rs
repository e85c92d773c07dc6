use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::header::REFERER;
use axum::http::request::Parts;

/// the embedding page, used for the embedder leaderboard. Missing or garbage headers are just None
pub struct Referer(pub Option<String>);

impl<S> FromRequestParts<S> for Referer
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let referer = parts
            .headers
            .get(REFERER)
            .and_then(|h| h.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        Ok(Referer(referer))
    }
}
