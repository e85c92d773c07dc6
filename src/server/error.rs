use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

pub type AppResult<T> = Result<T, Error>;

/// every endpoint ends up here when something goes wrong so the client always gets json back
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// upstream answered badly or not at all after a url was already known
    #[error("{0}")]
    Upstream(String),

    /// every attempt and every direct probe for a server came up empty
    #[error("No HLS stream found from {server}. Last error: {last_error}")]
    NoStreamFound {
        server: String,
        last_error: String,
        attempts: usize,
    },

    #[error("{0}")]
    InternalServerErrorWithContext(String),

    #[error(transparent)]
    AnyhowError(#[from] anyhow::Error),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Upstream(_) | Error::NoStreamFound { .. } => StatusCode::BAD_GATEWAY,
            Error::InternalServerErrorWithContext(_) | Error::AnyhowError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!("request failed with {}: {}", status, self);
        }

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_message_names_server_and_last_error() {
        let err = Error::NoStreamFound {
            server: "vienna".to_string(),
            last_error: "HTTP 503".to_string(),
            attempts: 2,
        };

        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            err.to_string(),
            "No HLS stream found from vienna. Last error: HTTP 503"
        );
    }

    #[test]
    fn not_found_is_distinct_from_generic_upstream_failure() {
        assert_eq!(
            Error::NotFound("gone".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::Upstream("boom".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
