use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("{0}")]
    BadRequest(String),

    #[error("GitHub API error: {}", github_message(.0))]
    GitHub(#[from] octocrab::Error),

    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// The upstream message GitHub sent back, falling back to the error and its cause.
fn github_message(err: &octocrab::Error) -> String {
    match err {
        octocrab::Error::GitHub { source, .. } => {
            format!("{} (status {})", source.message, source.status_code.as_u16())
        }
        other => match std::error::Error::source(other) {
            Some(cause) => format!("{other}: {cause}"),
            None => other.to_string(),
        },
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::GitHub(_) | Self::OAuth(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Unauthenticated => json!({ "message": self.to_string() }),
            _ => json!({ "error": self.to_string() }),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        (status, Json(body)).into_response()
    }
}
