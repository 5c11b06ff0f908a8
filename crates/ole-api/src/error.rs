use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("OIDC error: {0}")]
    Oidc(String),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Session error: {0}")]
    Session(String),
    #[error("Invalid CSRF token")]
    Csrf,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Oidc(_) => StatusCode::BAD_GATEWAY,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Csrf => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Session(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Server-side details stay in the logs
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
