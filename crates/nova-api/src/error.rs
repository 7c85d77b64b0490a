use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use nova_provider::ProviderError;
use nova_types::api::ErrorResponse;
use tracing::error;

/// Every externally visible failure. Rendered as `{"error": "..."}` with a
/// matching status code; internal detail is logged, never returned.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Username already exists")]
    DuplicateUser,

    #[error("Invalid username or password")]
    AuthFailure,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    UnsupportedFile(String),

    #[error("store failure: {0:#}")]
    Store(#[from] anyhow::Error),

    #[error("API Error: {0}")]
    Provider(#[from] ProviderError),

    #[error("template failure: {0}")]
    Render(#[from] minijinja::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::UnsupportedFile(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated | Self::AuthFailure => StatusCode::UNAUTHORIZED,
            Self::DuplicateUser => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Text safe to show to the caller.
    pub fn public_message(&self) -> String {
        match self {
            Self::Store(_) | Self::Render(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            Self::Store(e) => error!("Store error: {:#}", e),
            Self::Provider(e) => error!("Provider error: {}", e),
            Self::Render(e) => error!("Template error: {}", e),
            _ => {}
        }

        let body = ErrorResponse {
            error: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_detail_is_hidden() {
        let err = AppError::Store(anyhow::anyhow!("disk I/O error at /var/lib/nova"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn provider_errors_are_structured() {
        let err = AppError::from(ProviderError::Status {
            status: 503,
            body: "busy".into(),
        });
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.public_message(), "API Error: provider returned HTTP 503: busy");
    }

    #[test]
    fn validation_message_is_passed_through() {
        let err = AppError::BadRequest("No chat ID provided".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "No chat ID provided");
    }
}
