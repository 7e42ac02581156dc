use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::auth::AuthError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Unauthorized(AuthError::KeyFetch(_)) => {
                tracing::error!("Signing keys unavailable: {}", self);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "identity_provider_unavailable",
                    "Identity provider unavailable".to_string(),
                )
            }
            AppError::Unauthorized(e) => {
                tracing::debug!(reason = %e, "Rejected request");
                (StatusCode::UNAUTHORIZED, "unauthorized", e.to_string())
            }
            AppError::Internal(_) => {
                tracing::error!("Internal error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(serde_json::json!({
            "error": code,
            "message": message,
        }));

        if status == StatusCode::UNAUTHORIZED {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}
