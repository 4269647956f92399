use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::error;

/// Failure taxonomy for the credential and reset flows.
///
/// The first three variants are deliberately uniform outward: callers see
/// one opaque message per flow regardless of whether the underlying cause
/// was an unknown identity, a bad secret, or an expired value. The
/// distinct cause is logged where it happens.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("incorrect username or password")]
    InvalidCredentials,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("invalid or expired password reset token")]
    InvalidResetToken,

    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self {
            AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token"),
            AuthError::InvalidResetToken => (StatusCode::BAD_REQUEST, "invalid_reset_token"),
            AuthError::Validation { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AuthError::Internal(e) => {
                error!(error = %e, "internal error in auth flow");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };
        let body = Json(json!({
            "error": code,
            "detail": self.to_string(),
        }));
        (status, body).into_response()
    }
}
