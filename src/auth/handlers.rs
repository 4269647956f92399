use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use crate::state::AppState;

use super::{
    dto::{
        ForgotPasswordRequest, LoginRequest, MessageResponse, PublicUser, ResetPasswordRequest,
        TokenResponse,
    },
    error::AuthError,
    jwt::AuthUser,
    service::is_valid_email,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/token", post(login))
        .route("/auth/me", get(me))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
}

#[instrument(skip(state, payload))]
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    let user = state
        .auth
        .authenticate(&state.db, &payload.username, &payload.password)
        .await?;
    let access_token = state.auth.issue_token(&user)?;

    info!(user_id = %user.id, username = %user.username, "user logged in");
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".into(),
    }))
}

#[instrument(skip(state))]
async fn me(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
) -> Result<Json<PublicUser>, AuthError> {
    let user = state.auth.require_active_user(&state.db, &username).await?;
    Ok(Json(user.into()))
}

/// Always answers with the same message; whether the email is registered
/// must not be observable from the outside. The token itself goes out of
/// band, never in this response.
#[instrument(skip(state, payload))]
async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    let email = payload.email.trim();
    if !is_valid_email(email) {
        return Err(AuthError::validation("email", "invalid email address"));
    }

    state.auth.request_password_reset(&state.db, email).await?;

    Ok(Json(MessageResponse {
        message: "If your email is registered, you will receive a password reset link.".into(),
    }))
}

#[instrument(skip(state, payload))]
async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    state
        .auth
        .reset_password(&state.db, &payload.token, &payload.password)
        .await?;

    Ok(Json(MessageResponse {
        message: "Password has been reset successfully.".into(),
    }))
}
