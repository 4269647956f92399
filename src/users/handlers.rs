use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::PublicUser,
        error::AuthError,
        jwt::AuthUser,
        password::hash_password,
        service::{is_valid_email, MIN_PASSWORD_LEN},
        store::CredentialStore,
    },
    state::AppState,
};

use super::{
    dto::{CreateUserRequest, ListUsersQuery, UpdateUserRequest},
    model::User,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users", get(list_users))
        .route("/users/:id", get(get_user))
        .route("/users/:id", put(update_user))
        .route("/users/:id", delete(delete_user))
}

/// A persistence failure during the auth lookup is an internal error, not
/// an auth rejection.
fn auth_rejection(err: AuthError) -> (StatusCode, String) {
    match err {
        AuthError::Internal(e) => {
            error!(error = %e, "auth lookup failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".into())
        }
        _ => (
            StatusCode::UNAUTHORIZED,
            "invalid or expired token".to_string(),
        ),
    }
}

async fn require_auth(state: &AppState, username: &str) -> Result<User, (StatusCode, String)> {
    state
        .auth
        .require_active_user(&state.db, username)
        .await
        .map_err(auth_rejection)
}

async fn ensure_username_free(
    store: &dyn CredentialStore,
    username: &str,
) -> Result<(), (StatusCode, String)> {
    match store.find_by_username(username).await {
        Ok(None) => Ok(()),
        Ok(Some(_)) => {
            warn!(username = %username, "username already registered");
            Err((StatusCode::CONFLICT, "Username already registered".into()))
        }
        Err(e) => {
            error!(error = %e, "find_by_username failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal error".into()))
        }
    }
}

async fn ensure_email_free(
    store: &dyn CredentialStore,
    email: &str,
) -> Result<(), (StatusCode, String)> {
    match store.find_by_email(email).await {
        Ok(None) => Ok(()),
        Ok(Some(_)) => {
            warn!(email = %email, "email already registered");
            Err((StatusCode::CONFLICT, "Email already registered".into()))
        }
        Err(e) => {
            error!(error = %e, "find_by_email failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal error".into()))
        }
    }
}

#[instrument(skip(state, payload))]
async fn create_user(
    State(state): State<AppState>,
    Json(mut payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<PublicUser>), (StatusCode, String)> {
    payload.email = payload.email.trim().to_string();
    payload.username = payload.username.trim().to_string();

    if payload.username.is_empty() {
        warn!("empty username");
        return Err((StatusCode::BAD_REQUEST, "Username is required".into()));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    ensure_username_free(&state.db, &payload.username).await?;
    ensure_email_free(&state.db, &payload.email).await?;

    let hash = hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".into())
    })?;

    let user = User::create(
        &state.db,
        &payload.username,
        &payload.email,
        payload.full_name.as_deref(),
        &hash,
        payload.is_active,
    )
    .await
    .map_err(|e| {
        error!(error = %e, "create user failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".into())
    })?;

    info!(user_id = %user.id, username = %user.username, "user created");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state))]
async fn list_users(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Vec<PublicUser>>, (StatusCode, String)> {
    require_auth(&state, &username).await?;

    let limit = query.limit.clamp(1, 500);
    let skip = query.skip.max(0);
    let users = User::list(&state.db, skip, limit).await.map_err(|e| {
        error!(error = %e, "list users failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".into())
    })?;

    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state))]
async fn get_user(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    require_auth(&state, &username).await?;

    let user = User::find_by_id(&state.db, id)
        .await
        .map_err(|e| {
            error!(error = %e, "find user failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".into())
        })?
        .ok_or((StatusCode::NOT_FOUND, "User not found".into()))?;

    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
async fn update_user(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    require_auth(&state, &username).await?;

    let existing = User::find_by_id(&state.db, id)
        .await
        .map_err(|e| {
            error!(error = %e, "find user failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".into())
        })?
        .ok_or((StatusCode::NOT_FOUND, "User not found".into()))?;

    if let Some(new_username) = payload.username.as_deref() {
        if new_username.trim().is_empty() {
            return Err((StatusCode::BAD_REQUEST, "Username is required".into()));
        }
        if new_username != existing.username {
            ensure_username_free(&state.db, new_username).await?;
        }
    }
    if let Some(new_email) = payload.email.as_deref() {
        if !is_valid_email(new_email) {
            return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
        }
        if new_email != existing.email {
            ensure_email_free(&state.db, new_email).await?;
        }
    }

    let password_hash = match payload.password.as_deref() {
        Some(p) if p.len() < MIN_PASSWORD_LEN => {
            return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
        }
        Some(p) => Some(hash_password(p).map_err(|e| {
            error!(error = %e, "hash_password failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error".to_string(),
            )
        })?),
        None => None,
    };

    let user = User::update(
        &state.db,
        id,
        payload.username.as_deref(),
        payload.email.as_deref(),
        payload.full_name.as_deref(),
        password_hash.as_deref(),
        payload.is_active,
    )
    .await
    .map_err(|e| {
        error!(error = %e, "update user failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".into())
    })?;

    info!(user_id = %user.id, "user updated");
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
async fn delete_user(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    require_auth(&state, &username).await?;

    let deleted = User::delete(&state.db, id).await.map_err(|e| {
        error!(error = %e, "delete user failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".into())
    })?;

    if !deleted {
        return Err((StatusCode::NOT_FOUND, "User not found".into()));
    }

    info!(user_id = %id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::async_trait;
    use time::OffsetDateTime;

    /// Store whose lookups always fail, as a dead database would.
    struct BrokenStore;

    #[async_trait]
    impl CredentialStore for BrokenStore {
        async fn find_by_username(&self, _username: &str) -> anyhow::Result<Option<User>> {
            anyhow::bail!("connection refused")
        }

        async fn find_by_email(&self, _email: &str) -> anyhow::Result<Option<User>> {
            anyhow::bail!("connection refused")
        }

        async fn find_by_reset_token(&self, _token: &str) -> anyhow::Result<Option<User>> {
            anyhow::bail!("connection refused")
        }

        async fn set_reset_token(
            &self,
            _user_id: Uuid,
            _token: &str,
            _expires_at: OffsetDateTime,
        ) -> anyhow::Result<()> {
            anyhow::bail!("connection refused")
        }

        async fn consume_reset_token(
            &self,
            _user_id: Uuid,
            _token: &str,
            _password_hash: &str,
        ) -> anyhow::Result<bool> {
            anyhow::bail!("connection refused")
        }
    }

    /// Store where every username and email is already taken.
    struct TakenStore;

    fn sample_user() -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            username: "taken".into(),
            email: "taken@example.com".into(),
            full_name: None,
            password_hash: "$argon2id$fake".into(),
            is_active: true,
            is_superuser: false,
            reset_token: None,
            reset_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[async_trait]
    impl CredentialStore for TakenStore {
        async fn find_by_username(&self, _username: &str) -> anyhow::Result<Option<User>> {
            Ok(Some(sample_user()))
        }

        async fn find_by_email(&self, _email: &str) -> anyhow::Result<Option<User>> {
            Ok(Some(sample_user()))
        }

        async fn find_by_reset_token(&self, _token: &str) -> anyhow::Result<Option<User>> {
            Ok(None)
        }

        async fn set_reset_token(
            &self,
            _user_id: Uuid,
            _token: &str,
            _expires_at: OffsetDateTime,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn consume_reset_token(
            &self,
            _user_id: Uuid,
            _token: &str,
            _password_hash: &str,
        ) -> anyhow::Result<bool> {
            Ok(false)
        }
    }

    /// Store with no users at all.
    struct VacantStore;

    #[async_trait]
    impl CredentialStore for VacantStore {
        async fn find_by_username(&self, _username: &str) -> anyhow::Result<Option<User>> {
            Ok(None)
        }

        async fn find_by_email(&self, _email: &str) -> anyhow::Result<Option<User>> {
            Ok(None)
        }

        async fn find_by_reset_token(&self, _token: &str) -> anyhow::Result<Option<User>> {
            Ok(None)
        }

        async fn set_reset_token(
            &self,
            _user_id: Uuid,
            _token: &str,
            _expires_at: OffsetDateTime,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn consume_reset_token(
            &self,
            _user_id: Uuid,
            _token: &str,
            _password_hash: &str,
        ) -> anyhow::Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn auth_rejection_separates_internal_from_unauthorized() {
        let (status, _) = auth_rejection(AuthError::Internal(anyhow::anyhow!("db down")));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        for err in [AuthError::InvalidToken, AuthError::InvalidCredentials] {
            let (status, detail) = auth_rejection(err);
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(detail, "invalid or expired token");
        }
    }

    #[tokio::test]
    async fn duplicate_checks_propagate_store_errors_as_internal() {
        let (status, _) = ensure_username_free(&BrokenStore, "alice")
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, _) = ensure_email_free(&BrokenStore, "alice@example.com")
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn duplicate_checks_report_conflicts_and_pass_free_keys() {
        let (status, _) = ensure_username_free(&TakenStore, "alice")
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = ensure_email_free(&TakenStore, "alice@example.com")
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::CONFLICT);

        ensure_username_free(&VacantStore, "alice")
            .await
            .expect("free username");
        ensure_email_free(&VacantStore, "alice@example.com")
            .await
            .expect("free email");
    }
}
