use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use lazy_static::lazy_static;
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, info, warn};

use crate::config::AppConfig;

use super::{
    error::AuthError,
    jwt::JwtKeys,
    password::{hash_password, verify_password},
    store::CredentialStore,
};
use crate::users::model::User;

pub const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// 32 bytes of OS entropy, base64url without padding.
fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Owns password verification, token issuance and the reset-token
/// lifecycle. Constructed once from config; persistence is borrowed per
/// call and never retained.
pub struct AuthService {
    keys: JwtKeys,
    reset_ttl: TimeDuration,
}

impl AuthService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            keys: JwtKeys::new(&config.jwt),
            reset_ttl: TimeDuration::hours(config.reset.token_ttl_hours),
        }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    /// Check username and password against the store. Unknown username,
    /// wrong password and inactive account are indistinguishable to the
    /// caller; each is logged with its real reason.
    pub async fn authenticate(
        &self,
        store: &dyn CredentialStore,
        username: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let user = match store.find_by_username(username).await? {
            Some(u) => u,
            None => {
                warn!(username = %username, "login: unknown username");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !verify_password(password, &user.password_hash) {
            warn!(username = %username, user_id = %user.id, "login: invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active {
            warn!(username = %username, user_id = %user.id, "login: inactive account");
            return Err(AuthError::InvalidCredentials);
        }

        Ok(user)
    }

    /// Sign a bearer token for an authenticated user.
    pub fn issue_token(&self, user: &User) -> Result<String, AuthError> {
        self.keys.sign(&user.username)
    }

    /// Resolve a verified token subject to an active user record. Missing
    /// or deactivated users reject the same way a bad token does.
    pub async fn require_active_user(
        &self,
        store: &dyn CredentialStore,
        username: &str,
    ) -> Result<User, AuthError> {
        let user = match store.find_by_username(username).await? {
            Some(u) => u,
            None => {
                warn!(username = %username, "token subject no longer exists");
                return Err(AuthError::InvalidToken);
            }
        };
        if !user.is_active {
            warn!(username = %username, user_id = %user.id, "token subject is inactive");
            return Err(AuthError::InvalidToken);
        }
        Ok(user)
    }

    /// Start a password reset. Always succeeds from the caller's point of
    /// view; an unknown email changes nothing. A known email gets a fresh
    /// token and expiry written as one pair, superseding any outstanding
    /// token.
    pub async fn request_password_reset(
        &self,
        store: &dyn CredentialStore,
        email: &str,
    ) -> Result<(), AuthError> {
        let user = match store.find_by_email(email).await? {
            Some(u) => u,
            None => {
                debug!(email = %email, "password reset requested for unknown email");
                return Ok(());
            }
        };

        let token = generate_reset_token();
        let expires_at = OffsetDateTime::now_utc() + self.reset_ttl;
        store.set_reset_token(user.id, &token, expires_at).await?;

        // Token delivery (email) is out of band; only the fact is logged.
        info!(user_id = %user.id, "password reset token issued");
        Ok(())
    }

    /// Consume a reset token. An unknown token and an expired one fail
    /// identically. Expired pairs are left in place until the next
    /// successful consume or new request overwrites them (lazy expiry).
    pub async fn reset_password(
        &self,
        store: &dyn CredentialStore,
        token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if new_password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::validation(
                "password",
                "must be at least 8 characters",
            ));
        }

        let user = match store.find_by_reset_token(token).await? {
            Some(u) => u,
            None => {
                warn!("password reset: unknown token");
                return Err(AuthError::InvalidResetToken);
            }
        };

        let expired = match user.reset_expires_at {
            Some(at) => at < OffsetDateTime::now_utc(),
            None => true,
        };
        if expired {
            warn!(user_id = %user.id, "password reset: expired token");
            return Err(AuthError::InvalidResetToken);
        }

        let hash = hash_password(new_password)?;
        // Guarded write: a concurrent consume or a superseding request may
        // have invalidated the token since the lookup above.
        if !store.consume_reset_token(user.id, token, &hash).await? {
            warn!(user_id = %user.id, "password reset: token no longer active");
            return Err(AuthError::InvalidResetToken);
        }

        info!(user_id = %user.id, "password reset completed");
        Ok(())
    }
}
