use sqlx::PgPool;
use uuid::Uuid;

use super::model::User;

impl User {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, full_name, password_hash, is_active, is_superuser,
                   reset_token, reset_expires_at, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn list(db: &PgPool, skip: i64, limit: i64) -> anyhow::Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, full_name, password_hash, is_active, is_superuser,
                   reset_token, reset_expires_at, created_at, updated_at
            FROM users
            ORDER BY created_at
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(skip)
        .fetch_all(db)
        .await?;
        Ok(users)
    }

    pub async fn create(
        db: &PgPool,
        username: &str,
        email: &str,
        full_name: Option<&str>,
        password_hash: &str,
        is_active: bool,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, full_name, password_hash, is_active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, username, email, full_name, password_hash, is_active, is_superuser,
                      reset_token, reset_expires_at, created_at, updated_at
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(full_name)
        .bind(password_hash)
        .bind(is_active)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    /// Partial update; NULL arguments keep the stored value. Clearing a
    /// field to NULL is not supported here.
    pub async fn update(
        db: &PgPool,
        id: Uuid,
        username: Option<&str>,
        email: Option<&str>,
        full_name: Option<&str>,
        password_hash: Option<&str>,
        is_active: Option<bool>,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET username = COALESCE($2, username),
                email = COALESCE($3, email),
                full_name = COALESCE($4, full_name),
                password_hash = COALESCE($5, password_hash),
                is_active = COALESCE($6, is_active),
                updated_at = now()
            WHERE id = $1
            RETURNING id, username, email, full_name, password_hash, is_active, is_superuser,
                      reset_token, reset_expires_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(username)
        .bind(email)
        .bind(full_name)
        .bind(password_hash)
        .bind(is_active)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
