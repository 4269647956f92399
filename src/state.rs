use crate::auth::service::AuthService;
use crate::config::AppConfig;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await?;

        let auth = Arc::new(AuthService::new(&config));

        Ok(Self { db, config, auth })
    }

    pub fn from_parts(db: PgPool, config: Arc<AppConfig>) -> Self {
        let auth = Arc::new(AuthService::new(&config));
        Self { db, config, auth }
    }
}
