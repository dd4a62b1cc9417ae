use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::debug;

use super::{AccountStore, RepoError};

pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for UserRepository {
    async fn exists_by_obscura_key(&self, obscura_key: &str) -> Result<bool, RepoError> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM users WHERE obscura_key = $1)")
            .bind(obscura_key)
            .fetch_one(&self.pool)
            .await?;
        let exists: bool = row.try_get(0)?;
        debug!(obscura_key, exists, "account existence checked");
        Ok(exists)
    }
}
