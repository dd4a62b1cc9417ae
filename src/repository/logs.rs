use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use super::{LogStore, RepoError};
use crate::models::LogMessage;

pub struct LogRepository {
    pool: PgPool,
}

impl LogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogStore for LogRepository {
    async fn save_logs(&self, logs: &[LogMessage]) -> Result<(), RepoError> {
        for log in logs {
            sqlx::query(
                "INSERT INTO logs (node_id, timestamp, level, content) VALUES ($1, $2, $3, $4)",
            )
            .bind(&log.node_id)
            .bind(log.timestamp)
            .bind(&log.level)
            .bind(&log.content)
            .execute(&self.pool)
            .await?;
        }
        debug!(count = logs.len(), "log batch persisted");
        Ok(())
    }
}
