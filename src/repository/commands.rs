use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;

use super::{CommandStore, RepoError};
use crate::models::Command;

pub struct CommandRepository {
    pool: PgPool,
}

impl CommandRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn command_from_row(row: &PgRow) -> Result<Command, RepoError> {
    Ok(Command {
        command_id: row.try_get("command_id")?,
        node_id: row.try_get("node_id")?,
        command_type: row.try_get("command_type")?,
        command_status: row.try_get("command_status")?,
    })
}

#[async_trait]
impl CommandStore for CommandRepository {
    async fn fetch(&self, node_id: &str) -> Result<Vec<Command>, RepoError> {
        let rows = sqlx::query(
            "SELECT command_id, node_id, command_type, command_status \
             FROM commands WHERE node_id = $1",
        )
        .bind(node_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(command_from_row).collect()
    }

    async fn delete_all(&self, node_id: &str) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM commands WHERE node_id = $1")
            .bind(node_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Vidage atomique : lecture et suppression dans la même instruction.
    /// Deux dispatches concurrents pour le même node partitionnent la
    /// boîte aux lettres au lieu de livrer deux fois.
    async fn drain(&self, node_id: &str) -> Result<Vec<Command>, RepoError> {
        let rows = sqlx::query(
            "DELETE FROM commands WHERE node_id = $1 \
             RETURNING command_id, node_id, command_type, command_status",
        )
        .bind(node_id)
        .fetch_all(&self.pool)
        .await?;

        let commands: Vec<Command> = rows
            .iter()
            .map(command_from_row)
            .collect::<Result<_, _>>()?;
        if !commands.is_empty() {
            debug!(node_id, count = commands.len(), "pending commands drained");
        }
        Ok(commands)
    }
}
