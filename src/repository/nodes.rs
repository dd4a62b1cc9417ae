use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::debug;

use super::{NodeStore, RepoError};
use crate::models::Node;

pub struct NodeRepository {
    pool: PgPool,
}

impl NodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NodeStore for NodeRepository {
    async fn create(&self, node: &Node) -> Result<(), RepoError> {
        sqlx::query("INSERT INTO nodes (node_id, obscura_key, server_type) VALUES ($1, $2, $3)")
            .bind(&node.node_id)
            .bind(&node.obscura_key)
            .bind(&node.server_type)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Node>, RepoError> {
        let rows = sqlx::query("SELECT node_id, obscura_key, server_type FROM nodes")
            .fetch_all(&self.pool)
            .await?;

        let mut nodes = Vec::with_capacity(rows.len());
        for row in rows {
            nodes.push(Node {
                node_id: row.try_get("node_id")?,
                obscura_key: row.try_get("obscura_key")?,
                server_type: row.try_get("server_type")?,
            });
        }
        debug!(count = nodes.len(), "nodes listed");
        Ok(nodes)
    }

    async fn update_status(&self, node_id: &str, status: i16) -> Result<(), RepoError> {
        sqlx::query("UPDATE nodes SET status = $2 WHERE node_id = $1")
            .bind(node_id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_external_addr(&self, node_id: &str, addr: &str) -> Result<(), RepoError> {
        sqlx::query("UPDATE nodes SET external_addr = $2 WHERE node_id = $1")
            .bind(node_id)
            .bind(addr)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
