/**
 * REPOSITORIES - Interfaces étroites vers le store relationnel
 *
 * RÔLE : CRUD minimal consommé par le coordinateur : existence de compte,
 * cycle de vie des nodes, boîte aux lettres de commandes, persistance de logs.
 *
 * ARCHITECTURE : Un trait par préoccupation, implémenté sur PostgreSQL via
 * sqlx. Les traits sont les coutures de test du dispatcher et du registry.
 */

mod commands;
mod logs;
mod nodes;
mod users;

pub use commands::CommandRepository;
pub use logs::LogRepository;
pub use nodes::NodeRepository;
pub use users::UserRepository;

use async_trait::async_trait;
use tracing::warn;

use crate::models::{Command, LogMessage, Node};

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Vérification d'identité : une clé de compte est-elle enregistrée.
/// Requête pure, aucune mutation.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn exists_by_obscura_key(&self, obscura_key: &str) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn create(&self, node: &Node) -> Result<(), RepoError>;
    async fn list_all(&self) -> Result<Vec<Node>, RepoError>;
    async fn update_status(&self, node_id: &str, status: i16) -> Result<(), RepoError>;
    async fn update_external_addr(&self, node_id: &str, addr: &str) -> Result<(), RepoError>;
}

/// Boîte aux lettres durable des commandes en attente, par node.
#[async_trait]
pub trait CommandStore: Send + Sync {
    async fn fetch(&self, node_id: &str) -> Result<Vec<Command>, RepoError>;
    async fn delete_all(&self, node_id: &str) -> Result<(), RepoError>;

    /// Vidage fetch-and-clear. L'implémentation par défaut séquence
    /// fetch puis delete_all : un échec du delete après un fetch réussi
    /// laisse une fenêtre de relivraison, journalisée seulement, et les
    /// commandes déjà lues sont livrées quoi qu'il arrive. Les backends
    /// capables d'un vidage atomique doivent surcharger cette méthode.
    async fn drain(&self, node_id: &str) -> Result<Vec<Command>, RepoError> {
        let commands = self.fetch(node_id).await?;
        if commands.is_empty() {
            return Ok(commands);
        }
        if let Err(e) = self.delete_all(node_id).await {
            warn!(node_id, "command cleanup failed after fetch: {e}");
        }
        Ok(commands)
    }
}

#[async_trait]
pub trait LogStore: Send + Sync {
    async fn save_logs(&self, logs: &[LogMessage]) -> Result<(), RepoError>;
}
