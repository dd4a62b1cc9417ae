/**
 * NODE REGISTRY - Miroir mémoire des nodes connus
 *
 * RÔLE : Lookup O(1) des identifiants de nodes, enregistrement paresseux
 * des nodes jamais vus, et propagation des transitions de joignabilité
 * (store durable + notification du web server).
 *
 * ARCHITECTURE : Instance construite au démarrage et injectée partout,
 * pas d'état global. Le miroir n'est alimenté qu'après une création
 * durable réussie : un échec laisse le node absent, le prochain snapshot
 * retente l'enregistrement.
 */

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info};

use crate::models::Node;
use crate::report::Reporter;
use crate::repository::{NodeStore, RepoError};

pub const STATUS_UP: i16 = 1;
pub const STATUS_DOWN: i16 = 0;

pub struct NodeRegistry {
    known: RwLock<HashSet<String>>,
    nodes: Arc<dyn NodeStore>,
    reporter: Arc<dyn Reporter>,
}

impl NodeRegistry {
    /// Construit le registry et amorce le miroir depuis le store durable.
    /// Un échec de la liste initiale démarre avec un miroir vide : les
    /// nodes existants seront revus comme "inconnus" et re-enregistrés.
    pub async fn seed(nodes: Arc<dyn NodeStore>, reporter: Arc<dyn Reporter>) -> Arc<Self> {
        let known = match nodes.list_all().await {
            Ok(list) => {
                info!(count = list.len(), "node registry seeded");
                list.into_iter().map(|n| n.node_id).collect()
            }
            Err(e) => {
                error!("node listing failed, starting with empty registry: {e}");
                HashSet::new()
            }
        };

        Arc::new(Self {
            known: RwLock::new(known),
            nodes,
            reporter,
        })
    }

    pub fn exists(&self, node_id: &str) -> bool {
        self.known.read().contains(node_id)
    }

    pub fn len(&self) -> usize {
        self.known.read().len()
    }

    /// Création durable puis insertion dans le miroir, dans cet ordre.
    pub async fn register(&self, node: &Node) -> Result<(), RepoError> {
        self.nodes.create(node).await?;
        self.known.write().insert(node.node_id.clone());
        info!(node_id = %node.node_id, obscura_key = %node.obscura_key, "node registered");
        Ok(())
    }

    /// Transition up/down : mise à jour durable, et notification du web
    /// server détachée (best-effort, hors de tout deadline de dispatch).
    pub async fn set_reachable(&self, node_id: &str, up: bool) -> Result<(), RepoError> {
        let status = if up { STATUS_UP } else { STATUS_DOWN };

        let reporter = self.reporter.clone();
        let id = node_id.to_string();
        tokio::spawn(async move {
            reporter.notify_node_status(&id, status).await;
        });

        self.nodes.update_status(node_id, status).await
    }

    /// Adresse vue côté serveur, rafraîchie de manière opportuniste.
    pub async fn record_external_addr(&self, node_id: &str, addr: &str) {
        if let Err(e) = self.nodes.update_external_addr(node_id, addr).await {
            debug!(node_id, "external address update failed: {e}");
        }
    }
}
