/**
 * DISPATCHER - Machine à états par message entrant
 *
 * RÔLE : Pour chaque frame reçue sur une session : décodage, relais des
 * résultats de commandes, validation du compte, enregistrement paresseux
 * du node, enqueue vers le sink, vidage de la boîte aux lettres, liaison
 * de session, réponse. Le tout sous un deadline dur : à expiration, le
 * dispatch en vol est abandonné et le client reçoit une erreur de timeout
 * au lieu d'un silence.
 *
 * POLITIQUE D'ERREUR : seules les erreurs de décodage/validation/timeout
 * remontent au client. Les échecs commandes/registry dégradent le service
 * (liste vide, node retenté au prochain snapshot) sans bloquer le stockage.
 */

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::models::{Node, SystemMetrics, WsResponse};
use crate::registry::NodeRegistry;
use crate::report::Reporter;
use crate::repository::{AccountStore, CommandStore};
use crate::server::Session;
use crate::sink::MetricsSink;

pub const DISPATCH_DEADLINE: Duration = Duration::from_secs(5);

/// Classe par défaut des nodes enregistrés paresseusement.
const DEFAULT_SERVER_TYPE: &str = "debug";

pub const ERR_PARSE: &str = "message parse error";
pub const ERR_ACCOUNT: &str = "account lookup failed";
pub const ERR_NO_KEY: &str = "metrics without node key";
pub const ERR_STORE: &str = "metrics store failed";
pub const ERR_TIMEOUT: &str = "processing timed out";

pub struct Dispatcher {
    accounts: Arc<dyn AccountStore>,
    registry: Arc<NodeRegistry>,
    mailbox: Arc<dyn CommandStore>,
    sink: MetricsSink,
    reporter: Arc<dyn Reporter>,
    deadline: Duration,
}

impl Dispatcher {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        registry: Arc<NodeRegistry>,
        mailbox: Arc<dyn CommandStore>,
        sink: MetricsSink,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            accounts,
            registry,
            mailbox,
            sink,
            reporter,
            deadline: DISPATCH_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Point d'entrée par frame. Les effets déjà produits au moment de
    /// l'expiration (enqueue, vidage de commandes) ne sont pas annulés.
    pub async fn dispatch(&self, session: &Session, frame: &str) -> WsResponse {
        match tokio::time::timeout(self.deadline, self.handle(session, frame)).await {
            Ok(response) => response,
            Err(_) => {
                warn!(session = %session.id, "message processing deadline exceeded");
                WsResponse::error(ERR_TIMEOUT)
            }
        }
    }

    async fn handle(&self, session: &Session, frame: &str) -> WsResponse {
        let metrics: SystemMetrics = match serde_json::from_str(frame) {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!(session = %session.id, "snapshot decode failed: {e}");
                return WsResponse::error(ERR_PARSE);
            }
        };

        // Relais des résultats de commandes, détaché du deadline.
        if !metrics.command_results.is_empty() {
            let reporter = self.reporter.clone();
            let node_id = metrics.key.clone();
            let user_id = metrics.user_id.clone();
            let results = metrics.command_results.clone();
            tokio::spawn(async move {
                reporter
                    .forward_command_results(&node_id, &user_id, &results)
                    .await;
            });
        }

        match self.accounts.exists_by_obscura_key(&metrics.user_id).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(user_id = %metrics.user_id, "unknown account key");
                return WsResponse::error(ERR_ACCOUNT);
            }
            Err(e) => {
                warn!(user_id = %metrics.user_id, "account lookup error: {e}");
                return WsResponse::error(ERR_ACCOUNT);
            }
        }

        // La clé de node est la clé de partition de tout l'aval.
        if metrics.key.is_empty() {
            warn!(session = %session.id, "snapshot without node key");
            return WsResponse::error(ERR_NO_KEY);
        }

        if !self.registry.exists(&metrics.key) {
            let node = Node {
                node_id: metrics.key.clone(),
                obscura_key: metrics.user_id.clone(),
                server_type: DEFAULT_SERVER_TYPE.to_string(),
            };
            if let Err(e) = self.registry.register(&node).await {
                // Le snapshot est stocké quand même ; le node restera
                // inconnu et sera retenté au prochain passage.
                warn!(node_id = %node.node_id, "node registration failed: {e}");
            }
        }

        let key = metrics.key.clone();

        if self.sink.enqueue(metrics).await.is_err() {
            warn!(node_id = %key, "metrics queue unavailable");
            return WsResponse::error(ERR_STORE);
        }

        let commands = match self.mailbox.drain(&key).await {
            Ok(commands) => commands,
            Err(e) => {
                // Le stockage des métriques ne doit pas dépendre du
                // sous-système de commandes.
                warn!(node_id = %key, "command drain failed: {e}");
                Vec::new()
            }
        };

        if session.bind_node(&key) {
            info!(session = %session.id, node_id = %key, "session bound to node");
            if let Err(e) = self.registry.set_reachable(&key, true).await {
                warn!(node_id = %key, "reachability update failed: {e}");
            }
            self.registry
                .record_external_addr(&key, &session.remote_addr)
                .await;
        }

        WsResponse::ok(commands)
    }
}
