/**
 * REPORT - Remontées sortantes vers le web server
 *
 * RÔLE : Relais best-effort des résultats de commandes et des transitions
 * de joignabilité des nodes. Aucun retry : l'endpoint amont est hors du
 * contrat de ce serveur, un échec est journalisé puis oublié.
 */

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info};

use crate::config::WebServerConf;
use crate::models::CommandResult;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait Reporter: Send + Sync {
    async fn forward_command_results(&self, node_id: &str, user_id: &str, results: &[CommandResult]);
    async fn notify_node_status(&self, node_id: &str, status: i16);
}

pub struct HttpReporter {
    client: reqwest::Client,
    results_url: String,
    status_url: String,
}

impl HttpReporter {
    pub fn new(cfg: &WebServerConf) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        let base = cfg.url.trim_end_matches('/');
        Ok(Self {
            client,
            results_url: format!("{base}/api/command-results"),
            status_url: format!("{base}/api/node-status"),
        })
    }
}

#[async_trait]
impl Reporter for HttpReporter {
    async fn forward_command_results(&self, node_id: &str, user_id: &str, results: &[CommandResult]) {
        let resp = self
            .client
            .post(&self.results_url)
            .header("X-Node-ID", node_id)
            .header("X-User-ID", user_id)
            .json(results)
            .send()
            .await;

        match resp {
            Ok(resp) if resp.status().is_success() => {
                info!(node_id, count = results.len(), "command results forwarded");
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                error!(node_id, %status, body = %body, "command result forwarding rejected");
            }
            Err(e) => error!(node_id, "command result forwarding failed: {e}"),
        }
    }

    async fn notify_node_status(&self, node_id: &str, status: i16) {
        let payload = json!({ "node_id": node_id, "status": status });
        let resp = self.client.post(&self.status_url).json(&payload).send().await;

        match resp {
            Ok(resp) if resp.status().is_success() => {
                info!(node_id, status, "node status reported");
            }
            Ok(resp) => error!(node_id, status = %resp.status(), "node status report rejected"),
            Err(e) => error!(node_id, "node status report failed: {e}"),
        }
    }
}
