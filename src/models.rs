/**
 * MODELS - Structures de données du collector
 *
 * RÔLE : Formats d'échange agent <-> serveur (snapshots, commandes, logs)
 * et entités persistées (nodes). Un snapshot décodé est une valeur immuable :
 * il est produit par le parsing d'une frame et consommé une seule fois par
 * un worker de stockage.
 *
 * ARCHITECTURE : Schéma JSON aligné sur le format émis par les agents.
 * Toutes les sections de métriques sont tolérées absentes (valeurs par défaut).
 */

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Snapshot complet d'un node, tel que reçu sur /ws.
/// `key` identifie le node, `user_id` la clé de compte propriétaire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// Identifiant de node ; absent = chaîne vide, rejeté à la validation.
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Résultats de commandes livrées lors d'un round trip précédent.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command_results: Vec<CommandResult>,
    #[serde(default)]
    pub system: SystemInfo,
    #[serde(default)]
    pub cpu: CpuMetrics,
    #[serde(default)]
    pub memory: MemoryMetrics,
    #[serde(default)]
    pub disk: Vec<DiskMetrics>,
    #[serde(default)]
    pub network: Vec<NetworkMetrics>,
    #[serde(default)]
    pub processes: Vec<ProcessInfo>,
    #[serde(default)]
    pub containers: Vec<ContainerInfo>,
    #[serde(default)]
    pub services: Vec<ServiceInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemInfo {
    pub hostname: String,
    pub os: String,
    pub uptime_seconds: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuMetrics {
    pub architecture: String,
    pub model: String,
    pub vendor: String,
    pub cache_size: i64,
    pub clock_speed: f64,
    pub total_cores: i32,
    pub total_logical_cores: i32,
    pub usage: f64,
    pub temperature: f64,
    pub has_vmx: bool,
    pub has_svm: bool,
    pub has_avx: bool,
    pub has_avx2: bool,
    pub is_hyperthreading: bool,
    pub cores: Vec<CpuCore>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuCore {
    pub id: i32,
    pub usage: f64,
    pub temperature: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryMetrics {
    pub total: i64,
    pub used: i64,
    pub free: i64,
    pub available: i64,
    pub buffers: i64,
    pub cached: i64,
    pub swap_total: i64,
    pub swap_used: i64,
    pub swap_free: i64,
    pub usage_percent: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskMetrics {
    pub device: String,
    pub mount_point: String,
    pub filesystem_type: String,
    pub total: i64,
    pub used: i64,
    pub free: i64,
    pub inodes_total: i64,
    pub inodes_used: i64,
    pub inodes_free: i64,
    pub usage_percent: f64,
    pub error_flag: bool,
    pub io_stats: DiskIoStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskIoStats {
    pub read_bytes: i64,
    pub write_bytes: i64,
    pub reads: i64,
    pub writes: i64,
    pub reads_per_sec: f64,
    pub writes_per_sec: f64,
    pub io_in_progress: i64,
    pub io_time: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkMetrics {
    #[serde(rename = "interface")]
    pub name: String,
    pub ip: String,
    pub mac: String,
    pub mtu: i32,
    pub speed: i64,
    pub status: String,
    pub rx_bytes: i64,
    pub tx_bytes: i64,
    pub rx_packets: i64,
    pub tx_packets: i64,
    pub rx_errors: i64,
    pub tx_errors: i64,
    pub rx_dropped: i64,
    pub tx_dropped: i64,
    pub rx_bytes_per_sec: f64,
    pub tx_bytes_per_sec: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessInfo {
    pub pid: i32,
    pub ppid: i32,
    pub name: String,
    pub user: String,
    pub command: String,
    pub status: String,
    pub cpu_time: f64,
    pub cpu_usage: f64,
    pub memory_rss: i64,
    pub memory_vsz: i64,
    pub nice: i32,
    pub threads: i32,
    pub open_files: i32,
    pub start_time: i64,
    pub io_read_bytes: i64,
    pub io_write_bytes: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: String,
    pub created: i64,
    pub cpu_usage: f64,
    pub memory_usage: i64,
    pub memory_limit: i64,
    pub memory_percent: f64,
    pub network_rx: i64,
    pub network_tx: i64,
    pub block_read: i64,
    pub block_write: i64,
    pub pids: i32,
    pub restarts: i32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<ContainerLabel>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerLabel {
    #[serde(rename = "label_key")]
    pub key: String,
    #[serde(rename = "label_value")]
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceInfo {
    pub name: String,
    pub status: String,
    pub enabled: Option<bool>,
}

/// Commande administrative en attente pour un node.
/// Créée par le web server, livrée au node sur son prochain snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub command_id: i32,
    pub node_id: String,
    pub command_type: String,
    pub command_status: i16,
}

/// Résultat d'exécution d'une commande, remonté par l'agent.
/// Relayé tel quel au web server, jamais conservé côté collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub command_id: i32,
    pub node_id: String,
    pub command_type: String,
    pub command_status: i32,
    pub result_status: i32,
    pub result_message: String,
    pub target: String,
}

/// Node durable : identité + compte propriétaire + classe de serveur.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub node_id: String,
    pub obscura_key: String,
    pub server_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMessage {
    pub node_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub level: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct LogBatch {
    pub logs: Vec<LogMessage>,
}

/// Frame de réponse WebSocket. La liste de commandes est toujours
/// sérialisée, même vide, pour que les agents la traitent comme obligatoire.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum WsResponse {
    #[serde(rename = "metrics_response")]
    Metrics { commands: Vec<Command> },
    #[serde(rename = "error")]
    Error { error: String },
}

impl WsResponse {
    pub fn ok(commands: Vec<Command>) -> Self {
        WsResponse::Metrics { commands }
    }

    pub fn error(message: impl Into<String>) -> Self {
        WsResponse::Error { error: message.into() }
    }
}
