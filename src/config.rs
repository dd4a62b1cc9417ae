use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Valeurs héritées du déploiement historique, appliquées quand la
/// section `websocket` est absente du fichier.
pub const DEFAULT_MAX_SESSIONS: usize = 1000;
pub const DEFAULT_STORAGE_WORKERS: usize = 50;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConf,
    #[serde(default)]
    pub websocket: WebsocketConf,
    pub influxdb: InfluxConf,
    pub postgres: PostgresConf,
    pub web_server: WebServerConf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConf {
    pub host: String,
    pub port: u16,
}

/// Surface de contrôle d'admission : plafond de sessions, taille du pool
/// de stockage et capacité de la file bornée.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebsocketConf {
    pub max_sessions: usize,
    pub storage_workers: usize,
    pub queue_capacity: usize,
}

impl Default for WebsocketConf {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            storage_workers: DEFAULT_STORAGE_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConf {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConf {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub sslmode: String,
}

impl PostgresConf {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.dbname, self.sslmode
        )
    }
}

/// Endpoint du web server recevant les résultats de commandes et les
/// transitions de joignabilité.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebServerConf {
    pub url: String,
}

impl Config {
    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        let mut cfg: Config = serde_yaml::from_str(raw)?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Surcharges env pour les déploiements conteneurisés.
    fn apply_env_overrides(&mut self) {
        if let Ok(db_host) = std::env::var("DB_HOST") {
            if !db_host.is_empty() {
                self.postgres.host = db_host;
            }
        }
        if let Ok(influx_url) = std::env::var("INFLUXDB_URL") {
            if !influx_url.is_empty() {
                self.influxdb.url = influx_url;
            }
        }
    }
}

/// Charge la configuration depuis COLLECTOR_CONFIG (défaut: collector.yaml).
/// Un fichier absent ou invalide est fatal au démarrage.
pub async fn load() -> anyhow::Result<Config> {
    let path = std::env::var("COLLECTOR_CONFIG").unwrap_or_else(|_| "collector.yaml".into());
    if !Path::new(&path).exists() {
        anyhow::bail!("config file not found: {path}");
    }
    let raw = fs::read_to_string(&path).await?;
    Config::from_yaml(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
server:
  host: 127.0.0.1
  port: 9090
influxdb:
  url: http://influx:8086
  token: t
  org: o
  bucket: b
postgres:
  host: db
  port: 5432
  user: u
  password: p
  dbname: obscura
  sslmode: disable
web_server:
  url: http://web:8000
"#;

    #[test]
    fn test_defaults_when_websocket_section_missing() {
        let cfg: Config = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.websocket.max_sessions, DEFAULT_MAX_SESSIONS);
        assert_eq!(cfg.websocket.storage_workers, DEFAULT_STORAGE_WORKERS);
        assert_eq!(cfg.websocket.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_websocket_section_overrides_defaults() {
        let raw = format!("{SAMPLE}\nwebsocket:\n  max_sessions: 5\n");
        let cfg: Config = serde_yaml::from_str(&raw).unwrap();
        assert_eq!(cfg.websocket.max_sessions, 5);
        assert_eq!(cfg.websocket.storage_workers, DEFAULT_STORAGE_WORKERS);
    }

    #[test]
    fn test_postgres_connection_url() {
        let cfg: Config = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(
            cfg.postgres.connection_url(),
            "postgres://u:p@db:5432/obscura?sslmode=disable"
        );
    }
}
