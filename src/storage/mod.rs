pub mod influx;
pub mod postgres;

pub use influx::InfluxClient;

use async_trait::async_trait;

use crate::models::SystemMetrics;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("time-series write rejected: status {0}")]
    Rejected(reqwest::StatusCode),
}

/// Contrat du moteur time-series : `store(record) -> ok | error`.
/// Retry, flush et compression sont la responsabilité du backend.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn store(&self, metrics: &SystemMetrics) -> Result<(), StoreError>;
}
