/**
 * METRICS SINK - File bornée + pool de workers de stockage
 *
 * RÔLE : Découple la boucle réseau de la latence du store time-series.
 * L'enqueue bloque quand la file est pleine (backpressure, jamais de
 * perte silencieuse) ; l'attente est bornée par le deadline du dispatch
 * appelant. Les workers se disputent les snapshots sans garantie d'ordre
 * par node.
 *
 * ARRÊT : La fermeture du dernier handle d'enqueue vide la file ; les
 * snapshots en cours de stockage se terminent, le reste est abandonné si
 * le processus force la sortie.
 */

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::SystemMetrics;
use crate::storage::MetricsStore;

#[derive(Debug, thiserror::Error)]
#[error("metrics queue closed")]
pub struct SinkClosed;

/// Handle d'enqueue, clonable, partagé par tous les dispatches.
#[derive(Clone)]
pub struct MetricsSink {
    tx: mpsc::Sender<SystemMetrics>,
}

impl MetricsSink {
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<SystemMetrics>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Bloque tant que la file est à capacité. N'échoue que si le pool
    /// est arrêté.
    pub async fn enqueue(&self, metrics: SystemMetrics) -> Result<(), SinkClosed> {
        self.tx.send(metrics).await.map_err(|_| SinkClosed)
    }
}

/// Démarre `workers` consommateurs en compétition sur la même file.
/// Un échec de stockage est journalisé et le snapshot abandonné ; la
/// durabilité au-delà d'une tentative relève du backend.
pub fn spawn_workers(
    rx: mpsc::Receiver<SystemMetrics>,
    store: Arc<dyn MetricsStore>,
    workers: usize,
) -> Vec<JoinHandle<()>> {
    let rx = Arc::new(Mutex::new(rx));

    (0..workers)
        .map(|worker| {
            let rx = rx.clone();
            let store = store.clone();
            tokio::spawn(async move {
                loop {
                    let next = { rx.lock().await.recv().await };
                    match next {
                        Some(metrics) => {
                            if let Err(e) = store.store(&metrics).await {
                                warn!(key = %metrics.key, "metrics store failed: {e}");
                            }
                        }
                        None => break,
                    }
                }
                debug!(worker, "storage worker stopped");
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{sample_metrics, RecordingStore};
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_enqueue_blocks_at_capacity_without_losing_data() {
        let (sink, mut rx) = MetricsSink::bounded(2);
        sink.enqueue(sample_metrics("node-1", "acct-1")).await.unwrap();
        sink.enqueue(sample_metrics("node-2", "acct-1")).await.unwrap();

        // file saturée : le 3e enqueue reste en attente
        let blocked = sink.enqueue(sample_metrics("node-3", "acct-1"));
        tokio::pin!(blocked);
        assert!(timeout(Duration::from_millis(20), &mut blocked).await.is_err());

        // un worker draine une place, l'enqueue en attente aboutit
        let first = rx.recv().await.unwrap();
        assert_eq!(first.key, "node-1");
        timeout(Duration::from_millis(200), &mut blocked)
            .await
            .expect("enqueue should complete once a slot frees")
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().key, "node-2");
        assert_eq!(rx.recv().await.unwrap().key, "node-3");
    }

    #[tokio::test]
    async fn test_workers_drain_queue_and_stop_on_close() {
        let store = Arc::new(RecordingStore::default());
        let (sink, rx) = MetricsSink::bounded(16);
        let handles = spawn_workers(rx, store.clone(), 3);

        for i in 0..5 {
            sink.enqueue(sample_metrics(&format!("node-{i}"), "acct-1"))
                .await
                .unwrap();
        }

        drop(sink);
        for handle in handles {
            timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        }
        assert_eq!(store.stored_keys().len(), 5);
    }

    #[tokio::test]
    async fn test_store_failure_drops_record_and_keeps_draining() {
        let store = Arc::new(RecordingStore::default());
        store.fail_on("node-bad");
        let (sink, rx) = MetricsSink::bounded(8);
        let handles = spawn_workers(rx, store.clone(), 1);

        sink.enqueue(sample_metrics("node-bad", "acct-1")).await.unwrap();
        sink.enqueue(sample_metrics("node-ok", "acct-1")).await.unwrap();

        drop(sink);
        for handle in handles {
            timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        }
        assert_eq!(store.stored_keys(), vec!["node-ok".to_string()]);
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_reports_closed() {
        let (sink, rx) = MetricsSink::bounded(1);
        drop(rx);
        assert!(sink.enqueue(sample_metrics("node-1", "acct-1")).await.is_err());
    }
}
