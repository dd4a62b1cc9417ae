/**
 * OBSCURA COLLECTOR - Point d'entrée du serveur d'ingestion
 *
 * RÔLE : Orchestration de tous les modules : config, stores, registry,
 * sink, dispatcher, sessions WebSocket. Construction explicite et
 * injection de chaque collaborateur, aucun singleton ambiant.
 *
 * ARCHITECTURE : Agents -> /ws -> dispatcher -> file bornée -> workers
 * InfluxDB, avec livraison de commandes PostgreSQL dans le même round trip.
 */

mod config;
mod dispatch;
mod models;
mod registry;
mod report;
mod repository;
mod server;
mod sink;
mod storage;
#[cfg(test)]
mod testutil;

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::dispatch::Dispatcher;
use crate::registry::NodeRegistry;
use crate::report::{HttpReporter, Reporter};
use crate::repository::{
    AccountStore, CommandRepository, CommandStore, LogRepository, LogStore, NodeRepository,
    NodeStore, UserRepository,
};
use crate::server::{AppState, SessionManager};
use crate::sink::MetricsSink;
use crate::storage::InfluxClient;

/// Délai accordé aux workers pour vider la file après le signal d'arrêt.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // Ok si .env n'existe pas
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("starting obscura-collector");
    let cfg = config::load().await.context("config load failed")?;

    // stores externes : toute défaillance ici est fatale
    let pool = storage::postgres::connect(&cfg.postgres).await?;
    let influx = Arc::new(InfluxClient::new(&cfg.influxdb)?);
    influx.ping().await.context("influxdb unreachable")?;
    info!(url = %cfg.influxdb.url, "influxdb connection established");

    let reporter: Arc<dyn Reporter> = Arc::new(HttpReporter::new(&cfg.web_server)?);
    let accounts: Arc<dyn AccountStore> = Arc::new(UserRepository::new(pool.clone()));
    let nodes: Arc<dyn NodeStore> = Arc::new(NodeRepository::new(pool.clone()));
    let mailbox: Arc<dyn CommandStore> = Arc::new(CommandRepository::new(pool.clone()));
    let logs: Arc<dyn LogStore> = Arc::new(LogRepository::new(pool));

    let registry = NodeRegistry::seed(nodes, reporter.clone()).await;

    // file bornée + pool de workers : le seul point de backpressure
    let (metrics_sink, queue) = MetricsSink::bounded(cfg.websocket.queue_capacity);
    let workers = sink::spawn_workers(queue, influx, cfg.websocket.storage_workers);
    info!(
        workers = cfg.websocket.storage_workers,
        capacity = cfg.websocket.queue_capacity,
        "metrics sink started"
    );

    let dispatcher = Arc::new(Dispatcher::new(
        accounts,
        registry.clone(),
        mailbox,
        metrics_sink,
        reporter,
    ));
    let sessions = SessionManager::new(cfg.websocket.max_sessions, registry);
    let app = server::build_router(AppState {
        sessions,
        dispatcher,
        logs,
    });

    let addr = format!("{}:{}", cfg.server.host, cfg.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind failed on {addr}"))?;
    info!(%addr, "websocket endpoints listening on /ws and /ws/logs");

    let serve = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .into_future();

    tokio::select! {
        result = serve => result.context("server terminated")?,
        _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
    }

    // arrêt : les handles d'enqueue tombent avec le serveur, les workers
    // terminent les snapshots en vol puis s'arrêtent ; au-delà du délai,
    // le reste de la file est abandonné (best-effort)
    info!("draining storage queue");
    if tokio::time::timeout(DRAIN_TIMEOUT, futures::future::join_all(workers))
        .await
        .is_err()
    {
        warn!("storage queue not fully drained before exit");
    }

    info!("collector stopped");
    Ok(())
}
