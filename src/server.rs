/**
 * SESSION MANAGER - Serveur WebSocket du collector
 *
 * RÔLE :
 * Ce module possède l'ensemble des connexions vivantes. Chaque agent tient
 * une connexion longue sur /ws (métriques + livraison de commandes) et,
 * indépendamment, sur /ws/logs (expédition de logs, sans couplage commandes).
 *
 * FONCTIONNEMENT :
 * - Admission stricte : compteur atomique, refus en 503 au plafond
 * - Une tâche de lecture + une tâche de probe + une tâche d'écriture par
 *   session ; un dispatch par message, borné par un sémaphore par session
 * - Toute écriture passe par la tâche d'écriture : accès exclusif au socket
 * - Silence entrant > READ_DEADLINE ou échec d'écriture = session morte
 *
 * TEARDOWN :
 * Retrait de la session du set vivant, et si un node était lié, transition
 * de joignabilité "down" propagée au registry.
 */

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use dashmap::DashMap;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dispatch::Dispatcher;
use crate::models::{LogBatch, WsResponse};
use crate::registry::NodeRegistry;
use crate::repository::LogStore;

pub const PROBE_INTERVAL: Duration = Duration::from_secs(30);
pub const READ_DEADLINE: Duration = Duration::from_secs(60);
pub const WRITE_DEADLINE: Duration = Duration::from_secs(10);
/// Dispatches simultanés tolérés par session avant que la boucle de
/// lecture ne se mette en attente.
pub const MAX_INFLIGHT_DISPATCHES: usize = 8;

const OUTBOUND_BUFFER: usize = 64;

const ERR_BAD_MESSAGE: &str = "invalid message type";
const ERR_LOG_PARSE: &str = "log message parse error";

/// Session éphémère : une par connexion /ws. Le node lié est posé une
/// seule fois, au premier dispatch réussi, et jamais réassigné.
pub struct Session {
    pub id: Uuid,
    pub remote_addr: String,
    node_id: Mutex<Option<String>>,
}

impl Session {
    pub fn new(remote_addr: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            remote_addr,
            node_id: Mutex::new(None),
        }
    }

    /// Retourne true si la session vient d'être liée, false si elle
    /// l'était déjà (la liaison existante est conservée).
    pub fn bind_node(&self, node_id: &str) -> bool {
        let mut bound = self.node_id.lock();
        if bound.is_some() {
            return false;
        }
        *bound = Some(node_id.to_string());
        true
    }

    pub fn node_id(&self) -> Option<String> {
        self.node_id.lock().clone()
    }
}

pub struct SessionManager {
    live: DashMap<Uuid, Arc<Session>>,
    active: AtomicUsize,
    max_sessions: usize,
    registry: Arc<NodeRegistry>,
}

/// Place d'admission, rendue au Drop même si l'upgrade n'aboutit jamais.
pub struct SessionSlot {
    mgr: Arc<SessionManager>,
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.mgr.active.fetch_sub(1, Ordering::AcqRel);
    }
}

impl SessionManager {
    pub fn new(max_sessions: usize, registry: Arc<NodeRegistry>) -> Arc<Self> {
        Arc::new(Self {
            live: DashMap::new(),
            active: AtomicUsize::new(0),
            max_sessions,
            registry,
        })
    }

    /// Réservation compare-and-swap : le compteur ne dépasse jamais le
    /// plafond, même sous admissions concurrentes.
    pub fn try_admit(self: &Arc<Self>) -> Option<SessionSlot> {
        let admitted = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_sessions).then_some(n + 1)
            })
            .is_ok();
        admitted.then(|| SessionSlot { mgr: self.clone() })
    }

    pub fn session_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    fn insert(&self, session: Arc<Session>) {
        self.live.insert(session.id, session);
    }

    async fn teardown(&self, session: &Arc<Session>) {
        self.live.remove(&session.id);
        if let Some(node_id) = session.node_id() {
            info!(session = %session.id, node_id = %node_id, "session closed, node unreachable");
            if let Err(e) = self.registry.set_reachable(&node_id, false).await {
                warn!(node_id = %node_id, "reachability update failed: {e}");
            }
        } else {
            debug!(session = %session.id, "session closed before binding a node");
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub dispatcher: Arc<Dispatcher>,
    pub logs: Arc<dyn LogStore>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/ws", get(metrics_socket))
        .route("/ws/logs", get(log_socket))
        .with_state(state)
}

// GET /health (état du serveur)
async fn get_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "sessions": state.sessions.session_count(),
        "nodes_known": state.sessions.registry.len(),
    }))
}

async fn metrics_socket(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let Some(slot) = state.sessions.try_admit() else {
        warn!(%addr, "session ceiling reached, connection refused");
        return (StatusCode::SERVICE_UNAVAILABLE, "server at capacity").into_response();
    };
    ws.on_upgrade(move |socket| run_session(socket, addr, state, slot))
}

async fn log_socket(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| run_log_session(socket, addr, state))
}

async fn run_session(socket: WebSocket, addr: SocketAddr, state: AppState, slot: SessionSlot) {
    let session = Arc::new(Session::new(addr.to_string()));
    state.sessions.insert(session.clone());
    info!(session = %session.id, %addr, "agent connected");

    let (write_half, mut read_half) = socket.split();
    let (out_tx, out_rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);
    tokio::spawn(write_loop(write_half, out_rx, session.id));
    let probe = tokio::spawn(probe_loop(out_tx.clone()));
    let inflight = Arc::new(Semaphore::new(MAX_INFLIGHT_DISPATCHES));

    loop {
        // toute activité entrante (pong compris) réarme le deadline ;
        // la fermeture du canal d'écriture est fatale (échec de probe
        // ou d'envoi de réponse)
        let frame = tokio::select! {
            frame = timeout(READ_DEADLINE, read_half.next()) => frame,
            _ = out_tx.closed() => {
                warn!(session = %session.id, "write path closed, dropping session");
                break;
            }
        };

        match frame {
            Err(_) => {
                warn!(session = %session.id, "read deadline expired");
                break;
            }
            Ok(None) => {
                info!(session = %session.id, "connection closed by peer");
                break;
            }
            Ok(Some(Err(e))) => {
                warn!(session = %session.id, "read error: {e}");
                break;
            }
            Ok(Some(Ok(Message::Text(text)))) => {
                let Ok(permit) = inflight.clone().acquire_owned().await else {
                    break;
                };
                let dispatcher = state.dispatcher.clone();
                let session = session.clone();
                let tx = out_tx.clone();
                tokio::spawn(async move {
                    let response = dispatcher.dispatch(&session, text.as_str()).await;
                    send_response(&tx, &response).await;
                    drop(permit);
                });
            }
            Ok(Some(Ok(Message::Binary(_)))) => {
                send_response(&out_tx, &WsResponse::error(ERR_BAD_MESSAGE)).await;
            }
            Ok(Some(Ok(Message::Close(_)))) => {
                info!(session = %session.id, "close frame received");
                break;
            }
            Ok(Some(Ok(_))) => {} // ping/pong : simple activité
        }
    }

    probe.abort();
    state.sessions.teardown(&session).await;
    drop(slot);
}

/// Unique écrivain du socket : les réponses de dispatch, les erreurs et
/// les probes sont sérialisées ici, jamais entrelacées.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
    session_id: Uuid,
) {
    while let Some(frame) = rx.recv().await {
        match timeout(WRITE_DEADLINE, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(session = %session_id, "socket write failed: {e}");
                break;
            }
            Err(_) => {
                warn!(session = %session_id, "socket write deadline expired");
                break;
            }
        }
    }
    // la sortie ferme le canal : la boucle de lecture le voit et tombe
}

async fn probe_loop(tx: mpsc::Sender<Message>) {
    let mut ticker = tokio::time::interval(PROBE_INTERVAL);
    ticker.tick().await; // premier tick immédiat, inutile
    loop {
        ticker.tick().await;
        if tx.send(Message::Ping(Default::default())).await.is_err() {
            break;
        }
    }
}

async fn send_response(tx: &mpsc::Sender<Message>, response: &WsResponse) {
    match serde_json::to_string(response) {
        Ok(payload) => {
            if tx.send(Message::Text(payload.into())).await.is_err() {
                debug!("session gone before response could be written");
            }
        }
        Err(e) => error!("response serialization failed: {e}"),
    }
}

/// Chemin parallèle simplifié : réception de lots de logs, persistance
/// détachée, pas de session ni de livraison de commandes.
async fn run_log_session(mut socket: WebSocket, addr: SocketAddr, state: AppState) {
    info!(%addr, "log shipper connected");

    loop {
        match socket.recv().await {
            None => break,
            Some(Err(e)) => {
                warn!(%addr, "log socket read error: {e}");
                break;
            }
            Some(Ok(Message::Text(text))) => {
                let batch: LogBatch = match serde_json::from_str(text.as_str()) {
                    Ok(batch) => batch,
                    Err(e) => {
                        warn!(%addr, "log batch decode failed: {e}");
                        let frame = serde_json::to_string(&WsResponse::error(ERR_LOG_PARSE))
                            .unwrap_or_default();
                        if socket.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                        continue;
                    }
                };
                if batch.logs.is_empty() {
                    continue;
                }
                info!(%addr, count = batch.logs.len(), "log batch received");
                let logs = state.logs.clone();
                tokio::spawn(async move {
                    if let Err(e) = logs.save_logs(&batch.logs).await {
                        error!("log persistence failed: {e}");
                    }
                });
            }
            Some(Ok(Message::Close(_))) => break,
            Some(Ok(_)) => {}
        }
    }

    info!(%addr, "log shipper disconnected");
}
