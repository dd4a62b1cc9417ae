// Doublures mémoire des collaborateurs externes, partagées par les
// modules de test du crate.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::models::{Command, CommandResult, Node, SystemMetrics};
use crate::report::Reporter;
use crate::repository::{AccountStore, CommandStore, NodeStore, RepoError};
use crate::storage::{MetricsStore, StoreError};

pub fn sample_metrics(key: &str, user_id: &str) -> SystemMetrics {
    SystemMetrics {
        key: key.into(),
        user_id: user_id.into(),
        timestamp: OffsetDateTime::now_utc(),
        command_results: Vec::new(),
        system: Default::default(),
        cpu: Default::default(),
        memory: Default::default(),
        disk: Vec::new(),
        network: Vec::new(),
        processes: Vec::new(),
        containers: Vec::new(),
        services: Vec::new(),
    }
}

pub fn sample_frame(key: &str, user_id: &str) -> String {
    serde_json::to_string(&sample_metrics(key, user_id)).unwrap()
}

#[derive(Default)]
pub struct MemoryAccounts {
    keys: HashSet<String>,
}

impl MemoryAccounts {
    pub fn with_keys(keys: &[&str]) -> Self {
        Self {
            keys: keys.iter().map(|k| k.to_string()).collect(),
        }
    }
}

#[async_trait]
impl AccountStore for MemoryAccounts {
    async fn exists_by_obscura_key(&self, obscura_key: &str) -> Result<bool, RepoError> {
        Ok(self.keys.contains(obscura_key))
    }
}

#[derive(Default)]
pub struct MemoryNodes {
    nodes: Mutex<Vec<Node>>,
    statuses: Mutex<Vec<(String, i16)>>,
    addrs: Mutex<Vec<(String, String)>>,
    fail_next_create: AtomicBool,
    create_calls: AtomicUsize,
}

impl MemoryNodes {
    pub fn fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> Vec<Node> {
        self.nodes.lock().clone()
    }

    pub fn statuses(&self) -> Vec<(String, i16)> {
        self.statuses.lock().clone()
    }

    pub fn addrs(&self) -> Vec<(String, String)> {
        self.addrs.lock().clone()
    }
}

#[async_trait]
impl NodeStore for MemoryNodes {
    async fn create(&self, node: &Node) -> Result<(), RepoError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(RepoError::Backend("create unavailable".into()));
        }
        self.nodes.lock().push(node.clone());
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Node>, RepoError> {
        Ok(self.nodes.lock().clone())
    }

    async fn update_status(&self, node_id: &str, status: i16) -> Result<(), RepoError> {
        self.statuses.lock().push((node_id.into(), status));
        Ok(())
    }

    async fn update_external_addr(&self, node_id: &str, addr: &str) -> Result<(), RepoError> {
        self.addrs.lock().push((node_id.into(), addr.into()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryMailbox {
    queues: Mutex<HashMap<String, Vec<Command>>>,
    fail_fetch: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl MemoryMailbox {
    pub fn push(&self, command: Command) {
        self.queues
            .lock()
            .entry(command.node_id.clone())
            .or_default()
            .push(command);
    }

    pub fn fail_fetch(&self) {
        self.fail_fetch.store(true, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub fn pending(&self, node_id: &str) -> usize {
        self.queues.lock().get(node_id).map_or(0, Vec::len)
    }
}

// `drain` volontairement non surchargé : les tests exercent le
// séquencement fetch + delete_all par défaut du trait.
#[async_trait]
impl CommandStore for MemoryMailbox {
    async fn fetch(&self, node_id: &str) -> Result<Vec<Command>, RepoError> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(RepoError::Backend("mailbox unavailable".into()));
        }
        Ok(self.queues.lock().get(node_id).cloned().unwrap_or_default())
    }

    async fn delete_all(&self, node_id: &str) -> Result<(), RepoError> {
        self.queues.lock().remove(node_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    statuses: Mutex<Vec<(String, i16)>>,
    results: Mutex<Vec<(String, String, usize)>>,
}

impl RecordingReporter {
    pub fn statuses(&self) -> Vec<(String, i16)> {
        self.statuses.lock().clone()
    }

    pub fn forwarded(&self) -> Vec<(String, String, usize)> {
        self.results.lock().clone()
    }
}

#[async_trait]
impl Reporter for RecordingReporter {
    async fn forward_command_results(
        &self,
        node_id: &str,
        user_id: &str,
        results: &[CommandResult],
    ) {
        self.results
            .lock()
            .push((node_id.into(), user_id.into(), results.len()));
    }

    async fn notify_node_status(&self, node_id: &str, status: i16) {
        self.statuses.lock().push((node_id.into(), status));
    }
}

#[derive(Default)]
pub struct RecordingStore {
    keys: Mutex<Vec<String>>,
    fail_keys: Mutex<HashSet<String>>,
}

impl RecordingStore {
    pub fn fail_on(&self, key: &str) {
        self.fail_keys.lock().insert(key.into());
    }

    pub fn stored_keys(&self) -> Vec<String> {
        self.keys.lock().clone()
    }
}

#[async_trait]
impl MetricsStore for RecordingStore {
    async fn store(&self, metrics: &SystemMetrics) -> Result<(), StoreError> {
        if self.fail_keys.lock().contains(&metrics.key) {
            return Err(StoreError::Rejected(
                reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            ));
        }
        self.keys.lock().push(metrics.key.clone());
        Ok(())
    }
}
