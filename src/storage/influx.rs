/**
 * INFLUXDB - Écriture line protocol v2
 *
 * RÔLE : Transforme un snapshot en points InfluxDB (une measurement par
 * section, une ligne par disque/interface/processus/conteneur/service)
 * et pousse le tout en un seul write.
 *
 * FONCTIONNEMENT : POST /api/v2/write avec auth par token. Le timestamp
 * du point est celui de la capture côté agent, pas celui de la réception.
 */

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{MetricsStore, StoreError};
use crate::config::InfluxConf;
use crate::models::SystemMetrics;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct InfluxClient {
    client: reqwest::Client,
    write_url: String,
    health_url: String,
    token: String,
}

impl InfluxClient {
    pub fn new(cfg: &InfluxConf) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        let base = cfg.url.trim_end_matches('/');
        Ok(Self {
            client,
            write_url: format!(
                "{base}/api/v2/write?org={}&bucket={}&precision=ns",
                cfg.org, cfg.bucket
            ),
            health_url: format!("{base}/health"),
            token: cfg.token.clone(),
        })
    }

    /// Test de connexion au démarrage, fatal en cas d'échec.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let resp = self.client.get(&self.health_url).send().await?;
        if !resp.status().is_success() {
            return Err(StoreError::Rejected(resp.status()));
        }
        Ok(())
    }

    async fn write(&self, body: String) -> Result<(), StoreError> {
        let resp = self
            .client
            .post(&self.write_url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(StoreError::Rejected(resp.status()));
        }
        Ok(())
    }
}

#[async_trait]
impl MetricsStore for InfluxClient {
    async fn store(&self, metrics: &SystemMetrics) -> Result<(), StoreError> {
        let body = encode_snapshot(metrics);
        self.write(body).await?;
        debug!(key = %metrics.key, "snapshot written to influxdb");
        Ok(())
    }
}

fn encode_snapshot(m: &SystemMetrics) -> String {
    let ts = m.timestamp.unix_timestamp_nanos();
    let mut lines = Vec::new();

    let mut system = Line::new("system");
    system.tag("key", &m.key);
    system.tag("hostname", &m.system.hostname);
    system.field_str("os", &m.system.os);
    system.field_i64("uptime_seconds", m.system.uptime_seconds);
    lines.push(system.finish(ts));

    let mut cpu = Line::new("cpu");
    cpu.tag("key", &m.key);
    cpu.tag("hostname", &m.system.hostname);
    cpu.field_str("architecture", &m.cpu.architecture);
    cpu.field_str("model", &m.cpu.model);
    cpu.field_str("vendor", &m.cpu.vendor);
    cpu.field_i64("cache_size", m.cpu.cache_size);
    cpu.field_f64("clock_speed", m.cpu.clock_speed);
    cpu.field_i64("total_cores", m.cpu.total_cores.into());
    cpu.field_i64("total_logical_cores", m.cpu.total_logical_cores.into());
    cpu.field_f64("usage", m.cpu.usage);
    cpu.field_f64("temperature", m.cpu.temperature);
    cpu.field_bool("has_vmx", m.cpu.has_vmx);
    cpu.field_bool("has_svm", m.cpu.has_svm);
    cpu.field_bool("has_avx", m.cpu.has_avx);
    cpu.field_bool("has_avx2", m.cpu.has_avx2);
    cpu.field_bool("is_hyperthreading", m.cpu.is_hyperthreading);
    for core in &m.cpu.cores {
        cpu.field_f64(&format!("core_{}_usage", core.id), core.usage);
        cpu.field_f64(&format!("core_{}_temperature", core.id), core.temperature);
    }
    lines.push(cpu.finish(ts));

    let mut memory = Line::new("memory");
    memory.tag("key", &m.key);
    memory.tag("hostname", &m.system.hostname);
    memory.field_i64("total", m.memory.total);
    memory.field_i64("used", m.memory.used);
    memory.field_i64("free", m.memory.free);
    memory.field_i64("available", m.memory.available);
    memory.field_i64("buffers", m.memory.buffers);
    memory.field_i64("cached", m.memory.cached);
    memory.field_i64("swap_total", m.memory.swap_total);
    memory.field_i64("swap_used", m.memory.swap_used);
    memory.field_i64("swap_free", m.memory.swap_free);
    memory.field_f64("usage_percent", m.memory.usage_percent);
    lines.push(memory.finish(ts));

    for disk in &m.disk {
        let mut line = Line::new("disk");
        line.tag("key", &m.key);
        line.tag("device", &disk.device);
        line.tag("mount_point", &disk.mount_point);
        line.tag("filesystem_type", &disk.filesystem_type);
        line.field_i64("total", disk.total);
        line.field_i64("used", disk.used);
        line.field_i64("free", disk.free);
        line.field_i64("inodes_total", disk.inodes_total);
        line.field_i64("inodes_used", disk.inodes_used);
        line.field_i64("inodes_free", disk.inodes_free);
        line.field_f64("usage_percent", disk.usage_percent);
        line.field_bool("error_flag", disk.error_flag);
        line.field_i64("io_read_bytes", disk.io_stats.read_bytes);
        line.field_i64("io_write_bytes", disk.io_stats.write_bytes);
        line.field_i64("io_reads", disk.io_stats.reads);
        line.field_i64("io_writes", disk.io_stats.writes);
        line.field_f64("io_reads_per_sec", disk.io_stats.reads_per_sec);
        line.field_f64("io_writes_per_sec", disk.io_stats.writes_per_sec);
        line.field_i64("io_in_progress", disk.io_stats.io_in_progress);
        line.field_i64("io_time", disk.io_stats.io_time);
        lines.push(line.finish(ts));
    }

    for network in &m.network {
        let mut line = Line::new("network");
        line.tag("key", &m.key);
        line.tag("interface", &network.name);
        line.tag("ip", &network.ip);
        line.tag("mac", &network.mac);
        line.field_i64("mtu", network.mtu.into());
        line.field_i64("speed", network.speed);
        line.field_str("status", &network.status);
        line.field_i64("rx_bytes", network.rx_bytes);
        line.field_i64("tx_bytes", network.tx_bytes);
        line.field_i64("rx_packets", network.rx_packets);
        line.field_i64("tx_packets", network.tx_packets);
        line.field_i64("rx_errors", network.rx_errors);
        line.field_i64("tx_errors", network.tx_errors);
        line.field_i64("rx_dropped", network.rx_dropped);
        line.field_i64("tx_dropped", network.tx_dropped);
        line.field_f64("rx_bytes_per_sec", network.rx_bytes_per_sec);
        line.field_f64("tx_bytes_per_sec", network.tx_bytes_per_sec);
        lines.push(line.finish(ts));
    }

    for process in &m.processes {
        let mut line = Line::new("process");
        line.tag("key", &m.key);
        line.tag("pid", &process.pid.to_string());
        line.tag("name", &process.name);
        line.tag("user", &process.user);
        line.tag("command", &process.command);
        line.field_i64("ppid", process.ppid.into());
        line.field_str("status", &process.status);
        line.field_f64("cpu_time", process.cpu_time);
        line.field_f64("cpu_usage", process.cpu_usage);
        line.field_i64("memory_rss", process.memory_rss);
        line.field_i64("memory_vsz", process.memory_vsz);
        line.field_i64("nice", process.nice.into());
        line.field_i64("threads", process.threads.into());
        line.field_i64("open_files", process.open_files.into());
        line.field_i64("start_time", process.start_time);
        line.field_i64("io_read_bytes", process.io_read_bytes);
        line.field_i64("io_write_bytes", process.io_write_bytes);
        lines.push(line.finish(ts));
    }

    for container in &m.containers {
        let mut line = Line::new("docker");
        line.tag("key", &m.key);
        line.tag("container_id", &container.id);
        line.tag("container_name", &container.name);
        line.tag("image", &container.image);
        line.field_str("status", &container.status);
        line.field_i64("created", container.created);
        line.field_f64("cpu_usage", container.cpu_usage);
        line.field_i64("memory_usage", container.memory_usage);
        line.field_i64("memory_limit", container.memory_limit);
        line.field_f64("memory_percent", container.memory_percent);
        line.field_i64("network_rx", container.network_rx);
        line.field_i64("network_tx", container.network_tx);
        line.field_i64("block_read", container.block_read);
        line.field_i64("block_write", container.block_write);
        line.field_i64("pids", container.pids.into());
        line.field_i64("restarts", container.restarts.into());
        lines.push(line.finish(ts));
    }

    for service in &m.services {
        let mut line = Line::new("service");
        line.tag("key", &m.key);
        line.tag("service", &service.name);
        line.field_str("status", &service.status);
        if let Some(enabled) = service.enabled {
            line.field_bool("enabled", enabled);
        }
        lines.push(line.finish(ts));
    }

    lines.join("\n")
}

/// Constructeur d'une ligne line-protocol :
/// `measurement,tag=v field=v,field=v timestamp`
struct Line {
    head: String,
    fields: String,
}

impl Line {
    fn new(measurement: &str) -> Self {
        Self {
            head: measurement.to_string(),
            fields: String::new(),
        }
    }

    fn tag(&mut self, key: &str, value: &str) {
        // un tag vide est invalide en line protocol, on l'omet
        if value.is_empty() {
            return;
        }
        self.head.push(',');
        self.head.push_str(key);
        self.head.push('=');
        self.head.push_str(&escape_tag(value));
    }

    fn push_key(&mut self, key: &str) {
        if !self.fields.is_empty() {
            self.fields.push(',');
        }
        self.fields.push_str(key);
        self.fields.push('=');
    }

    fn field_f64(&mut self, key: &str, value: f64) {
        self.push_key(key);
        self.fields.push_str(&value.to_string());
    }

    fn field_i64(&mut self, key: &str, value: i64) {
        self.push_key(key);
        self.fields.push_str(&format!("{value}i"));
    }

    fn field_bool(&mut self, key: &str, value: bool) {
        self.push_key(key);
        self.fields.push_str(if value { "true" } else { "false" });
    }

    fn field_str(&mut self, key: &str, value: &str) {
        self.push_key(key);
        self.fields.push('"');
        self.fields.push_str(&value.replace('\\', "\\\\").replace('"', "\\\""));
        self.fields.push('"');
    }

    fn finish(self, timestamp_ns: i128) -> String {
        format!("{} {} {}", self.head, self.fields, timestamp_ns)
    }
}

/// Les tags ne sont jamais quotés : virgules, espaces et égals
/// doivent être échappés. Une valeur vide reste vide.
fn escape_tag(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace(' ', "\\ ")
        .replace('=', "\\=")
}
