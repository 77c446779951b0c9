//! Dataflow supervisor: one child process per node spec, liveness via
//! heartbeat channels, cooperative stop via the shutdown channels.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::StreamExt;
use indexmap::IndexMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use weft_node_sdk::{heartbeat_channel, shutdown_channel, DataflowConfig, NodeSpec, SHUTDOWN_PAYLOAD};

use crate::process::ManagedChild;

/// A node is `Running` while its heartbeats keep arriving within this window.
pub const LIVENESS_TIMEOUT: Duration = Duration::from_secs(10);

const HEALTH_CHECK_PERIOD: Duration = Duration::from_secs(1);
const CHILD_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    /// Child spawned, no heartbeat observed yet.
    Started,
    Running,
    /// Heartbeats stopped arriving for longer than [`LIVENESS_TIMEOUT`].
    NoResponse,
    Stopped,
}

impl std::fmt::Display for Health {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Health::Started => write!(f, "Started"),
            Health::Running => write!(f, "Running"),
            Health::NoResponse => write!(f, "No Response"),
            Health::Stopped => write!(f, "Stopped"),
        }
    }
}

pub(crate) fn classify(since_last_heartbeat: Duration) -> Health {
    if since_last_heartbeat <= LIVENESS_TIMEOUT {
        Health::Running
    } else {
        Health::NoResponse
    }
}

/// First node name appearing more than once, if any.
pub(crate) fn duplicate_node_name(specs: &[NodeSpec]) -> Option<String> {
    let mut seen = HashSet::new();
    for spec in specs {
        if !seen.insert(spec.node_name.as_str()) {
            return Some(spec.node_name.clone());
        }
    }
    None
}

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("duplicate node name '{0}' in dataflow")]
    DuplicateNode(String),

    #[error("failed to spawn child process for node '{node}': {source}")]
    ChildSpawn {
        node: String,
        #[source]
        source: std::io::Error,
    },

    #[error("broker error: {0}")]
    Broker(#[from] redis::RedisError),

    #[error("shutdown subscription closed unexpectedly")]
    Disconnected,
}

#[derive(Default)]
struct HealthState {
    last_heartbeat: HashMap<String, Instant>,
    health: HashMap<String, Health>,
}

pub struct NodeManager {
    id: String,
    dataflow_toml: PathBuf,
    config: DataflowConfig,
    children: IndexMap<String, ManagedChild>,
    state: Arc<Mutex<HealthState>>,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeManager {
    pub fn new(dataflow_toml: PathBuf, config: DataflowConfig) -> Self {
        Self {
            id: format!("manager-{}", Uuid::new_v4()),
            dataflow_toml,
            config,
            children: IndexMap::new(),
            state: Arc::new(Mutex::new(HealthState::default())),
            tasks: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn health(&self, node_name: &str) -> Option<Health> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .health
            .get(node_name)
            .copied()
    }

    /// Spawn every node as a child process and start the heartbeat collector
    /// and health updater. On any failure, already-started children are torn
    /// down before the error propagates.
    pub async fn enter(&mut self) -> Result<(), ManagerError> {
        if let Some(name) = duplicate_node_name(&self.config.nodes) {
            return Err(ManagerError::DuplicateNode(name));
        }

        let exe = std::env::current_exe().map_err(|e| {
            ManagerError::Configuration(format!("cannot resolve own executable: {e}"))
        })?;
        self.config.load_extra_modules();

        let specs: Vec<NodeSpec> = self.config.nodes.clone();
        for spec in specs {
            let args = vec![
                "run-node".to_string(),
                "--dataflow-toml".to_string(),
                self.dataflow_toml.display().to_string(),
                "--node-name".to_string(),
                spec.node_name.clone(),
                "--redis-url".to_string(),
                self.config.redis_url.clone(),
            ];
            match ManagedChild::spawn(&spec.node_name, &exe, &args) {
                Ok(child) => {
                    self.children.insert(spec.node_name.clone(), child);
                    self.state
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .health
                        .insert(spec.node_name.clone(), Health::Started);
                }
                Err(e) => {
                    log::error!("{e}; stopping other nodes as well");
                    self.terminate_children().await;
                    return Err(e);
                }
            }
        }

        let client = redis::Client::open(self.config.redis_url.as_str())?;
        self.spawn_heartbeat_collector(&client).await?;
        self.spawn_health_updater();
        log::info!("{}: launched {} nodes", self.id, self.children.len());
        Ok(())
    }

    async fn spawn_heartbeat_collector(
        &mut self,
        client: &redis::Client,
    ) -> Result<(), ManagerError> {
        let mut pubsub = client.get_async_pubsub().await?;
        let channels: Vec<String> = self.children.keys().map(|n| heartbeat_channel(n)).collect();
        if !channels.is_empty() {
            pubsub.subscribe(&channels[..]).await?;
        }
        let state = self.state.clone();
        self.tasks.push(tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(message) = stream.next().await {
                let channel = message.get_channel_name();
                let Some(node_name) = channel.strip_prefix("heartbeat:") else {
                    continue;
                };
                state
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .last_heartbeat
                    .insert(node_name.to_string(), Instant::now());
            }
            log::warn!("heartbeat subscription closed");
        }));
        Ok(())
    }

    fn spawn_health_updater(&mut self) {
        let state = self.state.clone();
        self.tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEALTH_CHECK_PERIOD);
            loop {
                interval.tick().await;
                let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                let updates: Vec<(String, Health)> = state
                    .last_heartbeat
                    .iter()
                    .map(|(name, last)| (name.clone(), classify(last.elapsed())))
                    .collect();
                for (node_name, health) in updates {
                    let previous = state.health.insert(node_name.clone(), health);
                    if previous != Some(health) {
                        match health {
                            Health::NoResponse => {
                                log::warn!("node '{node_name}' is not responding")
                            }
                            _ => log::info!("node '{node_name}' is {health}"),
                        }
                    }
                }
            }
        }));
    }

    /// Block until a peer-stop request arrives, every child has exited, or
    /// the manager itself is interrupted.
    pub async fn wait(&mut self, mut shutdown_rx: watch::Receiver<()>) -> Result<(), ManagerError> {
        let client = redis::Client::open(self.config.redis_url.as_str())?;
        let mut pubsub = client.get_async_pubsub().await?;
        let channels: Vec<String> = self.children.keys().map(|n| shutdown_channel(n)).collect();
        if !channels.is_empty() {
            pubsub.subscribe(&channels[..]).await?;
        }

        let result = {
            let mut stream = pubsub.on_message();
            let mut poll = tokio::time::interval(HEALTH_CHECK_PERIOD);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        log::info!("{}: interrupted, shutting down", self.id);
                        break Ok(());
                    }
                    message = stream.next() => {
                        let Some(message) = message else {
                            break Err(ManagerError::Disconnected);
                        };
                        if message.get_payload_bytes() != SHUTDOWN_PAYLOAD {
                            continue;
                        }
                        let node_name = message
                            .get_channel_name()
                            .strip_prefix("shutdown:")
                            .unwrap_or("<unknown>")
                            .to_string();
                        log::info!("received shutdown signal for node '{node_name}'");
                        break Ok(());
                    }
                    _ = poll.tick() => {
                        if self.poll_children() {
                            log::info!("all nodes have exited");
                            break Ok(());
                        }
                    }
                }
            }
        };

        if !channels.is_empty() {
            if let Err(e) = pubsub.unsubscribe(&channels[..]).await {
                log::warn!("{}: unsubscribe failed: {e}", self.id);
            }
        }
        result
    }

    /// True when every child has exited. Only observes the processes: a
    /// crashed node keeps its heartbeat-derived health (`NoResponse` after
    /// the liveness window) until teardown marks it `Stopped`.
    fn poll_children(&mut self) -> bool {
        let mut all_exited = true;
        for child in self.children.values_mut() {
            if !child.has_exited() {
                all_exited = false;
            }
        }
        all_exited
    }

    /// Terminate children and cancel background tasks. Safe to call on every
    /// exit path, including after a failed enter.
    pub async fn exit(&mut self) {
        self.terminate_children().await;
        for task in self.tasks.drain(..) {
            task.abort();
            let _ = task.await;
        }
    }

    async fn terminate_children(&mut self) {
        for (node_name, child) in self.children.iter_mut() {
            child.stop(CHILD_STOP_TIMEOUT).await;
            self.state
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .health
                .insert(node_name.clone(), Health::Stopped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_uses_the_liveness_window() {
        assert_eq!(classify(Duration::from_secs(0)), Health::Running);
        assert_eq!(classify(Duration::from_secs(10)), Health::Running);
        assert_eq!(classify(Duration::from_secs(11)), Health::NoResponse);
    }

    #[test]
    fn duplicate_names_are_detected() {
        let config = DataflowConfig::from_toml(
            r#"
redis_url = "redis://localhost:6379/0"

[[nodes]]
node_name = "tick"
node_class = "tick"

[[nodes]]
node_name = "tick"
node_class = "tick"
"#,
        )
        .unwrap();
        assert_eq!(duplicate_node_name(&config.nodes), Some("tick".to_string()));
    }

    #[test]
    fn unique_names_pass() {
        let config = DataflowConfig::from_toml(
            r#"
redis_url = "redis://localhost:6379/0"

[[nodes]]
node_name = "a"
node_class = "tick"

[[nodes]]
node_name = "b"
node_class = "tick"
"#,
        )
        .unwrap();
        assert_eq!(duplicate_node_name(&config.nodes), None);
    }

    #[tokio::test]
    async fn manager_ids_are_unique() {
        let config =
            DataflowConfig::from_toml("redis_url = \"redis://localhost:6379/0\"\nnodes = []\n")
                .unwrap();
        let a = NodeManager::new(PathBuf::from("a.toml"), config.clone());
        let b = NodeManager::new(PathBuf::from("b.toml"), config);
        assert_ne!(a.id(), b.id());
        assert!(a.id().starts_with("manager-"));
    }
}
