use std::future::Future;
use std::sync::Mutex;

use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use weft_schemas::Envelope;

use crate::error::NodeError;

/// A cloneable handle for publishing directly to the broker, bypassing the
/// event loop's output path. Used by source nodes publishing from background
/// tasks and for the peer-stop convention.
#[derive(Clone)]
pub struct Publisher {
    conn: MultiplexedConnection,
}

impl Publisher {
    pub(crate) fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    pub async fn publish(&mut self, channel: &str, envelope: &Envelope) -> Result<(), NodeError> {
        let payload = envelope.to_json_string()?;
        let _receivers: i64 = self.conn.publish(channel, payload).await?;
        Ok(())
    }

    /// Publish an arbitrary byte payload, e.g. the literal `shutdown`
    /// peer-stop request.
    pub async fn publish_raw(&mut self, channel: &str, payload: &[u8]) -> Result<(), NodeError> {
        let _receivers: i64 = self.conn.publish(channel, payload).await?;
        Ok(())
    }
}

/// Context handed to a node at enter.
///
/// Background tasks spawned through the context are cancelled and awaited by
/// the runtime at teardown, on every exit path.
pub struct NodeContext {
    node_name: String,
    publisher: Publisher,
    shutdown_rx: watch::Receiver<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl NodeContext {
    pub(crate) fn new(
        node_name: String,
        publisher: Publisher,
        shutdown_rx: watch::Receiver<()>,
    ) -> Self {
        Self {
            node_name,
            publisher,
            shutdown_rx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// A fresh publishing handle sharing the node's broker connection.
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    /// Receiver that fires when the node is asked to stop; `select!` on it
    /// in long-running background tasks.
    pub fn shutdown_rx(&self) -> watch::Receiver<()> {
        self.shutdown_rx.clone()
    }

    /// Spawn a background task owned by the node's lifecycle.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }

    /// Cancel all tracked tasks and await them, swallowing cancellation.
    pub(crate) async fn shutdown_tasks(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for handle in handles {
            handle.abort();
            let _ = handle.await;
        }
    }
}
