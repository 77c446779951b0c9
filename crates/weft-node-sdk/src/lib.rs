//! Runtime for writing weft nodes.
//!
//! A node is an actor with typed input and output channels on a shared Redis
//! pub/sub bus. This crate owns everything around the user's handler: broker
//! session, atomic subscription, strict per-channel decoding, publish path,
//! heartbeat, cooperative shutdown, and guaranteed teardown. Node authors
//! implement [`Node`] and the child-process runner calls [`run_node`].
//!
//! # Example
//!
//! ```ignore
//! use weft_node_sdk::{Node, NodeContext, NodeCore, NodeError, Outputs};
//! use weft_schemas::{Envelope, Float, Tick};
//!
//! struct Doubler {
//!     core: NodeCore,
//!     output_channel: String,
//! }
//!
//! #[async_trait::async_trait]
//! impl Node for Doubler {
//!     fn core(&self) -> &NodeCore { &self.core }
//!
//!     async fn event_handler(&mut self, _channel: &str, message: Envelope)
//!         -> Result<Outputs, NodeError>
//!     {
//!         let tick = message.downcast_ref::<Tick>().map_or(0, |t| t.tick);
//!         Ok(vec![(
//!             self.output_channel.clone(),
//!             Envelope::new(Float { value: tick as f64 * 2.0 }),
//!         )])
//!     }
//! }
//! ```

use futures::StreamExt;
use indexmap::IndexMap;
use tokio::sync::watch;

use weft_schemas::{registry as data_models, Envelope, RecordCodec};

pub mod broker;
pub mod config;
mod context;
mod error;
mod heartbeat;
pub mod registry;
pub mod shutdown;

pub use config::{DataflowConfig, NodeSpec};
pub use context::{NodeContext, Publisher};
pub use error::NodeError;
pub use heartbeat::HEARTBEAT_PERIOD;
pub use registry::NodeRegistration;

// Re-exports for convenience (so node crates don't need these deps directly).
pub use anyhow;
pub use async_trait;
pub use inventory;
pub use log;
pub use tokio;

/// Liveness channel for one node: `heartbeat:<node_name>`.
pub fn heartbeat_channel(node_name: &str) -> String {
    format!("heartbeat:{node_name}")
}

/// Peer-stop channel for one node: `shutdown:<node_name>`.
pub fn shutdown_channel(node_name: &str) -> String {
    format!("shutdown:{node_name}")
}

/// Literal payload on a shutdown channel that the manager acts on.
pub const SHUTDOWN_PAYLOAD: &[u8] = b"shutdown";

/// Output of one handler invocation, published in order.
pub type Outputs = Vec<(String, Envelope)>;

/// Identity and channel declarations shared by every node implementation.
///
/// Channel maps are ordered and resolved against the data-model registry at
/// construction; an unregistered tag is a [`NodeError::Configuration`].
#[derive(Debug, Clone)]
pub struct NodeCore {
    pub name: String,
    pub inputs: IndexMap<String, RecordCodec>,
    pub outputs: IndexMap<String, RecordCodec>,
}

impl NodeCore {
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<(String, String)>,
        outputs: Vec<(String, String)>,
    ) -> Result<Self, NodeError> {
        Ok(Self {
            name: name.into(),
            inputs: resolve_channels(inputs)?,
            outputs: resolve_channels(outputs)?,
        })
    }
}

fn resolve_channels(
    pairs: Vec<(String, String)>,
) -> Result<IndexMap<String, RecordCodec>, NodeError> {
    let mut channels = IndexMap::new();
    for (channel, tag) in pairs {
        let codec = data_models::lookup(&tag).ok_or_else(|| {
            NodeError::Configuration(format!(
                "channel '{channel}' declares unregistered data model '{tag}'"
            ))
        })?;
        channels.insert(channel, codec);
    }
    Ok(channels)
}

/// A dataflow node.
///
/// Implementations hold a [`NodeCore`] and a handler; `enter`/`exit` are the
/// extension points for extra resources (files, devices, HTTP clients,
/// background tasks via [`NodeContext::spawn`]). Both must stay cheap to
/// cancel: the runtime guarantees `exit` and task cancellation on every exit
/// path, including errors.
#[async_trait::async_trait]
pub trait Node: Send + 'static {
    fn core(&self) -> &NodeCore;

    /// Handle one decoded inbound envelope; returned pairs are published in
    /// order. Return [`NodeError::ExitSignal`] for a programmed self-stop.
    async fn event_handler(
        &mut self,
        channel: &str,
        message: Envelope,
    ) -> Result<Outputs, NodeError>;

    /// Acquire extra resources after the broker session is up.
    async fn enter(&mut self, _ctx: &NodeContext) -> Result<(), NodeError> {
        Ok(())
    }

    /// Release extra resources. Runs after background tasks are cancelled.
    async fn exit(&mut self) -> Result<(), NodeError> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").field("name", &self.core().name).finish()
    }
}

/// Register a node class under a string name, resolvable from configuration.
///
/// ```ignore
/// weft_node_sdk::register_node!("random", RandomNode::build);
/// ```
#[macro_export]
macro_rules! register_node {
    ($name:literal, $build:expr) => {
        $crate::inventory::submit! {
            $crate::registry::NodeRegistration::new($name, $build)
        }
    };
}

/// Drive one node against the broker until cancellation, a graceful exit
/// signal, or a fatal error.
///
/// Lifecycle: connect + ping, one atomic SUBSCRIBE over all declared inputs,
/// heartbeat task, `enter`, event loop, then teardown (cancel tasks, `exit`,
/// UNSUBSCRIBE, drop connections) on every path.
pub async fn run_node(
    mut node: Box<dyn Node>,
    redis_url: &str,
    shutdown_rx: watch::Receiver<()>,
) -> Result<(), NodeError> {
    let node_name = node.core().name.clone();
    log::info!("{node_name}: connecting to broker at {redis_url}");
    let (client, conn) = broker::connect(redis_url).await?;
    let mut pubsub = client
        .get_async_pubsub()
        .await
        .map_err(|source| NodeError::BrokerUnavailable {
            url: redis_url.to_string(),
            source,
        })?;

    let channels: Vec<String> = node.core().inputs.keys().cloned().collect();
    if !channels.is_empty() {
        pubsub.subscribe(&channels[..]).await?;
        log::info!("{node_name}: subscribed to {channels:?}");
    }

    let publisher = Publisher::new(conn);
    let ctx = NodeContext::new(node_name.clone(), publisher.clone(), shutdown_rx.clone());
    heartbeat::spawn_heartbeat(&ctx);

    let result = match node.enter(&ctx).await {
        Ok(()) => event_loop(node.as_mut(), &mut pubsub, publisher, shutdown_rx).await,
        Err(e) => Err(e),
    };

    ctx.shutdown_tasks().await;
    let exit_result = node.exit().await;
    if !channels.is_empty() {
        if let Err(e) = pubsub.unsubscribe(&channels[..]).await {
            log::warn!("{node_name}: unsubscribe failed: {e}");
        }
    }
    drop(pubsub);

    match &result {
        Ok(()) => log::info!("{node_name}: node shut down"),
        Err(e) => log::error!("{node_name}: {e}"),
    }
    result.and(exit_result)
}

async fn event_loop(
    node: &mut dyn Node,
    pubsub: &mut redis::aio::PubSub,
    mut publisher: Publisher,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<(), NodeError> {
    let node_name = node.core().name.clone();
    let mut stream = pubsub.on_message();
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                log::info!("{node_name}: cancellation received, exiting event loop");
                return Ok(());
            }
            message = stream.next() => {
                let Some(message) = message else {
                    return Err(NodeError::BrokerDisconnected);
                };
                let channel = message.get_channel_name().to_string();
                let Some(codec) = node.core().inputs.get(&channel).cloned() else {
                    log::debug!("{node_name}: ignoring message on undeclared channel '{channel}'");
                    continue;
                };
                let envelope = Envelope::decode(&codec, message.get_payload_bytes())
                    .map_err(|e| NodeError::SchemaMismatch {
                        channel: channel.clone(),
                        reason: e.to_string(),
                    })?;
                match node.event_handler(&channel, envelope).await {
                    Ok(outputs) => {
                        for (output_channel, output) in outputs {
                            publisher.publish(&output_channel, &output).await?;
                        }
                    }
                    Err(NodeError::ExitSignal) => {
                        log::info!("{node_name}: handler requested graceful exit");
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use weft_schemas::{Float, Tick};

    struct EchoNode {
        core: NodeCore,
    }

    #[async_trait::async_trait]
    impl Node for EchoNode {
        fn core(&self) -> &NodeCore {
            &self.core
        }

        async fn event_handler(
            &mut self,
            _channel: &str,
            message: Envelope,
        ) -> Result<Outputs, NodeError> {
            let tick = message
                .downcast_ref::<Tick>()
                .map_or(0, |t| t.tick);
            Ok(vec![("out".to_string(), Envelope::new(Float { value: tick as f64 }))])
        }
    }

    fn echo_build(node_name: &str, _args: Value) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(EchoNode {
            core: NodeCore::new(
                node_name,
                vec![("in".to_string(), "tick".to_string())],
                vec![("out".to_string(), "float".to_string())],
            )?,
        }))
    }

    #[test]
    fn node_core_resolves_registered_tags_in_order() {
        let core = NodeCore::new(
            "n",
            vec![
                ("b".to_string(), "tick".to_string()),
                ("a".to_string(), "float".to_string()),
            ],
            vec![],
        )
        .unwrap();
        let declared: Vec<&String> = core.inputs.keys().collect();
        assert_eq!(declared, ["b", "a"]);
        assert_eq!(core.inputs["b"].tag(), "tick");
    }

    #[test]
    fn node_core_rejects_unregistered_tags() {
        let err = NodeCore::new(
            "n",
            vec![("in".to_string(), "no-such-model".to_string())],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, NodeError::Configuration(_)));
    }

    #[tokio::test]
    async fn handler_outputs_preserve_yield_order() {
        let mut node = echo_build("echo", Value::Null).unwrap();
        let outputs = node
            .event_handler("in", Envelope::new(Tick { tick: 5 }))
            .await
            .unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].0, "out");
        assert_eq!(
            outputs[0].1.downcast_ref::<Float>(),
            Some(&Float { value: 5.0 })
        );
    }

    #[test]
    fn runtime_registration_resolves_and_overwrites() {
        registry::register("sdk-test-echo", echo_build);
        assert!(registry::is_registered("sdk-test-echo"));
        let node = registry::make("sdk-test-echo", "my-echo", Value::Null).unwrap();
        assert_eq!(node.core().name, "my-echo");

        fn rejecting_build(_: &str, _: Value) -> Result<Box<dyn Node>, NodeError> {
            Err(NodeError::Configuration("always fails".to_string()))
        }
        registry::register("sdk-test-echo", rejecting_build);
        assert!(registry::make("sdk-test-echo", "x", Value::Null).is_err());
    }

    #[test]
    fn unknown_class_is_a_configuration_error() {
        let err = registry::make("sdk-test-missing", "x", Value::Null).unwrap_err();
        assert!(matches!(err, NodeError::Configuration(_)));
    }

    #[test]
    fn control_channel_names() {
        assert_eq!(heartbeat_channel("tick"), "heartbeat:tick");
        assert_eq!(shutdown_channel("special_print"), "shutdown:special_print");
        assert_eq!(SHUTDOWN_PAYLOAD, b"shutdown");
    }
}
