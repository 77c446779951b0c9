//! Clock source publishing monotonic counters at fixed cadences.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use weft_node_sdk::{Node, NodeContext, NodeCore, NodeError, Outputs};
use weft_schemas::{Envelope, Tick};

use crate::parse_args;

const TICK_CHANNELS: &[(&str, u64)] = &[
    ("tick/millis/10", 10),
    ("tick/millis/20", 20),
    ("tick/millis/33", 33),
    ("tick/millis/50", 50),
    ("tick/millis/100", 100),
    ("tick/secs/1", 1000),
];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TickArgs {}

/// Source node: no inputs, one background ticker per cadence channel. The
/// event loop blocks on the empty subscription until cancellation.
pub struct TickNode {
    core: NodeCore,
}

impl TickNode {
    pub fn build(node_name: &str, args: Value) -> Result<Box<dyn Node>, NodeError> {
        let TickArgs {} = parse_args(node_name, args)?;
        let outputs = TICK_CHANNELS
            .iter()
            .map(|(channel, _)| (channel.to_string(), "tick".to_string()))
            .collect();
        Ok(Box::new(Self {
            core: NodeCore::new(node_name, Vec::new(), outputs)?,
        }))
    }
}

weft_node_sdk::register_node!("tick", TickNode::build);

#[async_trait::async_trait]
impl Node for TickNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    async fn enter(&mut self, ctx: &NodeContext) -> Result<(), NodeError> {
        for (channel, period_ms) in TICK_CHANNELS {
            let channel = channel.to_string();
            let mut publisher = ctx.publisher();
            let node_name = ctx.node_name().to_string();
            let period = Duration::from_millis(*period_ms);
            ctx.spawn(async move {
                let mut interval = tokio::time::interval(period);
                let mut tick = 0u64;
                loop {
                    interval.tick().await;
                    let message = Envelope::new(Tick { tick });
                    tick += 1;
                    if let Err(e) = publisher.publish(&channel, &message).await {
                        log::warn!("{node_name}: tick publish on '{channel}' failed: {e}");
                    }
                }
            });
        }
        Ok(())
    }

    async fn event_handler(
        &mut self,
        channel: &str,
        _message: Envelope,
    ) -> Result<Outputs, NodeError> {
        Err(NodeError::Handler(anyhow::anyhow!(
            "tick node declares no inputs but received a message on '{channel}'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn declares_all_cadence_channels() {
        let node = TickNode::build("tick", json!({})).unwrap();
        assert!(node.core().inputs.is_empty());
        let outputs: Vec<&String> = node.core().outputs.keys().collect();
        assert_eq!(outputs.len(), 6);
        assert!(node.core().outputs.contains_key("tick/secs/1"));
        assert_eq!(node.core().outputs["tick/secs/1"].tag(), "tick");
    }

    #[test]
    fn rejects_unknown_arguments() {
        let err = TickNode::build("tick", json!({"rate": 3})).unwrap_err();
        assert!(matches!(err, NodeError::Configuration(_)));
    }
}
