//! Node whose handler always fails; demonstrates crash isolation.

use serde::Deserialize;
use serde_json::Value;

use weft_node_sdk::{Node, NodeCore, NodeError, Outputs};
use weft_schemas::Envelope;

use crate::parse_args;

fn default_input_type() -> String {
    "text".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExceptionArgs {
    input_channel: String,
    #[serde(default = "default_input_type")]
    input_type_str: String,
}

pub struct ExceptionNode {
    core: NodeCore,
}

impl ExceptionNode {
    pub fn build(node_name: &str, args: Value) -> Result<Box<dyn Node>, NodeError> {
        let args: ExceptionArgs = parse_args(node_name, args)?;
        Ok(Box::new(Self {
            core: NodeCore::new(
                node_name,
                vec![(args.input_channel, args.input_type_str)],
                Vec::new(),
            )?,
        }))
    }
}

weft_node_sdk::register_node!("exception", ExceptionNode::build);

#[async_trait::async_trait]
impl Node for ExceptionNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    async fn event_handler(
        &mut self,
        _channel: &str,
        _message: Envelope,
    ) -> Result<Outputs, NodeError> {
        Err(NodeError::Handler(anyhow::anyhow!(
            "this is an exception from the node"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weft_schemas::Tick;

    #[tokio::test]
    async fn handler_always_fails() {
        let mut node = ExceptionNode::build(
            "exception_node",
            json!({"input_channel": "tick/secs/1", "input_type_str": "tick"}),
        )
        .unwrap();
        let err = node
            .event_handler("tick/secs/1", Envelope::new(Tick { tick: 0 }))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Handler(_)));
    }
}
