//! Uniform random source driven by a tick channel.

use serde::Deserialize;
use serde_json::Value;

use weft_node_sdk::{Node, NodeCore, NodeError, Outputs};
use weft_schemas::{Envelope, Float};

use crate::parse_args;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RandomArgs {
    input_channel: String,
    output_channel: String,
}

pub struct RandomNode {
    core: NodeCore,
    output_channel: String,
}

impl RandomNode {
    pub fn build(node_name: &str, args: Value) -> Result<Box<dyn Node>, NodeError> {
        let args: RandomArgs = parse_args(node_name, args)?;
        Ok(Box::new(Self {
            core: NodeCore::new(
                node_name,
                vec![(args.input_channel, "tick".to_string())],
                vec![(args.output_channel.clone(), "float".to_string())],
            )?,
            output_channel: args.output_channel,
        }))
    }
}

weft_node_sdk::register_node!("random", RandomNode::build);

#[async_trait::async_trait]
impl Node for RandomNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    async fn event_handler(
        &mut self,
        _channel: &str,
        _message: Envelope,
    ) -> Result<Outputs, NodeError> {
        Ok(vec![(
            self.output_channel.clone(),
            Envelope::new(Float { value: rand::random::<f64>() }),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weft_schemas::Tick;

    #[tokio::test]
    async fn yields_one_float_in_unit_interval() {
        let mut node = RandomNode::build(
            "random",
            json!({"input_channel": "tick/secs/1", "output_channel": "rand"}),
        )
        .unwrap();
        let outputs = node
            .event_handler("tick/secs/1", Envelope::new(Tick { tick: 0 }))
            .await
            .unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].0, "rand");
        let float = outputs[0].1.downcast_ref::<Float>().unwrap();
        assert!((0.0..1.0).contains(&float.value));
    }

    #[test]
    fn requires_both_channels() {
        let err = RandomNode::build("random", json!({"input_channel": "a"})).unwrap_err();
        assert!(matches!(err, NodeError::Configuration(_)));
    }
}
