//! Tick-driven REST client: emits a configured `rest_request` on every tick
//! and logs the responses coming back.

use serde::Deserialize;
use serde_json::Value;

use weft_node_sdk::{Node, NodeCore, NodeError, Outputs};
use weft_schemas::{Envelope, RestRequest, RestResponse};

use crate::parse_args;

fn default_method() -> String {
    "POST".to_string()
}

fn default_content_type() -> String {
    "application/json".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ApiClientArgs {
    input_tick_channel: String,
    input_response_channel: String,
    output_channel: String,
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default = "default_content_type")]
    content_type: String,
    #[serde(default)]
    data: Option<Value>,
}

pub struct ApiClientNode {
    core: NodeCore,
    input_response_channel: String,
    output_channel: String,
    request: RestRequest,
}

impl ApiClientNode {
    pub fn build(node_name: &str, args: Value) -> Result<Box<dyn Node>, NodeError> {
        let args: ApiClientArgs = parse_args(node_name, args)?;
        Ok(Box::new(Self {
            core: NodeCore::new(
                node_name,
                vec![
                    (args.input_tick_channel, "tick".to_string()),
                    (args.input_response_channel.clone(), "rest_response".to_string()),
                ],
                vec![(args.output_channel.clone(), "rest_request".to_string())],
            )?,
            input_response_channel: args.input_response_channel,
            output_channel: args.output_channel,
            request: RestRequest {
                method: args.method,
                url: args.url,
                content_type: args.content_type,
                data: args.data,
            },
        }))
    }
}

weft_node_sdk::register_node!("api_client", ApiClientNode::build);

#[async_trait::async_trait]
impl Node for ApiClientNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    async fn event_handler(
        &mut self,
        channel: &str,
        message: Envelope,
    ) -> Result<Outputs, NodeError> {
        if channel == self.input_response_channel {
            let response = message
                .downcast_ref::<RestResponse>()
                .ok_or_else(|| anyhow::anyhow!("expected a rest_response payload"))?;
            log::info!(
                "{}: received response: status={} data={:?}",
                self.core.name,
                response.status_code,
                response.data
            );
            Ok(Vec::new())
        } else {
            Ok(vec![(
                self.output_channel.clone(),
                Envelope::new(self.request.clone()),
            )])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weft_schemas::Tick;

    fn build() -> Box<dyn Node> {
        ApiClientNode::build(
            "api_client",
            json!({
                "input_tick_channel": "tick/secs/1",
                "input_response_channel": "resp",
                "output_channel": "req",
                "url": "http://localhost:8000/echo",
                "data": {"username": "test"}
            }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn tick_yields_a_request() {
        let mut node = build();
        let outputs = node
            .event_handler("tick/secs/1", Envelope::new(Tick { tick: 1 }))
            .await
            .unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].0, "req");
        let request = outputs[0].1.downcast_ref::<RestRequest>().unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.url, "http://localhost:8000/echo");
        assert_eq!(request.data, Some(json!({"username": "test"})));
    }

    #[tokio::test]
    async fn response_yields_nothing() {
        let mut node = build();
        let outputs = node
            .event_handler(
                "resp",
                Envelope::new(RestResponse { status_code: 200, data: None }),
            )
            .await
            .unwrap();
        assert!(outputs.is_empty());
    }
}
