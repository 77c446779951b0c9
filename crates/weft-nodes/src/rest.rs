//! REST bridge: consumes `rest_request` envelopes, performs the HTTP call,
//! publishes `rest_response` envelopes.

use serde::Deserialize;
use serde_json::Value;

use weft_node_sdk::{Node, NodeCore, NodeError, Outputs};
use weft_schemas::{registry as data_models, Envelope, RecordCodec, RestRequest, RestResponse};

use crate::parse_args;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RestApiArgs {
    input_channel: String,
    output_channel: String,
    /// Registered record the request's `data` payload must validate against.
    input_type_str: String,
    /// Registered record a successful JSON response body must validate
    /// against before it is forwarded.
    output_type_str: String,
}

pub struct RestApiNode {
    core: NodeCore,
    output_channel: String,
    request_codec: RecordCodec,
    response_codec: RecordCodec,
    client: reqwest::Client,
}

impl RestApiNode {
    pub fn build(node_name: &str, args: Value) -> Result<Box<dyn Node>, NodeError> {
        let args: RestApiArgs = parse_args(node_name, args)?;
        let request_codec = data_models::lookup(&args.input_type_str).ok_or_else(|| {
            NodeError::Configuration(format!(
                "request data model '{}' is not registered",
                args.input_type_str
            ))
        })?;
        let response_codec = data_models::lookup(&args.output_type_str).ok_or_else(|| {
            NodeError::Configuration(format!(
                "response data model '{}' is not registered",
                args.output_type_str
            ))
        })?;
        Ok(Box::new(Self {
            core: NodeCore::new(
                node_name,
                vec![(args.input_channel, "rest_request".to_string())],
                vec![(args.output_channel.clone(), "rest_response".to_string())],
            )?,
            output_channel: args.output_channel,
            request_codec,
            response_codec,
            client: reqwest::Client::new(),
        }))
    }
}

weft_node_sdk::register_node!("rest_api", RestApiNode::build);

/// Shape a broker-bound response from an HTTP result. `data` is populated
/// only for 2xx JSON bodies that validate against the declared record.
fn shape_response(
    status_code: u16,
    is_json: bool,
    body: &[u8],
    response_codec: &RecordCodec,
) -> RestResponse {
    if !(200..300).contains(&status_code) || !is_json {
        return RestResponse { status_code, data: None };
    }
    let body: Value = match serde_json::from_slice(body) {
        Ok(body) => body,
        Err(e) => {
            log::error!("error parsing response body: {e}");
            return RestResponse { status_code, data: None };
        }
    };
    let mut fields = body.clone();
    if let Value::Object(ref mut map) = fields {
        map.remove("data_type");
    }
    match response_codec.decode_fields(fields) {
        Ok(_) => RestResponse { status_code, data: Some(body) },
        Err(e) => {
            log::warn!(
                "response body does not match '{}': {e}",
                response_codec.tag()
            );
            RestResponse { status_code, data: None }
        }
    }
}

#[async_trait::async_trait]
impl Node for RestApiNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    async fn event_handler(
        &mut self,
        channel: &str,
        message: Envelope,
    ) -> Result<Outputs, NodeError> {
        let request = message
            .downcast_ref::<RestRequest>()
            .ok_or_else(|| anyhow::anyhow!("expected a rest_request payload"))?
            .clone();

        if let Some(ref data) = request.data {
            let mut fields = data.clone();
            if let Value::Object(ref mut map) = fields {
                map.remove("data_type");
            }
            self.request_codec.decode_fields(fields).map_err(|e| {
                NodeError::SchemaMismatch {
                    channel: channel.to_string(),
                    reason: format!(
                        "request data does not match '{}': {e}",
                        self.request_codec.tag()
                    ),
                }
            })?;
        }

        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| anyhow::anyhow!("invalid HTTP method '{}': {e}", request.method))?;
        let mut http_request = self.client.request(method, &request.url);
        if request.content_type == "application/json" {
            if let Some(ref data) = request.data {
                http_request = http_request.json(data);
            }
        } else {
            http_request = http_request.header(reqwest::header::CONTENT_TYPE, &request.content_type);
            if let Some(ref data) = request.data {
                http_request = http_request.form(data);
            }
        }

        // Transport failures are transient for this node: log and keep the
        // loop alive.
        let response = match http_request.send().await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("request to '{}' failed: {e}", request.url);
                return Ok(Vec::new());
            }
        };

        let status_code = response.status().as_u16();
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                log::warn!("reading response from '{}' failed: {e}", request.url);
                return Ok(Vec::new());
            }
        };

        let reply = shape_response(status_code, is_json, &body, &self.response_codec);
        Ok(vec![(self.output_channel.clone(), Envelope::new(reply))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weft_schemas::Float;

    #[test]
    fn requires_registered_payload_models() {
        let err = RestApiNode::build(
            "rest_api",
            json!({
                "input_channel": "req",
                "output_channel": "resp",
                "input_type_str": "any",
                "output_type_str": "no-such-model"
            }),
        )
        .unwrap_err();
        assert!(matches!(err, NodeError::Configuration(_)));
    }

    #[test]
    fn declares_rest_envelope_channels() {
        let node = RestApiNode::build(
            "rest_api",
            json!({
                "input_channel": "req",
                "output_channel": "resp",
                "input_type_str": "any",
                "output_type_str": "float"
            }),
        )
        .unwrap();
        assert_eq!(node.core().inputs["req"].tag(), "rest_request");
        assert_eq!(node.core().outputs["resp"].tag(), "rest_response");
    }

    #[test]
    fn successful_json_body_is_forwarded() {
        let codec = RecordCodec::of::<Float>();
        let reply = shape_response(200, true, br#"{"value": 0.5}"#, &codec);
        assert_eq!(reply.status_code, 200);
        assert_eq!(reply.data, Some(json!({"value": 0.5})));
    }

    #[test]
    fn server_error_yields_null_data() {
        let codec = RecordCodec::of::<Float>();
        let reply = shape_response(500, true, br#"{"value": 0.5}"#, &codec);
        assert_eq!(reply.status_code, 500);
        assert_eq!(reply.data, None);
    }

    #[test]
    fn non_json_body_yields_null_data() {
        let codec = RecordCodec::of::<Float>();
        let reply = shape_response(200, false, b"<html></html>", &codec);
        assert_eq!(reply, RestResponse { status_code: 200, data: None });
    }

    #[test]
    fn mismatching_body_yields_null_data() {
        let codec = RecordCodec::of::<Float>();
        let reply = shape_response(200, true, br#"{"other": 1}"#, &codec);
        assert_eq!(reply.data, None);
    }
}
