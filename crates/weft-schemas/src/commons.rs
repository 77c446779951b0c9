//! Built-in record types shared by the reference nodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Envelope, SchemaError};

/// Empty payload, used where only the message's presence matters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Zero {}

crate::register_record!(Zero, "zero");

/// Monotonic counter emitted by the tick node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Tick {
    pub tick: u64,
}

crate::register_record!(Tick, "tick");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Float {
    pub value: f64,
}

crate::register_record!(Float, "float");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Text {
    pub text: String,
}

crate::register_record!(Text, "text");

/// Opaque image buffer, hex-encoded on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Image {
    #[serde(with = "hex_bytes")]
    pub image: Vec<u8>,
}

crate::register_record!(Image, "image");

/// Opaque audio buffer, hex-encoded on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Audio {
    #[serde(with = "hex_bytes")]
    pub audio: Vec<u8>,
}

crate::register_record!(Audio, "audio");

/// Open record accepting arbitrary fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnyData {
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

crate::register_record!(AnyData, "any");

fn default_content_type() -> String {
    "application/json".to_string()
}

/// An HTTP request travelling through the dataflow, consumed by the REST node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RestRequest {
    pub method: String,
    pub url: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub data: Option<Value>,
}

crate::register_record!(RestRequest, "rest_request");

/// The REST node's reply. `data` is populated only for successful responses
/// whose JSON body validates against the node's declared response record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RestResponse {
    pub status_code: u16,
    #[serde(default)]
    pub data: Option<Value>,
}

crate::register_record!(RestResponse, "rest_response");

/// Serde helper: raw bytes in memory, hex string on the wire.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(&text).map_err(serde::de::Error::custom)
    }
}

/// One captured message, as written by the print and record nodes.
#[derive(Debug, Clone)]
pub struct DataEntry {
    pub timestamp: DateTime<Utc>,
    pub channel: String,
    pub data: Envelope,
}

impl DataEntry {
    pub fn new(channel: impl Into<String>, data: Envelope) -> Self {
        Self {
            timestamp: Utc::now(),
            channel: channel.into(),
            data,
        }
    }

    pub fn encode(&self) -> Result<Value, SchemaError> {
        let mut entry = serde_json::Map::new();
        entry.insert(
            "timestamp".to_string(),
            serde_json::to_value(self.timestamp)?,
        );
        entry.insert("channel".to_string(), Value::String(self.channel.clone()));
        entry.insert("data".to_string(), self.data.data().encode()?);
        Ok(Value::Object(entry))
    }

    pub fn to_json_string(&self) -> Result<String, SchemaError> {
        Ok(self.encode()?.to_string())
    }
}
