//! Wire schemas for weft dataflows.
//!
//! Every message on the bus is a JSON envelope `{"data": {"data_type": "<tag>", ...}}`
//! carrying exactly one tagged record. Record types implement [`Record`] and are
//! registered under their tag (see [`registry`]), which is how a channel's expected
//! payload can be resolved from a configuration string at runtime.

use std::any::Any;
use std::fmt;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

pub mod commons;
pub mod jsonl;
pub mod registry;

pub use commons::{AnyData, Audio, DataEntry, Float, Image, RestRequest, RestResponse, Text, Tick, Zero};
pub use registry::{RecordCodec, RecordRegistration};

// Re-export for the `register_record!` macro so downstream crates don't need
// their own inventory dependency.
pub use inventory;

/// Errors produced by the codec and the data-model registry.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The requested tag has never been registered.
    #[error("data model '{0}' is not registered")]
    UnknownTag(String),

    /// A payload failed discriminated decoding: bad JSON, missing or
    /// inadmissible `data_type`, missing fields, or unknown fields on a
    /// closed record.
    #[error("schema mismatch: {0}")]
    Mismatch(String),

    /// A record failed to serialize.
    #[error("encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A typed record that can appear as an envelope payload.
///
/// `TAG` is the wire discriminator stamped into the `data_type` field on
/// encode. Use [`register_record!`](crate::register_record) to couple a type
/// to its tag and register it at link time.
pub trait Record:
    Serialize + DeserializeOwned + Clone + PartialEq + fmt::Debug + Send + Sync + 'static
{
    const TAG: &'static str;
}

/// Object-safe runtime form of a [`Record`], used by the event loop where the
/// concrete payload type is only known through the channel's codec.
pub trait AnyRecord: Any + Send + Sync + fmt::Debug {
    /// The wire tag of the underlying record type.
    fn tag(&self) -> &'static str;

    /// The payload as a JSON object with `data_type` stamped in.
    fn encode(&self) -> Result<Value, SchemaError>;

    fn boxed_clone(&self) -> Box<dyn AnyRecord>;

    fn as_any(&self) -> &dyn Any;
}

impl<T: Record> AnyRecord for T {
    fn tag(&self) -> &'static str {
        T::TAG
    }

    fn encode(&self) -> Result<Value, SchemaError> {
        let mut value = serde_json::to_value(self)?;
        match value {
            Value::Object(ref mut fields) => {
                fields.insert("data_type".to_string(), Value::String(T::TAG.to_string()));
                Ok(value)
            }
            _ => Err(SchemaError::Mismatch(format!(
                "record '{}' did not serialize to a JSON object",
                T::TAG
            ))),
        }
    }

    fn boxed_clone(&self) -> Box<dyn AnyRecord> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The uniform wrapper for every on-wire message: `{"data": <record>}`.
///
/// Holds a boxed [`AnyRecord`]; handlers downcast to the concrete type they
/// declared for the channel.
#[derive(Debug)]
pub struct Envelope {
    data: Box<dyn AnyRecord>,
}

impl Envelope {
    pub fn new<T: Record>(record: T) -> Self {
        Self { data: Box::new(record) }
    }

    pub fn from_boxed(data: Box<dyn AnyRecord>) -> Self {
        Self { data }
    }

    /// The wire tag of the payload.
    pub fn tag(&self) -> &str {
        self.data.tag()
    }

    pub fn data(&self) -> &dyn AnyRecord {
        self.data.as_ref()
    }

    pub fn downcast_ref<T: Record>(&self) -> Option<&T> {
        self.data.as_any().downcast_ref()
    }

    /// Full envelope as a JSON value, `{"data": {"data_type": ..., ...}}`.
    pub fn encode(&self) -> Result<Value, SchemaError> {
        let mut envelope = serde_json::Map::new();
        envelope.insert("data".to_string(), self.data.encode()?);
        Ok(Value::Object(envelope))
    }

    pub fn to_json_string(&self) -> Result<String, SchemaError> {
        Ok(self.encode()?.to_string())
    }

    /// Decode a raw payload against the expected codec for a channel.
    ///
    /// Fails with [`SchemaError::Mismatch`] when the payload is not a
    /// well-formed envelope, the discriminator is not the codec's tag, or the
    /// fields don't validate against the record definition.
    pub fn decode(codec: &RecordCodec, payload: &[u8]) -> Result<Self, SchemaError> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| SchemaError::Mismatch(format!("invalid JSON: {e}")))?;
        let Value::Object(mut envelope) = value else {
            return Err(SchemaError::Mismatch("payload is not a JSON object".to_string()));
        };
        let data = envelope
            .remove("data")
            .ok_or_else(|| SchemaError::Mismatch("missing 'data' field".to_string()))?;
        Self::decode_data(codec, data)
    }

    /// Decode the inner `data` object (discriminator plus fields).
    pub fn decode_data(codec: &RecordCodec, data: Value) -> Result<Self, SchemaError> {
        let Value::Object(mut fields) = data else {
            return Err(SchemaError::Mismatch("'data' is not a JSON object".to_string()));
        };
        let tag = match fields.remove("data_type") {
            Some(Value::String(tag)) => tag,
            Some(_) => {
                return Err(SchemaError::Mismatch("'data_type' must be a string".to_string()))
            }
            None => {
                return Err(SchemaError::Mismatch(
                    "missing 'data_type' discriminator".to_string(),
                ))
            }
        };
        if tag != codec.tag() {
            return Err(SchemaError::Mismatch(format!(
                "data_type '{}' is not admissible here (expected '{}')",
                tag,
                codec.tag()
            )));
        }
        codec.decode_fields(Value::Object(fields)).map(Self::from_boxed)
    }
}

impl Clone for Envelope {
    fn clone(&self) -> Self {
        Self { data: self.data.boxed_clone() }
    }
}

impl PartialEq for Envelope {
    fn eq(&self, other: &Self) -> bool {
        self.tag() == other.tag() && self.data.encode().ok() == other.data.encode().ok()
    }
}

/// Typed envelope over a single known record type.
///
/// The event loop works with [`Envelope`]; `Message<T>` is the strongly typed
/// codec used where the payload type is known statically (handlers building
/// outputs, tests, the heartbeat).
#[derive(Debug, Clone, PartialEq)]
pub struct Message<T: Record> {
    pub data: T,
}

impl<T: Record> Message<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }

    pub fn to_json_string(&self) -> Result<String, SchemaError> {
        Envelope::new(self.data.clone()).to_json_string()
    }

    pub fn from_json(payload: &[u8]) -> Result<Self, SchemaError> {
        let envelope = Envelope::decode(&RecordCodec::of::<T>(), payload)?;
        match envelope.downcast_ref::<T>() {
            Some(data) => Ok(Self { data: data.clone() }),
            None => Err(SchemaError::Mismatch(format!(
                "payload did not decode as '{}'",
                T::TAG
            ))),
        }
    }
}

/// Couple a record type to its wire tag and register it at link time.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// #[serde(deny_unknown_fields)]
/// pub struct Celsius { pub degrees: f64 }
/// weft_schemas::register_record!(Celsius, "celsius");
/// ```
#[macro_export]
macro_rules! register_record {
    ($ty:ty, $tag:literal) => {
        impl $crate::Record for $ty {
            const TAG: &'static str = $tag;
        }
        $crate::inventory::submit! {
            $crate::registry::RecordRegistration::of::<$ty>()
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commons::{Float, Tick};

    #[test]
    fn message_stamps_discriminator() {
        let message = Message::new(Tick { tick: 3 });
        let json = message.to_json_string().unwrap();
        assert_eq!(json, r#"{"data":{"data_type":"tick","tick":3}}"#);
    }

    #[test]
    fn message_round_trip() {
        let message = Message::new(Float { value: 0.25 });
        let json = message.to_json_string().unwrap();
        let back = Message::<Float>::from_json(json.as_bytes()).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn decode_rejects_wrong_discriminator() {
        let payload = br#"{"data":{"data_type":"float","value":1.0}}"#;
        let err = Envelope::decode(&RecordCodec::of::<Tick>(), payload).unwrap_err();
        assert!(matches!(err, SchemaError::Mismatch(_)));
        assert!(err.to_string().contains("not admissible"));
    }

    #[test]
    fn decode_rejects_unknown_fields_on_closed_records() {
        let payload = br#"{"data":{"data_type":"tick","tick":1,"extra":true}}"#;
        let err = Envelope::decode(&RecordCodec::of::<Tick>(), payload).unwrap_err();
        assert!(matches!(err, SchemaError::Mismatch(_)));
    }

    #[test]
    fn decode_rejects_missing_discriminator() {
        let payload = br#"{"data":{"tick":1}}"#;
        let err = Envelope::decode(&RecordCodec::of::<Tick>(), payload).unwrap_err();
        assert!(err.to_string().contains("data_type"));
    }

    #[test]
    fn envelope_downcast() {
        let envelope = Envelope::new(Tick { tick: 7 });
        assert_eq!(envelope.tag(), "tick");
        assert_eq!(envelope.downcast_ref::<Tick>(), Some(&Tick { tick: 7 }));
        assert!(envelope.downcast_ref::<Float>().is_none());
    }
}
