//! Process-wide data-model registry: wire tag → record codec.
//!
//! The table is seeded from [`inventory`] submissions (one per
//! `register_record!` invocation linked into the binary) on first access and
//! stays append-only afterwards. Re-registering a tag replaces the previous
//! mapping and logs a warning.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use serde_json::Value;

use crate::{AnyRecord, Envelope, Record, SchemaError};

type DecodeFn = fn(Value) -> Result<Box<dyn AnyRecord>, SchemaError>;

/// Decoder for one registered record type.
#[derive(Clone)]
pub struct RecordCodec {
    tag: Arc<str>,
    decode_fields: DecodeFn,
}

impl RecordCodec {
    pub fn of<T: Record>() -> Self {
        Self {
            tag: Arc::from(T::TAG),
            decode_fields: decode_fields::<T>,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Strictly decode a JSON object of payload fields (no `data_type`).
    pub fn decode_fields(&self, fields: Value) -> Result<Box<dyn AnyRecord>, SchemaError> {
        (self.decode_fields)(fields)
    }
}

impl std::fmt::Debug for RecordCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCodec").field("tag", &self.tag).finish()
    }
}

fn decode_fields<T: Record>(fields: Value) -> Result<Box<dyn AnyRecord>, SchemaError> {
    serde_json::from_value::<T>(fields)
        .map(|record| Box::new(record) as Box<dyn AnyRecord>)
        .map_err(|e| SchemaError::Mismatch(e.to_string()))
}

/// Link-time registration entry submitted by `register_record!`.
pub struct RecordRegistration {
    tag: &'static str,
    decode_fields: DecodeFn,
}

impl RecordRegistration {
    pub const fn of<T: Record>() -> Self {
        Self {
            tag: T::TAG,
            decode_fields: decode_fields::<T>,
        }
    }

    fn codec(&self) -> RecordCodec {
        RecordCodec {
            tag: Arc::from(self.tag),
            decode_fields: self.decode_fields,
        }
    }
}

inventory::collect!(RecordRegistration);

static REGISTRY: OnceLock<RwLock<HashMap<String, RecordCodec>>> = OnceLock::new();

fn table() -> &'static RwLock<HashMap<String, RecordCodec>> {
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        for registration in inventory::iter::<RecordRegistration> {
            if map
                .insert(registration.tag.to_string(), registration.codec())
                .is_some()
            {
                log::warn!(
                    "data model '{}' already exists, replacing it",
                    registration.tag
                );
            }
        }
        RwLock::new(map)
    })
}

/// Register a record type under its tag, replacing (and warning about) any
/// previous registration.
pub fn register<T: Record>() {
    let mut map = table().write().unwrap_or_else(|e| e.into_inner());
    if map.insert(T::TAG.to_string(), RecordCodec::of::<T>()).is_some() {
        log::warn!("data model '{}' already exists, replacing it", T::TAG);
    }
}

/// Resolve the codec registered for `tag`.
pub fn lookup(tag: &str) -> Option<RecordCodec> {
    table()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(tag)
        .cloned()
}

pub fn is_registered(tag: &str) -> bool {
    table()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .contains_key(tag)
}

/// Construct an instance of the registered type from a JSON object of fields.
pub fn make(tag: &str, mut fields: Value) -> Result<Envelope, SchemaError> {
    let codec = lookup(tag).ok_or_else(|| SchemaError::UnknownTag(tag.to_string()))?;
    if let Value::Object(ref mut map) = fields {
        map.remove("data_type");
    }
    codec.decode_fields(fields).map(Envelope::from_boxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commons::Tick;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[test]
    fn make_builds_registered_record() {
        let envelope = make("tick", json!({"tick": 42})).unwrap();
        assert_eq!(envelope.downcast_ref::<Tick>(), Some(&Tick { tick: 42 }));
    }

    #[test]
    fn make_unknown_tag_fails() {
        let err = make("no-such-tag", json!({})).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownTag(_)));
    }

    #[test]
    fn make_rejects_bad_fields() {
        let err = make("tick", json!({"tick": "not-a-number"})).unwrap_err();
        assert!(matches!(err, SchemaError::Mismatch(_)));
    }

    #[test]
    fn builtins_are_seeded_from_inventory() {
        for tag in ["zero", "tick", "float", "text", "image", "audio", "any"] {
            assert!(is_registered(tag), "expected '{tag}' to be registered");
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct FirstShape {
        n: u64,
    }

    impl Record for FirstShape {
        const TAG: &'static str = "registry-test-dup";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct SecondShape {
        s: String,
    }

    impl Record for SecondShape {
        const TAG: &'static str = "registry-test-dup";
    }

    #[test]
    fn re_registration_replaces_prior_mapping() {
        register::<FirstShape>();
        let envelope = make("registry-test-dup", json!({"n": 1})).unwrap();
        assert!(envelope.downcast_ref::<FirstShape>().is_some());

        register::<SecondShape>();
        let envelope = make("registry-test-dup", json!({"s": "x"})).unwrap();
        assert!(envelope.downcast_ref::<SecondShape>().is_some());
        assert!(make("registry-test-dup", json!({"n": 1})).is_err());
    }
}
