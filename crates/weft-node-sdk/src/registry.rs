//! Process-wide node registry: class name → constructor.
//!
//! Seeded from [`inventory`] submissions (one per `register_node!` invocation
//! linked into the binary); duplicate class names warn and overwrite, both at
//! seeding and on runtime registration.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use serde_json::Value;

use crate::error::NodeError;
use crate::Node;

/// Constructor resolved from configuration: `(node_name, node_args)` to a
/// fully constructed but not-yet-entered node. Must perform no I/O.
pub type BuildFn = fn(&str, Value) -> Result<Box<dyn Node>, NodeError>;

/// Link-time registration entry submitted by `register_node!`.
pub struct NodeRegistration {
    name: &'static str,
    build: BuildFn,
}

impl NodeRegistration {
    pub const fn new(name: &'static str, build: BuildFn) -> Self {
        Self { name, build }
    }
}

inventory::collect!(NodeRegistration);

static REGISTRY: OnceLock<RwLock<HashMap<String, BuildFn>>> = OnceLock::new();

fn table() -> &'static RwLock<HashMap<String, BuildFn>> {
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        for registration in inventory::iter::<NodeRegistration> {
            if map
                .insert(registration.name.to_string(), registration.build)
                .is_some()
            {
                log::warn!(
                    "node class '{}' already exists, replacing it",
                    registration.name
                );
            }
        }
        RwLock::new(map)
    })
}

/// Register a node constructor, replacing (and warning about) any previous
/// registration under the same class name.
pub fn register(name: &str, build: BuildFn) {
    let mut map = table().write().unwrap_or_else(|e| e.into_inner());
    if map.insert(name.to_string(), build).is_some() {
        log::warn!("node class '{name}' already exists, replacing it");
    }
}

/// Construct a node by class name. The node is not entered; all I/O is
/// deferred to the runtime.
pub fn make(class: &str, node_name: &str, args: Value) -> Result<Box<dyn Node>, NodeError> {
    let build = table()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(class)
        .copied()
        .ok_or_else(|| {
            NodeError::Configuration(format!("node class '{class}' not found in registry"))
        })?;
    build(node_name, args)
}

pub fn is_registered(class: &str) -> bool {
    table()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .contains_key(class)
}

/// All currently registered class names, sorted.
pub fn registered_classes() -> Vec<String> {
    let mut classes: Vec<String> = table()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .keys()
        .cloned()
        .collect();
    classes.sort();
    classes
}
