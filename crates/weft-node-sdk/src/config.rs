//! Dataflow configuration: the TOML document describing one graph.

use std::path::Path;

use serde::Deserialize;

use crate::error::NodeError;

/// Root dataflow document.
///
/// ```toml
/// redis_url = "redis://localhost:6379/0"
/// extra_modules = []
///
/// [[nodes]]
/// node_name = "tick"
/// node_class = "tick"
///
/// [[nodes]]
/// node_name = "print"
/// node_class = "print"
/// [nodes.node_args.print_channel_types]
/// "tick/secs/1" = "tick"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct DataflowConfig {
    /// Broker URL shared by every node in the graph.
    pub redis_url: String,

    /// Names of modules carrying extra `register_record!`/`register_node!`
    /// side effects. Registrations resolve at link time in this runtime; the
    /// field is kept for configuration compatibility and diagnostics.
    #[serde(default)]
    pub extra_modules: Vec<String>,

    pub nodes: Vec<NodeSpec>,
}

/// One node entry: a unique name, a registered class, and open keyword
/// arguments handed to the class constructor.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSpec {
    pub node_name: String,
    pub node_class: String,
    #[serde(default)]
    pub node_args: toml::Table,
}

impl DataflowConfig {
    pub fn from_file(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            NodeError::Configuration(format!(
                "failed to read dataflow file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, NodeError> {
        toml::from_str(content)
            .map_err(|e| NodeError::Configuration(format!("failed to parse dataflow file: {e}")))
    }

    pub fn node(&self, node_name: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.node_name == node_name)
    }

    /// Acknowledge `extra_modules`. Dynamic imports don't exist here; a
    /// module's registrations are live iff it was linked into the binary.
    pub fn load_extra_modules(&self) {
        for module in &self.extra_modules {
            log::info!(
                "extra module '{module}': registrations are resolved at link time, \
                 make sure it is compiled into this binary"
            );
        }
    }
}

impl NodeSpec {
    /// The `node_args` table as JSON, the shape node constructors take.
    pub fn args_json(&self) -> Result<serde_json::Value, NodeError> {
        serde_json::to_value(&self.node_args).map_err(|e| {
            NodeError::Configuration(format!(
                "invalid node_args for '{}': {e}",
                self.node_name
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK_PRINT: &str = r#"
redis_url = "redis://localhost:6379/0"

[[nodes]]
node_name = "tick"
node_class = "tick"

[[nodes]]
node_name = "print"
node_class = "print"

[nodes.node_args.print_channel_types]
"tick/secs/1" = "tick"
"#;

    #[test]
    fn parses_a_dataflow() {
        let config = DataflowConfig::from_toml(TICK_PRINT).unwrap();
        assert_eq!(config.redis_url, "redis://localhost:6379/0");
        assert!(config.extra_modules.is_empty());
        assert_eq!(config.nodes.len(), 2);

        let print = config.node("print").unwrap();
        assert_eq!(print.node_class, "print");
        let args = print.args_json().unwrap();
        assert_eq!(args["print_channel_types"]["tick/secs/1"], "tick");
    }

    #[test]
    fn missing_redis_url_is_rejected() {
        let err = DataflowConfig::from_toml("[[nodes]]\nnode_name = \"a\"\nnode_class = \"tick\"\n")
            .unwrap_err();
        assert!(matches!(err, NodeError::Configuration(_)));
        assert!(err.to_string().contains("redis_url"));
    }

    #[test]
    fn malformed_node_spec_is_rejected() {
        let toml = r#"
redis_url = "redis://localhost:6379/0"

[[nodes]]
node_name = "missing-class"
"#;
        assert!(DataflowConfig::from_toml(toml).is_err());
    }

    #[test]
    fn node_args_default_to_empty() {
        let toml = r#"
redis_url = "redis://localhost:6379/0"

[[nodes]]
node_name = "tick"
node_class = "tick"
"#;
        let config = DataflowConfig::from_toml(toml).unwrap();
        assert!(config.nodes[0].node_args.is_empty());
    }
}
