//! Child-process entry point: resolve one named node from the dataflow file
//! and drive its event loop until cancellation.

use std::path::Path;

use tokio::sync::watch;

use weft_node_sdk::{registry, DataflowConfig, NodeError};

pub async fn run_node_command(
    dataflow_toml: &Path,
    node_name: &str,
    redis_url: &str,
    shutdown_rx: watch::Receiver<()>,
) -> Result<(), NodeError> {
    let config = DataflowConfig::from_file(dataflow_toml)?;
    config.load_extra_modules();

    let spec = config.node(node_name).ok_or_else(|| {
        NodeError::Configuration(format!(
            "node '{node_name}' is not defined in '{}'",
            dataflow_toml.display()
        ))
    })?;
    log::debug!("registered node classes: {:?}", registry::registered_classes());
    let node = registry::make(&spec.node_class, &spec.node_name, spec.args_json()?)?;
    log::info!("starting node '{node_name}' (class '{}')", spec.node_class);
    weft_node_sdk::run_node(node, redis_url, shutdown_rx).await
}
