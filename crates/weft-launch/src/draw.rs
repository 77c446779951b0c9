//! Mermaid rendering of dataflow graphs.
//!
//! Nodes are constructed through the factory (constructors do no I/O), so the
//! drawing reflects the channel wiring the runtime would actually use.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use indexmap::IndexMap;

use weft_node_sdk::{registry, DataflowConfig, NodeError};

/// Mermaid flowchart for one or more dataflows drawn into a single graph.
pub fn mermaid_graph(configs: &[(String, DataflowConfig)]) -> Result<String, NodeError> {
    // channel → (publishers, subscribers), in declaration order
    let mut channel_edges: IndexMap<String, (Vec<String>, Vec<String>)> = IndexMap::new();
    let mut config_nodes: IndexMap<String, Vec<String>> = IndexMap::new();

    for (config_name, config) in configs {
        config.load_extra_modules();
        for spec in &config.nodes {
            let node = registry::make(&spec.node_class, &spec.node_name, spec.args_json()?)?;
            for channel in node.core().outputs.keys() {
                channel_edges
                    .entry(channel.clone())
                    .or_default()
                    .0
                    .push(spec.node_name.clone());
            }
            for channel in node.core().inputs.keys() {
                channel_edges
                    .entry(channel.clone())
                    .or_default()
                    .1
                    .push(spec.node_name.clone());
            }
            config_nodes
                .entry(config_name.clone())
                .or_default()
                .push(spec.node_name.clone());
        }
    }

    let mut lines = vec!["flowchart TD".to_string()];
    let mut joints = Vec::new();

    for (channel, (publishers, subscribers)) in &channel_edges {
        let channel_id = sanitize(channel);
        if publishers.is_empty() {
            for subscriber in subscribers {
                lines.push(format!(
                    "    start_{channel_id}(( )) -->|{channel}| {}[{subscriber}]",
                    sanitize(subscriber)
                ));
            }
        } else if subscribers.is_empty() {
            for publisher in publishers {
                lines.push(format!(
                    "    {}[{publisher}] -->|{channel}| end_{channel_id}(( ))",
                    sanitize(publisher)
                ));
            }
        } else if publishers.len() == 1 && subscribers.len() == 1 {
            lines.push(format!(
                "    {}[{}] -->|{channel}| {}[{}]",
                sanitize(&publishers[0]),
                publishers[0],
                sanitize(&subscribers[0]),
                subscribers[0]
            ));
        } else {
            // Fan-in/fan-out meets at an invisible joint so the channel is
            // drawn once.
            let joint = format!("joint_{channel_id}");
            for publisher in publishers {
                lines.push(format!(
                    "    {}[{publisher}] ---|{channel}| {joint}[ ]",
                    sanitize(publisher)
                ));
            }
            for subscriber in subscribers {
                lines.push(format!(
                    "    {joint} --> {}[{subscriber}]",
                    sanitize(subscriber)
                ));
            }
            joints.push(joint);
        }
    }

    for (config_name, nodes) in &config_nodes {
        lines.push(format!("subgraph {}", sanitize(config_name)));
        for node in nodes {
            lines.push(format!("    {}", sanitize(node)));
        }
        lines.push("end".to_string());
    }
    for joint in &joints {
        lines.push(format!("    style {joint} height:0px;"));
    }

    Ok(lines.join("\n"))
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Render the graph to an SVG file via mermaid.ink.
pub async fn render_svg(graph: &str, svg_path: &Path) -> anyhow::Result<()> {
    let url = format!("https://mermaid.ink/svg/{}", BASE64.encode(graph.as_bytes()));
    let response = reqwest::get(&url).await?.error_for_status()?;
    let bytes = response.bytes().await?;
    std::fs::write(svg_path, &bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick_print_config() -> DataflowConfig {
        DataflowConfig::from_toml(
            r#"
redis_url = "redis://localhost:6379/0"

[[nodes]]
node_name = "tick"
node_class = "tick"

[[nodes]]
node_name = "print"
node_class = "print"

[nodes.node_args.print_channel_types]
"tick/secs/1" = "tick"
"#,
        )
        .unwrap()
    }

    #[test]
    fn draws_direct_and_dangling_edges() {
        let graph =
            mermaid_graph(&[("flow".to_string(), tick_print_config())]).unwrap();
        assert!(graph.starts_with("flowchart TD"));
        assert!(graph.contains("tick[tick] -->|tick/secs/1| print[print]"));
        // Unsubscribed tick channels dangle into hidden endpoints.
        assert!(graph.contains("tick[tick] -->|tick/millis/10| end_tick_millis_10(( ))"));
        assert!(graph.contains("subgraph flow"));
    }

    #[test]
    fn unknown_class_propagates_configuration_error() {
        let config = DataflowConfig::from_toml(
            r#"
redis_url = "redis://localhost:6379/0"

[[nodes]]
node_name = "x"
node_class = "does-not-exist"
"#,
        )
        .unwrap();
        let err = mermaid_graph(&[("flow".to_string(), config)]).unwrap_err();
        assert!(matches!(err, NodeError::Configuration(_)));
    }

    #[test]
    fn sanitize_keeps_identifiers_mermaid_safe() {
        assert_eq!(sanitize("tick/secs/1"), "tick_secs_1");
        assert_eq!(sanitize("heartbeat:tick"), "heartbeat_tick");
    }
}
