//! Every demo dataflow must parse and construct cleanly: valid TOML, unique
//! node names, registered classes, registered channel records.

use std::path::PathBuf;

use weft_launch as _;
use weft_node_sdk::{registry, DataflowConfig};

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../demos")
        .join(name)
}

const DEMOS: &[&str] = &[
    "tick_print.toml",
    "tick_random_record.toml",
    "schema_mismatch.toml",
    "peer_stop.toml",
    "exception.toml",
    "api.toml",
];

#[test]
fn all_demo_dataflows_construct() {
    for name in DEMOS {
        let config = DataflowConfig::from_file(&demo(name))
            .unwrap_or_else(|e| panic!("{name}: {e}"));
        for spec in &config.nodes {
            let node = registry::make(
                &spec.node_class,
                &spec.node_name,
                spec.args_json().unwrap(),
            )
            .unwrap_or_else(|e| panic!("{name}/{}: {e}", spec.node_name));
            assert_eq!(node.core().name, spec.node_name);
        }
    }
}

#[test]
fn tick_print_wiring_matches() {
    let config = DataflowConfig::from_file(&demo("tick_print.toml")).unwrap();
    let print = config.node("print").unwrap();
    let node = registry::make("print", "print", print.args_json().unwrap()).unwrap();
    assert_eq!(node.core().inputs["tick/secs/1"].tag(), "tick");
}

#[test]
fn api_demo_uses_rest_envelopes() {
    let config = DataflowConfig::from_file(&demo("api.toml")).unwrap();
    let spec = config.node("rest_api").unwrap();
    let node = registry::make("rest_api", "rest_api", spec.args_json().unwrap()).unwrap();
    assert_eq!(node.core().inputs["req"].tag(), "rest_request");
    assert_eq!(node.core().outputs["resp"].tag(), "rest_response");
}
