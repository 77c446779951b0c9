//! Built-in reference nodes.
//!
//! Each node registers itself under a class name resolvable from a dataflow
//! file (`register_node!`); linking this crate into a binary is what makes
//! the built-in classes available to the factory.

use serde::de::DeserializeOwned;
use serde_json::Value;

use weft_node_sdk::NodeError;

pub mod api_client;
pub mod exception;
pub mod print;
pub mod random;
pub mod record;
pub mod rest;
pub mod special_print;
pub mod tick;
pub mod transcriber;
pub mod tts;

#[cfg(feature = "audio")]
pub mod audio;

pub use api_client::ApiClientNode;
#[cfg(feature = "audio")]
pub use audio::{ListenerNode, SpeakerNode};
pub use exception::ExceptionNode;
pub use print::PrintNode;
pub use random::RandomNode;
pub use record::RecordNode;
pub use rest::RestApiNode;
pub use special_print::SpecialPrintNode;
pub use tick::TickNode;
pub use transcriber::TranscriberNode;
pub use tts::TtsNode;

/// Deserialize a node's `node_args` into its argument struct. Absent args
/// become an empty object; unknown keys are configuration errors.
pub(crate) fn parse_args<T: DeserializeOwned>(node_name: &str, args: Value) -> Result<T, NodeError> {
    let args = if args.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| {
        NodeError::Configuration(format!("invalid node_args for '{node_name}': {e}"))
    })
}
