//! Sink node writing every captured message to stdout as a JSON line.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use weft_node_sdk::{Node, NodeContext, NodeCore, NodeError, Outputs};
use weft_schemas::{commons::DataEntry, Envelope};

use crate::parse_args;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PrintArgs {
    /// Channel → registered record tag to decode it with.
    pub print_channel_types: IndexMap<String, String>,
}

pub struct PrintNode {
    core: NodeCore,
    entry_tx: Option<mpsc::UnboundedSender<DataEntry>>,
}

impl PrintNode {
    pub fn build(node_name: &str, args: Value) -> Result<Box<dyn Node>, NodeError> {
        let args: PrintArgs = parse_args(node_name, args)?;
        let inputs = args.print_channel_types.into_iter().collect();
        Ok(Box::new(Self {
            core: NodeCore::new(node_name, inputs, Vec::new())?,
            entry_tx: None,
        }))
    }
}

weft_node_sdk::register_node!("print", PrintNode::build);

/// Write one entry as a JSON line and flush. `Ok(false)` means the entry was
/// skipped (encode failure); `Err(())` means stdout is gone.
pub(crate) async fn write_entry(
    out: &mut tokio::io::Stdout,
    entry: &DataEntry,
) -> Result<bool, ()> {
    let line = match entry.to_json_string() {
        Ok(line) => line,
        Err(e) => {
            log::error!("failed to encode entry from '{}': {e}", entry.channel);
            return Ok(false);
        }
    };
    if out.write_all(line.as_bytes()).await.is_err()
        || out.write_all(b"\n").await.is_err()
        || out.flush().await.is_err()
    {
        log::error!("stdout writer failed, stopping");
        return Err(());
    }
    Ok(true)
}

pub(crate) async fn write_entries(mut entry_rx: mpsc::UnboundedReceiver<DataEntry>) {
    let mut out = tokio::io::stdout();
    while let Some(entry) = entry_rx.recv().await {
        if write_entry(&mut out, &entry).await.is_err() {
            break;
        }
    }
}

#[async_trait::async_trait]
impl Node for PrintNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    async fn enter(&mut self, ctx: &NodeContext) -> Result<(), NodeError> {
        let (entry_tx, entry_rx) = mpsc::unbounded_channel();
        self.entry_tx = Some(entry_tx);
        ctx.spawn(write_entries(entry_rx));
        Ok(())
    }

    async fn event_handler(
        &mut self,
        channel: &str,
        message: Envelope,
    ) -> Result<Outputs, NodeError> {
        let entry_tx = self
            .entry_tx
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("print node was not entered"))?;
        entry_tx
            .send(DataEntry::new(channel, message))
            .map_err(|_| anyhow::anyhow!("stdout writer task is gone"))?;
        Ok(Vec::new())
    }

    async fn exit(&mut self) -> Result<(), NodeError> {
        self.entry_tx = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_channel_types_from_configuration() {
        let node = PrintNode::build(
            "print",
            json!({"print_channel_types": {"tick/secs/1": "tick", "rand": "float"}}),
        )
        .unwrap();
        assert_eq!(node.core().inputs.len(), 2);
        assert_eq!(node.core().inputs["tick/secs/1"].tag(), "tick");
        assert_eq!(node.core().inputs["rand"].tag(), "float");
        assert!(node.core().outputs.is_empty());
    }

    #[test]
    fn unknown_record_tag_fails_construction() {
        let err = PrintNode::build(
            "print",
            json!({"print_channel_types": {"c": "no-such-model"}}),
        )
        .unwrap_err();
        assert!(matches!(err, NodeError::Configuration(_)));
    }
}
