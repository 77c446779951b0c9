//! Print variant that requests a dataflow-wide stop after its 11th entry.
//!
//! Exercises the peer-stop convention: any node may publish the literal
//! `shutdown` to `shutdown:<node_name>` and the manager stops everything.
//! The writer task does the counting, so every accepted entry is flushed to
//! stdout before the stop request goes out.

use serde_json::Value;
use tokio::sync::mpsc;

use weft_node_sdk::{
    shutdown_channel, Node, NodeContext, NodeCore, NodeError, Outputs, Publisher, SHUTDOWN_PAYLOAD,
};
use weft_schemas::{commons::DataEntry, Envelope};

use crate::parse_args;
use crate::print::{write_entry, PrintArgs};

const SELF_STOP_AFTER: u64 = 11;

pub struct SpecialPrintNode {
    core: NodeCore,
    entry_tx: Option<mpsc::UnboundedSender<DataEntry>>,
}

impl SpecialPrintNode {
    pub fn build(node_name: &str, args: Value) -> Result<Box<dyn Node>, NodeError> {
        let args: PrintArgs = parse_args(node_name, args)?;
        let inputs = args.print_channel_types.into_iter().collect();
        Ok(Box::new(Self {
            core: NodeCore::new(node_name, inputs, Vec::new())?,
            entry_tx: None,
        }))
    }
}

weft_node_sdk::register_node!("special_print", SpecialPrintNode::build);

async fn write_entries_then_stop(
    mut entry_rx: mpsc::UnboundedReceiver<DataEntry>,
    mut publisher: Publisher,
    node_name: String,
) {
    let mut out = tokio::io::stdout();
    let mut printed = 0u64;
    while let Some(entry) = entry_rx.recv().await {
        match write_entry(&mut out, &entry).await {
            Ok(true) => printed += 1,
            Ok(false) => continue,
            Err(()) => break,
        }
        if printed >= SELF_STOP_AFTER {
            log::info!("{node_name}: printed {printed} entries, requesting dataflow stop");
            if let Err(e) = publisher
                .publish_raw(&shutdown_channel(&node_name), SHUTDOWN_PAYLOAD)
                .await
            {
                log::warn!("{node_name}: peer-stop publish failed: {e}");
            }
            break;
        }
    }
}

#[async_trait::async_trait]
impl Node for SpecialPrintNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    async fn enter(&mut self, ctx: &NodeContext) -> Result<(), NodeError> {
        let (entry_tx, entry_rx) = mpsc::unbounded_channel();
        self.entry_tx = Some(entry_tx);
        ctx.spawn(write_entries_then_stop(
            entry_rx,
            ctx.publisher(),
            ctx.node_name().to_string(),
        ));
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
            .ok_or_else(|| anyhow::anyhow!("special_print node was not entered"))?;
        // The writer breaks after the stop request; later entries are dropped
        // on the floor while the manager winds the dataflow down.
        if entry_tx.send(DataEntry::new(channel, message)).is_err() {
            log::debug!("{}: writer finished, dropping entry", self.core.name);
        }
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
    fn builds_like_print() {
        let node = SpecialPrintNode::build(
            "special_print",
            json!({"print_channel_types": {"tick/secs/1": "tick"}}),
        )
        .unwrap();
        assert_eq!(node.core().inputs["tick/secs/1"].tag(), "tick");
    }
}
