//! Sink node appending every captured message to a JSONL file.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use weft_node_sdk::{Node, NodeContext, NodeCore, NodeError, Outputs};
use weft_schemas::{commons::DataEntry, Envelope};

use crate::parse_args;

fn default_add_datetime() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecordArgs {
    /// Channel → registered record tag to decode it with.
    record_channel_types: IndexMap<String, String>,
    jsonl_file_path: String,
    /// Splice a timestamp into the file name so repeated runs don't clobber
    /// earlier recordings.
    #[serde(default = "default_add_datetime")]
    add_datetime: bool,
}

pub struct RecordNode {
    core: NodeCore,
    jsonl_file_path: PathBuf,
    entry_tx: Option<mpsc::UnboundedSender<DataEntry>>,
}

impl RecordNode {
    pub fn build(node_name: &str, args: Value) -> Result<Box<dyn Node>, NodeError> {
        let args: RecordArgs = parse_args(node_name, args)?;
        let path = if args.add_datetime {
            splice_datetime(&args.jsonl_file_path, Local::now())
        } else {
            args.jsonl_file_path
        };
        let inputs = args.record_channel_types.into_iter().collect();
        Ok(Box::new(Self {
            core: NodeCore::new(node_name, inputs, Vec::new())?,
            jsonl_file_path: PathBuf::from(path),
            entry_tx: None,
        }))
    }
}

weft_node_sdk::register_node!("record", RecordNode::build);

/// Insert `_YYYY-mm-dd_HH-MM-SS` before the file extension, or append it when
/// there is none.
fn splice_datetime(path: &str, now: DateTime<Local>) -> String {
    let stamp = now.format("_%Y-%m-%d_%H-%M-%S");
    match path.rfind('.') {
        Some(dot) => format!("{}{stamp}{}", &path[..dot], &path[dot..]),
        None => format!("{path}{stamp}"),
    }
}

async fn write_entries(
    mut file: tokio::fs::File,
    mut entry_rx: mpsc::UnboundedReceiver<DataEntry>,
) {
    while let Some(entry) = entry_rx.recv().await {
        let line = match entry.to_json_string() {
            Ok(line) => line,
            Err(e) => {
                log::error!("failed to encode entry from '{}': {e}", entry.channel);
                continue;
            }
        };
        if file.write_all(line.as_bytes()).await.is_err()
            || file.write_all(b"\n").await.is_err()
            || file.flush().await.is_err()
        {
            log::error!("jsonl writer failed, stopping");
            break;
        }
    }
}

#[async_trait::async_trait]
impl Node for RecordNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    async fn enter(&mut self, ctx: &NodeContext) -> Result<(), NodeError> {
        let file = tokio::fs::File::create(&self.jsonl_file_path)
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "failed to create '{}': {e}",
                    self.jsonl_file_path.display()
                )
            })?;
        let (entry_tx, entry_rx) = mpsc::unbounded_channel();
        self.entry_tx = Some(entry_tx);
        ctx.spawn(write_entries(file, entry_rx));
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
            .ok_or_else(|| anyhow::anyhow!("record node was not entered"))?;
        entry_tx
            .send(DataEntry::new(channel, message))
            .map_err(|_| anyhow::anyhow!("jsonl writer task is gone"))?;
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
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn datetime_splices_before_the_extension() {
        let now = Local.with_ymd_and_hms(2026, 8, 1, 12, 30, 5).unwrap();
        assert_eq!(
            splice_datetime("out.jsonl", now),
            "out_2026-08-01_12-30-05.jsonl"
        );
        assert_eq!(
            splice_datetime("dir/run.v2.log", now),
            "dir/run.v2_2026-08-01_12-30-05.log"
        );
        assert_eq!(splice_datetime("noext", now), "noext_2026-08-01_12-30-05");
    }

    #[test]
    fn add_datetime_defaults_on() {
        let node = RecordNode::build(
            "record",
            json!({"record_channel_types": {"rand": "float"}, "jsonl_file_path": "out.jsonl"}),
        )
        .unwrap();
        assert_eq!(node.core().inputs["rand"].tag(), "float");
    }

    #[test]
    fn plain_path_kept_when_disabled() {
        let _ = RecordNode::build(
            "record",
            json!({
                "record_channel_types": {"rand": "float"},
                "jsonl_file_path": "out.jsonl",
                "add_datetime": false
            }),
        )
        .unwrap();
    }
}
