//! Reading back JSONL files produced by the record node.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{commons::DataEntry, Envelope, RecordCodec, SchemaError};

/// Read every entry of a JSONL file whose `data` payloads are expected to
/// decode with `codec`. Lines that fail validation are logged and skipped.
pub fn read_data_entries(path: &Path, codec: &RecordCodec) -> std::io::Result<Vec<DataEntry>> {
    let content = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_entry(codec, line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                log::error!("validation error at line {}: {e}; skipping", lineno + 1);
            }
        }
    }
    Ok(entries)
}

fn parse_entry(codec: &RecordCodec, line: &str) -> Result<DataEntry, SchemaError> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| SchemaError::Mismatch(format!("invalid JSON: {e}")))?;
    let Value::Object(mut entry) = value else {
        return Err(SchemaError::Mismatch("entry is not a JSON object".to_string()));
    };
    let timestamp = entry
        .remove("timestamp")
        .ok_or_else(|| SchemaError::Mismatch("missing 'timestamp'".to_string()))?;
    let timestamp: DateTime<Utc> = serde_json::from_value(timestamp)
        .map_err(|e| SchemaError::Mismatch(format!("bad timestamp: {e}")))?;
    let channel = match entry.remove("channel") {
        Some(Value::String(channel)) => channel,
        _ => return Err(SchemaError::Mismatch("missing 'channel'".to_string())),
    };
    let data = entry
        .remove("data")
        .ok_or_else(|| SchemaError::Mismatch("missing 'data'".to_string()))?;
    let data = Envelope::decode_data(codec, data)?;
    Ok(DataEntry { timestamp, channel, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commons::Float;

    #[test]
    fn reads_valid_lines_and_skips_invalid_ones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let entry = DataEntry::new("rand", Envelope::new(Float { value: 0.75 }));
        let content = format!(
            "{}\nnot json\n{{\"timestamp\":\"2026-01-01T00:00:00Z\",\"channel\":\"rand\",\"data\":{{\"data_type\":\"tick\",\"tick\":1}}}}\n",
            entry.to_json_string().unwrap()
        );
        std::fs::write(&path, content).unwrap();

        let entries = read_data_entries(&path, &RecordCodec::of::<Float>()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].channel, "rand");
        assert_eq!(
            entries[0].data.downcast_ref::<Float>(),
            Some(&Float { value: 0.75 })
        );
    }
}
