//! Speech-to-text bridge over the Google Cloud Speech REST API.
//!
//! Audio envelopes are queued and recognized one buffer at a time by a
//! background task; final transcripts are published as `text` envelopes.
//! Service errors are logged and suppressed so the loop stays alive.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use weft_node_sdk::{Node, NodeContext, NodeCore, NodeError, Outputs, Publisher};
use weft_schemas::{Audio, Envelope, Text};

use crate::parse_args;

const RECOGNIZE_URL: &str = "https://speech.googleapis.com/v1/speech:recognize";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TranscriberArgs {
    input_channel: String,
    output_channel: String,
    /// Sample rate of the LINEAR16 audio on the input channel.
    rate: u32,
    api_key: String,
}

pub struct TranscriberNode {
    core: NodeCore,
    output_channel: String,
    rate: u32,
    api_key: String,
    audio_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl TranscriberNode {
    pub fn build(node_name: &str, args: Value) -> Result<Box<dyn Node>, NodeError> {
        let args: TranscriberArgs = parse_args(node_name, args)?;
        Ok(Box::new(Self {
            core: NodeCore::new(
                node_name,
                vec![(args.input_channel, "audio".to_string())],
                vec![(args.output_channel.clone(), "text".to_string())],
            )?,
            output_channel: args.output_channel,
            rate: args.rate,
            api_key: args.api_key,
            audio_tx: None,
        }))
    }
}

weft_node_sdk::register_node!("transcriber", TranscriberNode::build);

async fn recognize(
    client: &reqwest::Client,
    api_key: &str,
    rate: u32,
    content: &[u8],
) -> anyhow::Result<Option<String>> {
    let body = json!({
        "config": {
            "encoding": "LINEAR16",
            "sampleRateHertz": rate,
            "languageCode": "en-US",
        },
        "audio": { "content": BASE64.encode(content) },
    });
    let response = client
        .post(RECOGNIZE_URL)
        .query(&[("key", api_key)])
        .json(&body)
        .send()
        .await?
        .error_for_status()?;
    let reply: Value = response.json().await?;
    Ok(extract_transcript(&reply))
}

fn extract_transcript(reply: &Value) -> Option<String> {
    reply["results"][0]["alternatives"][0]["transcript"]
        .as_str()
        .map(str::to_string)
}

async fn transcribe_queue(
    mut audio_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    mut publisher: Publisher,
    output_channel: String,
    api_key: String,
    rate: u32,
) {
    let client = reqwest::Client::new();
    while let Some(content) = audio_rx.recv().await {
        match recognize(&client, &api_key, rate, &content).await {
            Ok(Some(transcript)) => {
                let message = Envelope::new(Text { text: transcript });
                if let Err(e) = publisher.publish(&output_channel, &message).await {
                    log::warn!("transcript publish failed: {e}");
                }
            }
            Ok(None) => {}
            Err(e) => log::error!("error during transcription: {e}"),
        }
    }
}

#[async_trait::async_trait]
impl Node for TranscriberNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    async fn enter(&mut self, ctx: &NodeContext) -> Result<(), NodeError> {
        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        self.audio_tx = Some(audio_tx);
        ctx.spawn(transcribe_queue(
            audio_rx,
            ctx.publisher(),
            self.output_channel.clone(),
            self.api_key.clone(),
            self.rate,
        ));
        Ok(())
    }

    async fn event_handler(
        &mut self,
        _channel: &str,
        message: Envelope,
    ) -> Result<Outputs, NodeError> {
        let audio = message
            .downcast_ref::<Audio>()
            .ok_or_else(|| anyhow::anyhow!("expected an audio payload"))?;
        let audio_tx = self
            .audio_tx
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("transcriber node was not entered"))?;
        audio_tx
            .send(audio.audio.clone())
            .map_err(|_| anyhow::anyhow!("transcription task is gone"))?;
        Ok(Vec::new())
    }

    async fn exit(&mut self) -> Result<(), NodeError> {
        self.audio_tx = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_first_transcript() {
        let reply = json!({
            "results": [
                {"alternatives": [{"transcript": "hello weft", "confidence": 0.92}]}
            ]
        });
        assert_eq!(extract_transcript(&reply), Some("hello weft".to_string()));
        assert_eq!(extract_transcript(&json!({})), None);
    }

    #[test]
    fn declares_audio_in_text_out() {
        let node = TranscriberNode::build(
            "transcriber",
            json!({
                "input_channel": "mic",
                "output_channel": "speech",
                "rate": 44100,
                "api_key": "k"
            }),
        )
        .unwrap();
        assert_eq!(node.core().inputs["mic"].tag(), "audio");
        assert_eq!(node.core().outputs["speech"].tag(), "text");
    }
}
