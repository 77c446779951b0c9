//! Text-to-speech bridge over the Google Cloud Text-to-Speech REST API.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use weft_node_sdk::{Node, NodeContext, NodeCore, NodeError, Outputs, Publisher};
use weft_schemas::{Audio, Envelope, Text};

use crate::parse_args;

const SYNTHESIZE_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TtsArgs {
    input_channel: String,
    output_channel: String,
    api_key: String,
    /// Sample rate of the LINEAR16 audio published on the output channel.
    rate: u32,
}

pub struct TtsNode {
    core: NodeCore,
    output_channel: String,
    api_key: String,
    rate: u32,
    text_tx: Option<mpsc::UnboundedSender<String>>,
}

impl TtsNode {
    pub fn build(node_name: &str, args: Value) -> Result<Box<dyn Node>, NodeError> {
        let args: TtsArgs = parse_args(node_name, args)?;
        Ok(Box::new(Self {
            core: NodeCore::new(
                node_name,
                vec![(args.input_channel, "text".to_string())],
                vec![(args.output_channel.clone(), "audio".to_string())],
            )?,
            output_channel: args.output_channel,
            api_key: args.api_key,
            rate: args.rate,
            text_tx: None,
        }))
    }
}

weft_node_sdk::register_node!("tts", TtsNode::build);

async fn synthesize(
    client: &reqwest::Client,
    api_key: &str,
    rate: u32,
    text: &str,
) -> anyhow::Result<Vec<u8>> {
    let body = json!({
        "input": { "text": text },
        "voice": { "languageCode": "en-US", "ssmlGender": "NEUTRAL" },
        "audioConfig": { "audioEncoding": "LINEAR16", "sampleRateHertz": rate },
    });
    let response = client
        .post(SYNTHESIZE_URL)
        .query(&[("key", api_key)])
        .json(&body)
        .send()
        .await?
        .error_for_status()?;
    let reply: Value = response.json().await?;
    decode_audio_content(&reply)
}

fn decode_audio_content(reply: &Value) -> anyhow::Result<Vec<u8>> {
    let content = reply["audioContent"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("response is missing 'audioContent'"))?;
    Ok(BASE64.decode(content)?)
}

async fn synthesize_queue(
    mut text_rx: mpsc::UnboundedReceiver<String>,
    mut publisher: Publisher,
    output_channel: String,
    api_key: String,
    rate: u32,
) {
    let client = reqwest::Client::new();
    while let Some(text) = text_rx.recv().await {
        match synthesize(&client, &api_key, rate, &text).await {
            Ok(audio) => {
                let message = Envelope::new(Audio { audio });
                if let Err(e) = publisher.publish(&output_channel, &message).await {
                    log::warn!("synthesized audio publish failed: {e}");
                }
            }
            Err(e) => log::error!("error during speech synthesis: {e}"),
        }
    }
}

#[async_trait::async_trait]
impl Node for TtsNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    async fn enter(&mut self, ctx: &NodeContext) -> Result<(), NodeError> {
        let (text_tx, text_rx) = mpsc::unbounded_channel();
        self.text_tx = Some(text_tx);
        ctx.spawn(synthesize_queue(
            text_rx,
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
        let text = message
            .downcast_ref::<Text>()
            .ok_or_else(|| anyhow::anyhow!("expected a text payload"))?;
        let text_tx = self
            .text_tx
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("tts node was not entered"))?;
        text_tx
            .send(text.text.clone())
            .map_err(|_| anyhow::anyhow!("synthesis task is gone"))?;
        Ok(Vec::new())
    }

    async fn exit(&mut self) -> Result<(), NodeError> {
        self.text_tx = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_base64_audio_content() {
        let reply = json!({"audioContent": BASE64.encode([1u8, 2, 3])});
        assert_eq!(decode_audio_content(&reply).unwrap(), vec![1, 2, 3]);
        assert!(decode_audio_content(&json!({})).is_err());
    }

    #[test]
    fn declares_text_in_audio_out() {
        let node = TtsNode::build(
            "tts",
            json!({
                "input_channel": "speech",
                "output_channel": "voice",
                "api_key": "k",
                "rate": 44100
            }),
        )
        .unwrap();
        assert_eq!(node.core().inputs["speech"].tag(), "text");
        assert_eq!(node.core().outputs["voice"].tag(), "audio");
    }
}
