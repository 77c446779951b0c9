//! Microphone capture and playback nodes (feature `audio`).
//!
//! Audio device handles are not `Send`, so each node parks its cpal/rodio
//! objects on a dedicated thread and bridges frames to the async side with
//! channels. Frames are mono LINEAR16 at 44.1 kHz, matching the `audio`
//! record's byte layout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;

use weft_node_sdk::{Node, NodeContext, NodeCore, NodeError, Outputs};
use weft_schemas::{Audio, Envelope};

use crate::parse_args;

const SAMPLE_RATE: u32 = 44_100;
const CHANNELS: u16 = 1;

fn capture_config() -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: CHANNELS,
        sample_rate: cpal::SampleRate(SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Default,
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListenerArgs {
    output_channel: String,
}

/// Source node publishing microphone frames as `audio` envelopes.
pub struct ListenerNode {
    core: NodeCore,
    output_channel: String,
    stop: Arc<AtomicBool>,
    capture_thread: Option<std::thread::JoinHandle<()>>,
}

impl ListenerNode {
    pub fn build(node_name: &str, args: Value) -> Result<Box<dyn Node>, NodeError> {
        let args: ListenerArgs = parse_args(node_name, args)?;
        Ok(Box::new(Self {
            core: NodeCore::new(
                node_name,
                Vec::new(),
                vec![(args.output_channel.clone(), "audio".to_string())],
            )?,
            output_channel: args.output_channel,
            stop: Arc::new(AtomicBool::new(false)),
            capture_thread: None,
        }))
    }
}

weft_node_sdk::register_node!("listener", ListenerNode::build);

fn run_capture(stop: Arc<AtomicBool>, frame_tx: mpsc::UnboundedSender<Vec<u8>>) {
    let host = cpal::default_host();
    let Some(device) = host.default_input_device() else {
        log::error!("no default audio input device");
        return;
    };
    let stream = device.build_input_stream(
        &capture_config(),
        move |data: &[i16], _: &cpal::InputCallbackInfo| {
            let frame: Vec<u8> = data.iter().flat_map(|s| s.to_le_bytes()).collect();
            let _ = frame_tx.send(frame);
        },
        |e| log::error!("audio capture error: {e}"),
        None,
    );
    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            log::error!("failed to open capture stream: {e}");
            return;
        }
    };
    if let Err(e) = stream.play() {
        log::error!("failed to start capture stream: {e}");
        return;
    }
    while !stop.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(50));
    }
}

#[async_trait::async_trait]
impl Node for ListenerNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    async fn enter(&mut self, ctx: &NodeContext) -> Result<(), NodeError> {
        let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let stop = self.stop.clone();
        self.capture_thread = Some(std::thread::spawn(move || run_capture(stop, frame_tx)));

        let mut publisher = ctx.publisher();
        let output_channel = self.output_channel.clone();
        ctx.spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                let message = Envelope::new(Audio { audio: frame });
                if let Err(e) = publisher.publish(&output_channel, &message).await {
                    log::warn!("audio frame publish failed: {e}");
                }
            }
        });
        Ok(())
    }

    async fn event_handler(
        &mut self,
        channel: &str,
        _message: Envelope,
    ) -> Result<Outputs, NodeError> {
        Err(NodeError::Handler(anyhow::anyhow!(
            "listener node declares no inputs but received a message on '{channel}'"
        )))
    }

    async fn exit(&mut self) -> Result<(), NodeError> {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.capture_thread.take() {
            let _ = thread.join();
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SpeakerArgs {
    input_channel: String,
}

/// Sink node playing `audio` envelopes on the default output device.
pub struct SpeakerNode {
    core: NodeCore,
    sample_tx: Option<std::sync::mpsc::Sender<Vec<i16>>>,
    playback_thread: Option<std::thread::JoinHandle<()>>,
}

impl SpeakerNode {
    pub fn build(node_name: &str, args: Value) -> Result<Box<dyn Node>, NodeError> {
        let args: SpeakerArgs = parse_args(node_name, args)?;
        Ok(Box::new(Self {
            core: NodeCore::new(
                node_name,
                vec![(args.input_channel, "audio".to_string())],
                Vec::new(),
            )?,
            sample_tx: None,
            playback_thread: None,
        }))
    }
}

weft_node_sdk::register_node!("speaker", SpeakerNode::build);

fn run_playback(sample_rx: std::sync::mpsc::Receiver<Vec<i16>>) {
    let (_stream, handle) = match rodio::OutputStream::try_default() {
        Ok(out) => out,
        Err(e) => {
            log::error!("no audio output device: {e}");
            return;
        }
    };
    let sink = match rodio::Sink::try_new(&handle) {
        Ok(sink) => sink,
        Err(e) => {
            log::error!("failed to open playback sink: {e}");
            return;
        }
    };
    while let Ok(samples) = sample_rx.recv() {
        sink.append(rodio::buffer::SamplesBuffer::new(CHANNELS, SAMPLE_RATE, samples));
    }
    sink.stop();
}

fn bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

#[async_trait::async_trait]
impl Node for SpeakerNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    async fn enter(&mut self, _ctx: &NodeContext) -> Result<(), NodeError> {
        let (sample_tx, sample_rx) = std::sync::mpsc::channel();
        self.sample_tx = Some(sample_tx);
        self.playback_thread = Some(std::thread::spawn(move || run_playback(sample_rx)));
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
        let sample_tx = self
            .sample_tx
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("speaker node was not entered"))?;
        if sample_tx.send(bytes_to_samples(&audio.audio)).is_err() {
            log::warn!("playback thread is gone, dropping frame");
        }
        Ok(Vec::new())
    }

    async fn exit(&mut self) -> Result<(), NodeError> {
        self.sample_tx = None;
        if let Some(thread) = self.playback_thread.take() {
            let _ = thread.join();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_round_trip_little_endian() {
        let samples = vec![0i16, -1, 256, i16::MIN];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(bytes_to_samples(&bytes), samples);
    }
}
