use std::time::Duration;

use weft_schemas::{Envelope, Tick};

use crate::context::NodeContext;
use crate::heartbeat_channel;

/// How often every node announces liveness on `heartbeat:<node_name>`.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(1);

/// Spawn the background task that publishes one heartbeat per second until
/// shutdown. The payload is a plain tick envelope; observers only care that
/// the channel is live.
pub(crate) fn spawn_heartbeat(ctx: &NodeContext) {
    let node_name = ctx.node_name().to_string();
    let channel = heartbeat_channel(&node_name);
    let mut publisher = ctx.publisher();
    let mut shutdown_rx = ctx.shutdown_rx();
    ctx.spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_PERIOD);
        let mut tick = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    log::debug!("{node_name}: heartbeat stopping");
                    break;
                }
                _ = interval.tick() => {
                    let beat = Envelope::new(Tick { tick });
                    tick += 1;
                    if let Err(e) = publisher.publish(&channel, &beat).await {
                        log::warn!("{node_name}: heartbeat publish failed: {e}");
                    }
                }
            }
        }
    });
}
