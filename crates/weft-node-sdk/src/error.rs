use weft_schemas::SchemaError;

/// Errors terminating a node. The runtime recovers nothing: every variant
/// except [`NodeError::ExitSignal`] is fatal for the node that raised it.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Unregistered tag, malformed node arguments, missing config field.
    /// Raised at construction, before any I/O.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The broker did not answer the ping at enter.
    #[error("could not reach broker at {url}: {source}")]
    BrokerUnavailable {
        url: String,
        #[source]
        source: redis::RedisError,
    },

    /// The subscription closed mid-loop.
    #[error("broker subscription closed unexpectedly")]
    BrokerDisconnected,

    /// An incoming payload failed discriminated decoding for its channel.
    #[error("schema mismatch on channel '{channel}': {reason}")]
    SchemaMismatch { channel: String, reason: String },

    /// Encoding or registry failure outside the per-channel decode path.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Broker failure after enter (publish, subscribe bookkeeping).
    #[error("broker error: {0}")]
    Broker(#[from] redis::RedisError),

    /// Failure from user handler code.
    #[error("handler error: {0}")]
    Handler(#[from] anyhow::Error),

    /// Raised by a handler to request graceful loop exit. The event loop
    /// treats this as success, not as an error.
    #[error("node exit signal")]
    ExitSignal,
}
