//! Broker session setup.
//!
//! Each node process owns one multiplexed connection for publishing and one
//! pub/sub connection for its subscription; nothing is shared across nodes.

use redis::aio::MultiplexedConnection;

use crate::error::NodeError;

/// Open a client and a publishing connection, verifying the broker with a
/// ping. Any failure here is [`NodeError::BrokerUnavailable`].
pub async fn connect(redis_url: &str) -> Result<(redis::Client, MultiplexedConnection), NodeError> {
    let unavailable = |source: redis::RedisError| NodeError::BrokerUnavailable {
        url: redis_url.to_string(),
        source,
    };
    let client = redis::Client::open(redis_url).map_err(unavailable)?;
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .map_err(unavailable)?;
    let _pong: String = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .map_err(unavailable)?;
    Ok((client, conn))
}
