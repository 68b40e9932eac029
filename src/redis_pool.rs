//! Redis connection handling for the durable job store.
//!
//! Uses a multiplexed `ConnectionManager` that reconnects automatically,
//! shared across worker tasks and API handlers.

use redis::aio::ConnectionManager;
use redis::Client;

use crate::config::RedisConfig;

/// Create a Redis connection manager for async operations.
///
/// The manager multiplexes commands over a single connection and
/// transparently re-establishes it after failures.
pub async fn create_redis_pool(config: &RedisConfig) -> Result<ConnectionManager, redis::RedisError> {
    let client = Client::open(config.url.as_str())?;
    let manager = ConnectionManager::new(client).await?;

    tracing::info!(url = %config.url, "Connected to Redis");
    Ok(manager)
}

/// Ping Redis to verify the connection is healthy.
pub async fn ping(conn: &ConnectionManager) -> bool {
    let mut conn = conn.clone();
    redis::cmd("PING")
        .query_async::<String>(&mut conn)
        .await
        .is_ok()
}
