//! Job store backend factory

use std::sync::Arc;

use redis::aio::ConnectionManager;

use crate::config::QueueSettings;

use super::backend::JobStoreBackend;
use super::memory_backend::MemoryJobStore;
use super::redis_backend::RedisJobStore;

/// Create a job store backend based on configuration.
///
/// Returns the appropriate backend implementation based on the `backend`
/// setting:
/// - `"redis"`: Returns a `RedisJobStore` if a Redis connection is provided
/// - `"memory"` (default): Returns a `MemoryJobStore`
///
/// # Example
///
/// ```rust,ignore
/// let store = create_job_store(&settings.queue, Some(redis_conn));
/// ```
pub fn create_job_store(
    settings: &QueueSettings,
    redis_conn: Option<ConnectionManager>,
) -> Arc<dyn JobStoreBackend> {
    match settings.backend.as_str() {
        "redis" => {
            if let Some(conn) = redis_conn {
                tracing::info!(
                    backend = "redis",
                    prefix = %settings.redis_prefix,
                    "Creating Redis job store"
                );
                Arc::new(RedisJobStore::new(conn, settings.redis_prefix.clone()))
            } else {
                tracing::warn!(
                    "Redis backend requested but no connection provided, falling back to memory"
                );
                Arc::new(MemoryJobStore::new())
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory job store");
            Arc::new(MemoryJobStore::new())
        }
    }
}
