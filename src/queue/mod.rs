//! Durable job queue for asynchronous notification delivery.
//!
//! Jobs are persisted in a store backend (memory or Redis), become visible
//! at their scheduled time, and are claimed atomically by dispatcher
//! workers. Terminal records stay queryable until retention removes them.

mod backend;
mod channel_queue;
mod factory;
mod memory_backend;
mod models;
mod redis_backend;

pub use backend::{JobStoreBackend, JobStoreError, JobStoreStats};
pub use channel_queue::ChannelQueue;
pub use factory::create_job_store;
pub use memory_backend::MemoryJobStore;
pub use models::{
    BackoffPolicy, Channel, EmailPayload, Job, JobOptions, JobPayload, JobState, Metadata,
    RetentionLimit, RetentionPolicy, TemplateComponent, TemplateComponentKind, TemplateLanguage,
    TemplateParameter, WhatsAppPayload, WhatsAppTemplate, WhatsAppTemplatePayload,
    WhatsAppTextPayload,
};
pub use redis_backend::RedisJobStore;
