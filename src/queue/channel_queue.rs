//! Named logical queue, one per channel.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::metrics::JobMetrics;

use super::backend::{JobStoreBackend, JobStoreError};
use super::models::{Channel, Job, JobOptions, JobPayload};

/// A named queue bound to one channel, wrapping the shared job store.
///
/// Admission enqueues through this type; the dispatcher claims and reports
/// through it; the status API reads through it. All operations delegate to
/// the store, which owns durability and the claim protocol.
pub struct ChannelQueue {
    channel: Channel,
    store: Arc<dyn JobStoreBackend>,
}

impl ChannelQueue {
    pub fn new(channel: Channel, store: Arc<dyn JobStoreBackend>) -> Self {
        Self { channel, store }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Logical queue name, e.g. `email-queue`.
    pub fn name(&self) -> &'static str {
        self.channel.queue_name()
    }

    /// Validate options, build the job record and persist it.
    ///
    /// The record is durably stored before the job is returned, so a crash
    /// after enqueue never loses the job.
    pub async fn enqueue(
        &self,
        payload: JobPayload,
        options: JobOptions,
    ) -> Result<Job, JobStoreError> {
        if options.max_attempts < 1 {
            return Err(JobStoreError::InvalidOptions(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if payload.channel() != self.channel {
            return Err(JobStoreError::InvalidOptions(format!(
                "payload channel {} does not match queue {}",
                payload.channel(),
                self.channel
            )));
        }

        let job = Job::new(payload, options, Utc::now());
        self.store.insert(job.clone()).await?;

        JobMetrics::record_enqueued(self.channel.as_str());
        tracing::debug!(
            job_id = %job.id,
            queue = self.name(),
            state = %job.state,
            "Job enqueued"
        );

        Ok(job)
    }

    /// Fetch a job by id. Read-only; never mutates the record.
    pub async fn lookup(&self, id: Uuid) -> Result<Option<Job>, JobStoreError> {
        self.store.lookup(self.channel, id).await
    }

    /// Claim the next ready job for this channel.
    pub async fn claim_ready(&self) -> Result<Option<Job>, JobStoreError> {
        self.store.claim_ready(self.channel).await
    }

    /// Report a successful delivery.
    pub async fn complete(&self, id: Uuid, result: Value) -> Result<(), JobStoreError> {
        self.store.complete(self.channel, id, result).await
    }

    /// Report a failed attempt; `retry_at` reschedules, `None` is terminal.
    pub async fn fail(
        &self,
        id: Uuid,
        error: String,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), JobStoreError> {
        self.store.fail(self.channel, id, error, retry_at).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::memory_backend::MemoryJobStore;
    use crate::queue::models::{
        BackoffPolicy, EmailPayload, JobState, Metadata, RetentionLimit, RetentionPolicy,
        WhatsAppPayload, WhatsAppTextPayload,
    };
    use chrono::Duration;

    fn email_payload() -> JobPayload {
        JobPayload::Email(EmailPayload {
            to: "user@example.com".to_string(),
            subject: "Test".to_string(),
            html: None,
            text: Some("body".to_string()),
            from_name: None,
            from_email: None,
            cc: vec![],
            bcc: vec![],
            reply_to: None,
            metadata: Metadata::new(),
        })
    }

    fn options(max_attempts: u32) -> JobOptions {
        JobOptions {
            max_attempts,
            backoff: BackoffPolicy::Fixed { base_delay_ms: 100 },
            not_before: None,
            retention: RetentionPolicy {
                on_success: RetentionLimit::Count(500),
                on_failure: RetentionLimit::Count(1000),
            },
        }
    }

    #[tokio::test]
    async fn test_enqueue_and_lookup() {
        let store = Arc::new(MemoryJobStore::new());
        let queue = ChannelQueue::new(Channel::Email, store);

        let job = queue.enqueue(email_payload(), options(3)).await.unwrap();
        assert_eq!(job.state, JobState::Waiting);

        let found = queue.lookup(job.id).await.unwrap().unwrap();
        assert_eq!(found.id, job.id);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_zero_attempts() {
        let store = Arc::new(MemoryJobStore::new());
        let queue = ChannelQueue::new(Channel::Email, store);

        let result = queue.enqueue(email_payload(), options(0)).await;
        assert!(matches!(result, Err(JobStoreError::InvalidOptions(_))));
    }

    #[tokio::test]
    async fn test_enqueue_rejects_wrong_channel_payload() {
        let store = Arc::new(MemoryJobStore::new());
        let queue = ChannelQueue::new(Channel::Whatsapp, store);

        let result = queue.enqueue(email_payload(), options(3)).await;
        assert!(matches!(result, Err(JobStoreError::InvalidOptions(_))));
    }

    #[tokio::test]
    async fn test_scheduled_enqueue_starts_delayed() {
        let store = Arc::new(MemoryJobStore::new());
        let queue = ChannelQueue::new(Channel::Whatsapp, store);

        let mut opts = options(3);
        opts.not_before = Some(Utc::now() + Duration::minutes(10));

        let payload = JobPayload::Whatsapp(WhatsAppPayload::Text(WhatsAppTextPayload {
            to: "+5491112345678".to_string(),
            text: "hola".to_string(),
            preview_url: false,
            metadata: Metadata::new(),
        }));

        let job = queue.enqueue(payload, opts).await.unwrap();
        assert_eq!(job.state, JobState::Delayed);
        assert!(queue.claim_ready().await.unwrap().is_none());
    }
}
