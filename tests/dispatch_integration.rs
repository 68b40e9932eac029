//! Cross-component integration tests for the dispatch engine.
//!
//! These tests run the channel queue, job store and worker pools against a
//! scripted delivery adapter, without requiring Redis or server startup.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::broadcast;
use uuid::Uuid;

use herald_notification_service::delivery::{DeliveryAdapter, DeliveryError, DeliveryReceipt};
use herald_notification_service::dispatcher::{RetryPolicy, WorkerPool, WorkerPoolConfig};
use herald_notification_service::queue::{
    BackoffPolicy, Channel, ChannelQueue, EmailPayload, Job, JobOptions, JobPayload, JobState,
    JobStoreBackend, MemoryJobStore, Metadata, RetentionLimit, RetentionPolicy, WhatsAppPayload,
    WhatsAppTextPayload,
};

// =============================================================================
// Test fixtures
// =============================================================================

/// Scripted delivery outcomes for the mock adapter.
enum DeliveryScript {
    AlwaysSucceed,
    AlwaysFailRetryable,
    FailPermanently,
    FailNThenSucceed(u32),
    NeverReturn,
}

struct MockAdapter {
    script: DeliveryScript,
    calls: AtomicU32,
}

impl MockAdapter {
    fn new(script: DeliveryScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeliveryAdapter for MockAdapter {
    async fn deliver(&self, _payload: &JobPayload) -> Result<DeliveryReceipt, DeliveryError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        match self.script {
            DeliveryScript::AlwaysSucceed => Ok(receipt()),
            DeliveryScript::AlwaysFailRetryable => {
                Err(DeliveryError::retryable("provider unavailable"))
            }
            DeliveryScript::FailPermanently => Err(DeliveryError::permanent("invalid recipient")),
            DeliveryScript::FailNThenSucceed(n) => {
                if call <= n {
                    Err(DeliveryError::retryable("provider unavailable"))
                } else {
                    Ok(receipt())
                }
            }
            DeliveryScript::NeverReturn => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(receipt())
            }
        }
    }
}

fn receipt() -> DeliveryReceipt {
    DeliveryReceipt {
        provider: "mock".to_string(),
        response: json!({"accepted": true}),
    }
}

fn email_payload() -> JobPayload {
    JobPayload::Email(EmailPayload {
        to: "user@example.com".to_string(),
        subject: "Your appointment".to_string(),
        html: None,
        text: Some("See you tomorrow".to_string()),
        from_name: None,
        from_email: None,
        cc: vec![],
        bcc: vec![],
        reply_to: None,
        metadata: Metadata::new(),
    })
}

fn whatsapp_payload() -> JobPayload {
    JobPayload::Whatsapp(WhatsAppPayload::Text(WhatsAppTextPayload {
        to: "+5491112345678".to_string(),
        text: "hola".to_string(),
        preview_url: false,
        metadata: Metadata::new(),
    }))
}

fn options(max_attempts: u32, base_delay_ms: u64) -> JobOptions {
    JobOptions {
        max_attempts,
        backoff: BackoffPolicy::Exponential { base_delay_ms },
        not_before: None,
        retention: RetentionPolicy {
            on_success: RetentionLimit::Count(500),
            on_failure: RetentionLimit::Count(1000),
        },
    }
}

fn pool_config(concurrency: usize, attempt_timeout: Duration) -> WorkerPoolConfig {
    WorkerPoolConfig {
        concurrency,
        poll_interval: Duration::from_millis(10),
        attempt_timeout,
        retry: RetryPolicy {
            max_delay_ms: 60_000,
            jitter_factor: 0.0,
        },
    }
}

struct TestEnvironment {
    queue: Arc<ChannelQueue>,
    pool: Arc<WorkerPool>,
    adapter: Arc<MockAdapter>,
    shutdown: broadcast::Sender<()>,
}

fn create_test_environment(channel: Channel, script: DeliveryScript) -> TestEnvironment {
    let store = Arc::new(MemoryJobStore::new());
    let queue = Arc::new(ChannelQueue::new(channel, store));
    let adapter = MockAdapter::new(script);
    let pool = Arc::new(WorkerPool::new(
        queue.clone(),
        adapter.clone(),
        pool_config(2, Duration::from_secs(5)),
    ));
    let (shutdown, _) = broadcast::channel(1);

    TestEnvironment {
        queue,
        pool,
        adapter,
        shutdown,
    }
}

/// Poll until the job reaches the expected state or the deadline passes.
async fn wait_for_state(queue: &ChannelQueue, id: Uuid, state: JobState) -> Job {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let job = queue.lookup(id).await.unwrap();
        if let Some(job) = &job {
            if job.state == state {
                return job.clone();
            }
        }
        if tokio::time::Instant::now() > deadline {
            panic!(
                "job {} did not reach {:?} in time, current: {:?}",
                id,
                state,
                job.map(|j| j.state)
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// =============================================================================
// Admission & scheduling
// =============================================================================

#[tokio::test]
async fn test_immediate_job_is_queued_and_completes() {
    let env = create_test_environment(Channel::Email, DeliveryScript::AlwaysSucceed);

    let job = env
        .queue
        .enqueue(email_payload(), options(3, 100))
        .await
        .unwrap();
    assert_eq!(job.state, JobState::Waiting);

    let handles = env.pool.start(&env.shutdown);
    let finished = wait_for_state(&env.queue, job.id, JobState::Completed).await;

    assert_eq!(finished.attempts_made, 1);
    assert_eq!(finished.result.as_ref().unwrap()["provider"], "mock");
    assert!(finished.last_error.is_none());
    assert_eq!(env.adapter.calls(), 1);

    let _ = env.shutdown.send(());
    for handle in handles {
        let _ = handle.await;
    }
}

#[tokio::test]
async fn test_scheduled_job_stays_delayed_inside_window() {
    let env = create_test_environment(Channel::Whatsapp, DeliveryScript::AlwaysSucceed);

    let mut opts = options(3, 100);
    opts.not_before = Some(Utc::now() + chrono::Duration::minutes(10));

    let job = env.queue.enqueue(whatsapp_payload(), opts).await.unwrap();
    assert_eq!(job.state, JobState::Delayed);

    let handles = env.pool.start(&env.shutdown);
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Still delayed: the visibility time is 10 minutes out
    let current = env.queue.lookup(job.id).await.unwrap().unwrap();
    assert_eq!(current.state, JobState::Delayed);
    assert_eq!(current.attempts_made, 0);
    assert_eq!(env.adapter.calls(), 0);

    let _ = env.shutdown.send(());
    for handle in handles {
        let _ = handle.await;
    }
}

#[tokio::test]
async fn test_short_schedule_becomes_claimable_and_completes() {
    let env = create_test_environment(Channel::Email, DeliveryScript::AlwaysSucceed);

    let mut opts = options(3, 100);
    opts.not_before = Some(Utc::now() + chrono::Duration::milliseconds(150));

    let job = env.queue.enqueue(email_payload(), opts).await.unwrap();
    assert_eq!(job.state, JobState::Delayed);

    let handles = env.pool.start(&env.shutdown);
    let finished = wait_for_state(&env.queue, job.id, JobState::Completed).await;
    assert_eq!(finished.attempts_made, 1);

    let _ = env.shutdown.send(());
    for handle in handles {
        let _ = handle.await;
    }
}

// =============================================================================
// Retry & failure handling
// =============================================================================

#[tokio::test]
async fn test_retryable_failures_exhaust_attempts() {
    let env = create_test_environment(Channel::Email, DeliveryScript::AlwaysFailRetryable);

    // Zero base delay so retries are immediately claimable
    let job = env
        .queue
        .enqueue(email_payload(), options(3, 0))
        .await
        .unwrap();

    let handles = env.pool.start(&env.shutdown);
    let failed = wait_for_state(&env.queue, job.id, JobState::Failed).await;

    assert_eq!(failed.attempts_made, 3);
    assert_eq!(env.adapter.calls(), 3);
    assert!(failed
        .last_error
        .as_ref()
        .unwrap()
        .contains("provider unavailable"));
    assert!(failed.result.is_none());

    // No further attempts after the terminal state
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(env.adapter.calls(), 3);

    let _ = env.shutdown.send(());
    for handle in handles {
        let _ = handle.await;
    }
}

#[tokio::test]
async fn test_non_retryable_failure_is_terminal_immediately() {
    let env = create_test_environment(Channel::Whatsapp, DeliveryScript::FailPermanently);

    let job = env
        .queue
        .enqueue(whatsapp_payload(), options(5, 0))
        .await
        .unwrap();

    let handles = env.pool.start(&env.shutdown);
    let failed = wait_for_state(&env.queue, job.id, JobState::Failed).await;

    // Remaining attempts are ignored for permanent rejections
    assert_eq!(failed.attempts_made, 1);
    assert_eq!(env.adapter.calls(), 1);
    assert!(failed
        .last_error
        .as_ref()
        .unwrap()
        .contains("invalid recipient"));

    let _ = env.shutdown.send(());
    for handle in handles {
        let _ = handle.await;
    }
}

#[tokio::test]
async fn test_transient_failure_recovers() {
    let env = create_test_environment(Channel::Email, DeliveryScript::FailNThenSucceed(2));

    let job = env
        .queue
        .enqueue(email_payload(), options(5, 0))
        .await
        .unwrap();

    let handles = env.pool.start(&env.shutdown);
    let finished = wait_for_state(&env.queue, job.id, JobState::Completed).await;

    assert_eq!(finished.attempts_made, 3);
    assert_eq!(env.adapter.calls(), 3);
    // The last error from failed attempts remains recorded alongside the result
    assert!(finished.result.is_some());

    let _ = env.shutdown.send(());
    for handle in handles {
        let _ = handle.await;
    }
}

#[tokio::test]
async fn test_retry_is_delayed_by_backoff() {
    let env = create_test_environment(Channel::Email, DeliveryScript::AlwaysFailRetryable);

    // Base delay far beyond the test horizon: after the first failure the
    // job must sit in delayed with a future visibility time.
    let job = env
        .queue
        .enqueue(email_payload(), options(3, 60_000))
        .await
        .unwrap();

    let handles = env.pool.start(&env.shutdown);
    let delayed = wait_for_state(&env.queue, job.id, JobState::Delayed).await;

    assert_eq!(delayed.attempts_made, 1);
    let not_before = delayed.not_before.unwrap();
    let wait_ms = (not_before - Utc::now()).num_milliseconds();
    assert!(wait_ms > 30_000, "retry scheduled too soon: {}ms", wait_ms);

    // Only one attempt happened
    assert_eq!(env.adapter.calls(), 1);

    let _ = env.shutdown.send(());
    for handle in handles {
        let _ = handle.await;
    }
}

#[tokio::test]
async fn test_attempt_timeout_is_retryable() {
    let store = Arc::new(MemoryJobStore::new());
    let queue = Arc::new(ChannelQueue::new(Channel::Email, store));
    let adapter = MockAdapter::new(DeliveryScript::NeverReturn);
    let pool = Arc::new(WorkerPool::new(
        queue.clone(),
        adapter.clone(),
        pool_config(1, Duration::from_millis(100)),
    ));
    let (shutdown, _) = broadcast::channel(1);

    let job = queue.enqueue(email_payload(), options(1, 0)).await.unwrap();

    let handles = pool.start(&shutdown);
    let failed = wait_for_state(&queue, job.id, JobState::Failed).await;

    assert_eq!(failed.attempts_made, 1);
    assert!(failed.last_error.as_ref().unwrap().contains("timed out"));

    let _ = shutdown.send(());
    for handle in handles {
        let _ = handle.await;
    }
}

// =============================================================================
// Claim exclusivity
// =============================================================================

#[tokio::test]
async fn test_concurrent_claims_have_single_winner() {
    let store = Arc::new(MemoryJobStore::new());
    let queue = Arc::new(ChannelQueue::new(Channel::Email, store));

    let job = queue.enqueue(email_payload(), options(3, 0)).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let queue = queue.clone();
        handles.push(tokio::spawn(
            async move { queue.claim_ready().await.unwrap() },
        ));
    }

    let mut winners = 0;
    for handle in handles {
        if let Some(claimed) = handle.await.unwrap() {
            assert_eq!(claimed.id, job.id);
            assert_eq!(claimed.state, JobState::Active);
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    let stored = queue.lookup(job.id).await.unwrap().unwrap();
    assert_eq!(stored.attempts_made, 1);
}

// =============================================================================
// Status reads & retention
// =============================================================================

#[tokio::test]
async fn test_status_reads_are_idempotent() {
    let env = create_test_environment(Channel::Email, DeliveryScript::AlwaysSucceed);

    let job = env
        .queue
        .enqueue(email_payload(), options(3, 100))
        .await
        .unwrap();

    let handles = env.pool.start(&env.shutdown);
    wait_for_state(&env.queue, job.id, JobState::Completed).await;

    let first = env.queue.lookup(job.id).await.unwrap().unwrap();
    let second = env.queue.lookup(job.id).await.unwrap().unwrap();
    assert_eq!(first.result, second.result);
    assert_eq!(first.attempts_made, second.attempts_made);
    assert_eq!(first.state, second.state);

    let _ = env.shutdown.send(());
    for handle in handles {
        let _ = handle.await;
    }
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let store = Arc::new(MemoryJobStore::new());
    let queue = ChannelQueue::new(Channel::Email, store);

    let found = queue.lookup(Uuid::new_v4()).await.unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_retention_purges_old_completed_jobs() {
    let store: Arc<MemoryJobStore> = Arc::new(MemoryJobStore::new());
    let backend: Arc<dyn JobStoreBackend> = store.clone();
    let queue = ChannelQueue::new(Channel::Email, backend.clone());

    let mut opts = options(1, 0);
    opts.retention.on_success = RetentionLimit::Count(1);

    let mut ids = Vec::new();
    for _ in 0..3 {
        let job = queue.enqueue(email_payload(), opts.clone()).await.unwrap();
        ids.push(job.id);
        let claimed = queue.claim_ready().await.unwrap().unwrap();
        queue.complete(claimed.id, json!({})).await.unwrap();
    }

    let removed = backend.cleanup_finished().await.unwrap();
    assert_eq!(removed, 2);

    let mut remaining = 0;
    for id in ids {
        if queue.lookup(id).await.unwrap().is_some() {
            remaining += 1;
        }
    }
    assert_eq!(remaining, 1);
}

// =============================================================================
// Worker pool lifecycle
// =============================================================================

#[tokio::test]
async fn test_worker_pool_shuts_down_gracefully() {
    let env = create_test_environment(Channel::Email, DeliveryScript::AlwaysSucceed);

    let handles = env.pool.start(&env.shutdown);
    assert_eq!(handles.len(), 2);

    let _ = env.shutdown.send(());
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker did not shut down")
            .unwrap();
    }
}

#[tokio::test]
async fn test_pool_stats_track_outcomes() {
    let env = create_test_environment(Channel::Email, DeliveryScript::FailNThenSucceed(1));

    let job = env
        .queue
        .enqueue(email_payload(), options(3, 0))
        .await
        .unwrap();

    let handles = env.pool.start(&env.shutdown);
    wait_for_state(&env.queue, job.id, JobState::Completed).await;

    let stats = env.pool.stats();
    assert_eq!(stats.claimed, 2);
    assert_eq!(stats.retried, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 0);

    let _ = env.shutdown.send(());
    for handle in handles {
        let _ = handle.await;
    }
}
