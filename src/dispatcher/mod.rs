//! Per-channel worker pools.
//!
//! Each pool runs N concurrent workers that claim ready jobs, invoke the
//! channel's delivery adapter under a bounded timeout, and report the
//! outcome back to the job store. Retryable failures re-enter the queue
//! with a backoff delay while attempts remain; everything else is terminal.

mod backoff;

pub use backoff::{retry_delay, RetryPolicy};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::delivery::{DeliveryAdapter, DeliveryError};
use crate::metrics::JobMetrics;
use crate::queue::{Channel, ChannelQueue, Job};

/// Configuration for one channel's worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of concurrent workers
    pub concurrency: usize,
    /// Idle sleep between claim attempts when the queue is empty
    pub poll_interval: Duration,
    /// Upper bound for a single delivery attempt
    pub attempt_timeout: Duration,
    /// Retry delay cap and jitter
    pub retry: RetryPolicy,
}

impl WorkerPoolConfig {
    pub fn from_settings(channel: Channel, settings: &Settings) -> Self {
        let concurrency = match channel {
            Channel::Email => settings.workers.email_concurrency,
            Channel::Whatsapp => settings.workers.whatsapp_concurrency,
        };

        Self {
            concurrency: concurrency.max(1),
            poll_interval: Duration::from_millis(settings.workers.poll_interval_ms),
            attempt_timeout: Duration::from_secs(settings.workers.attempt_timeout_seconds),
            retry: RetryPolicy::from_settings(&settings.queue),
        }
    }
}

/// Statistics for a worker pool
#[derive(Debug, Default)]
pub struct WorkerPoolStats {
    /// Jobs claimed by workers in this pool
    pub claimed: AtomicU64,
    /// Jobs that completed successfully
    pub completed: AtomicU64,
    /// Attempts rescheduled for retry
    pub retried: AtomicU64,
    /// Jobs that failed terminally
    pub failed: AtomicU64,
}

impl WorkerPoolStats {
    pub fn snapshot(&self) -> WorkerPoolStatsSnapshot {
        WorkerPoolStatsSnapshot {
            claimed: self.claimed.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of worker pool statistics
#[derive(Debug, Clone, Serialize)]
pub struct WorkerPoolStatsSnapshot {
    pub claimed: u64,
    pub completed: u64,
    pub retried: u64,
    pub failed: u64,
}

/// Pool of concurrent workers for one channel.
pub struct WorkerPool {
    queue: Arc<ChannelQueue>,
    adapter: Arc<dyn DeliveryAdapter>,
    config: WorkerPoolConfig,
    stats: WorkerPoolStats,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<ChannelQueue>,
        adapter: Arc<dyn DeliveryAdapter>,
        config: WorkerPoolConfig,
    ) -> Self {
        Self {
            queue,
            adapter,
            config,
            stats: WorkerPoolStats::default(),
        }
    }

    pub fn channel(&self) -> Channel {
        self.queue.channel()
    }

    pub fn stats(&self) -> WorkerPoolStatsSnapshot {
        self.stats.snapshot()
    }

    /// Spawn all workers for this pool. Each worker finishes its current
    /// attempt before honoring the shutdown signal.
    pub fn start(self: &Arc<Self>, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        tracing::info!(
            channel = %self.channel(),
            concurrency = self.config.concurrency,
            "Starting worker pool"
        );

        (0..self.config.concurrency)
            .map(|worker_id| {
                let pool = Arc::clone(self);
                let shutdown_rx = shutdown.subscribe();
                tokio::spawn(async move {
                    pool.worker_loop(worker_id, shutdown_rx).await;
                })
            })
            .collect()
    }

    async fn worker_loop(&self, worker_id: usize, mut shutdown_rx: broadcast::Receiver<()>) {
        loop {
            match self.queue.claim_ready().await {
                Ok(Some(job)) => {
                    self.stats.claimed.fetch_add(1, Ordering::Relaxed);
                    self.process(worker_id, job).await;
                }
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        channel = %self.channel(),
                        worker_id = worker_id,
                        error = %e,
                        "Failed to claim job"
                    );
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
            }

            // Drain point between jobs
            match shutdown_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Closed) => break,
                Err(TryRecvError::Empty) | Err(TryRecvError::Lagged(_)) => {}
            }
        }

        tracing::info!(
            channel = %self.channel(),
            worker_id = worker_id,
            "Worker shut down"
        );
    }

    /// Run one delivery attempt for a claimed job and report the outcome.
    #[tracing::instrument(
        name = "dispatcher.process",
        skip(self, job),
        fields(
            job_id = %job.id,
            channel = %job.channel,
            attempt = job.attempts_made,
            worker_id = worker_id
        )
    )]
    async fn process(&self, worker_id: usize, job: Job) {
        let channel = job.channel.as_str();
        JobMetrics::job_activated(channel);
        let started = Instant::now();

        let outcome = match tokio::time::timeout(
            self.config.attempt_timeout,
            self.adapter.deliver(&job.payload),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::retryable(format!(
                "delivery attempt timed out after {}s",
                self.config.attempt_timeout.as_secs()
            ))),
        };

        JobMetrics::observe_attempt_duration(channel, started.elapsed().as_secs_f64());

        match outcome {
            Ok(receipt) => {
                let result = serde_json::to_value(&receipt).unwrap_or(Value::Null);
                if let Err(e) = self.queue.complete(job.id, result).await {
                    tracing::error!(error = %e, "Failed to record job completion");
                }
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                JobMetrics::record_completed(channel);
                tracing::info!(provider = %receipt.provider, "Job completed");
            }
            Err(err) => {
                let attempts_remain = job.attempts_made < job.options.max_attempts;

                if err.retryable && attempts_remain {
                    let delay = retry_delay(&job.options.backoff, job.attempts_made, &self.config.retry);
                    let retry_at = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);

                    if let Err(e) = self
                        .queue
                        .fail(job.id, err.to_string(), Some(retry_at))
                        .await
                    {
                        tracing::error!(error = %e, "Failed to reschedule job");
                    }
                    self.stats.retried.fetch_add(1, Ordering::Relaxed);
                    JobMetrics::record_retried(channel);
                    tracing::warn!(
                        error = %err,
                        retry_in_ms = delay.as_millis() as u64,
                        attempts_left = job.options.max_attempts - job.attempts_made,
                        "Delivery attempt failed, retrying"
                    );
                } else {
                    if let Err(e) = self.queue.fail(job.id, err.to_string(), None).await {
                        tracing::error!(error = %e, "Failed to record terminal failure");
                    }
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    JobMetrics::record_failed(channel);
                    tracing::error!(
                        error = %err,
                        retryable = err.retryable,
                        attempts_made = job.attempts_made,
                        "Job failed terminally"
                    );
                }
            }
        }

        JobMetrics::job_released(channel);
    }
}
