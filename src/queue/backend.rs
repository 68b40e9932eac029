//! Job store backend trait.
//!
//! The job store is the single source of truth for job records and their
//! lifecycle. Backends must serialize the claim transition so that no two
//! workers, in-process or across processes sharing the store, can hold the
//! same job `active` at once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::models::{Channel, Job};

/// Error type for job store operations.
#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    /// Job options failed validation at enqueue time
    #[error("Invalid job options: {0}")]
    InvalidOptions(String),

    /// Redis operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Job record could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Store not reachable
    #[error("Job store unavailable: {0}")]
    Unavailable(String),
}

/// Counts of jobs by lifecycle state, across all channels.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobStoreStats {
    pub backend_type: String,
    pub waiting: usize,
    pub delayed: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Durable mapping from job id to job record and its lifecycle state.
///
/// Supports delayed visibility, at-most-one active consumer per job, and
/// state transition bookkeeping. Jobs are mutated only through the methods
/// here; `lookup` is a read-only projection.
#[async_trait]
pub trait JobStoreBackend: Send + Sync {
    /// Backend identifier for logs and stats.
    fn backend_type(&self) -> &'static str;

    /// Persist a new job record. The record must be durably stored before
    /// this returns, so a crash after enqueue never loses the job.
    async fn insert(&self, job: Job) -> Result<(), JobStoreError>;

    /// Atomically claim the next ready job for a channel: `waiting`, or
    /// `delayed` with a visibility time at or before now. Transitions the
    /// job to `active` and increments `attempts_made`. Returns `None` when
    /// nothing is claimable.
    async fn claim_ready(&self, channel: Channel) -> Result<Option<Job>, JobStoreError>;

    /// Mark an active job completed, storing the normalized adapter result.
    async fn complete(
        &self,
        channel: Channel,
        id: Uuid,
        result: Value,
    ) -> Result<(), JobStoreError>;

    /// Record a failed attempt. With `retry_at` set the job re-enters
    /// `delayed` with that visibility time; otherwise it fails terminally.
    async fn fail(
        &self,
        channel: Channel,
        id: Uuid,
        error: String,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), JobStoreError>;

    /// Fetch a job by id. Returns `None` if the id does not exist or has
    /// been purged by retention.
    async fn lookup(&self, channel: Channel, id: Uuid) -> Result<Option<Job>, JobStoreError>;

    /// Remove terminal jobs past their retention limits. Returns the
    /// number of records removed.
    async fn cleanup_finished(&self) -> Result<usize, JobStoreError>;

    /// Current job counts by state.
    async fn stats(&self) -> Result<JobStoreStats, JobStoreError>;
}
