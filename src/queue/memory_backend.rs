//! In-memory job store backend using DashMap.
//!
//! This module provides a memory-based implementation of the `JobStoreBackend`
//! trait. Jobs are stored in memory and will be lost on service restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use super::backend::{JobStoreBackend, JobStoreError, JobStoreStats};
use super::models::{Channel, Job, JobState, RetentionLimit};

/// In-memory job store backend.
///
/// Uses a `DashMap` keyed by job id. The claim transition re-checks
/// claimability under the entry's exclusive guard, so two workers racing
/// for the same candidate resolve to exactly one winner.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: DashMap<Uuid, Job>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
        }
    }
}

#[async_trait]
impl JobStoreBackend for MemoryJobStore {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, job: Job) -> Result<(), JobStoreError> {
        tracing::debug!(
            job_id = %job.id,
            channel = %job.channel,
            state = %job.state,
            "Job inserted"
        );
        self.jobs.insert(job.id, job);
        Ok(())
    }

    async fn claim_ready(&self, channel: Channel) -> Result<Option<Job>, JobStoreError> {
        let now = Utc::now();

        // Snapshot claimable candidates ordered by visibility time, then
        // re-check each under the entry guard. The guard serializes the
        // transition, so concurrent claimers cannot both win.
        let mut candidates: Vec<(DateTime<Utc>, Uuid)> = self
            .jobs
            .iter()
            .filter(|entry| entry.channel == channel && entry.is_claimable(now))
            .map(|entry| (entry.visible_at(), entry.id))
            .collect();
        candidates.sort();

        for (_, id) in candidates {
            if let Some(mut entry) = self.jobs.get_mut(&id) {
                if entry.is_claimable(now) {
                    entry.state = JobState::Active;
                    entry.attempts_made += 1;
                    tracing::debug!(
                        job_id = %id,
                        channel = %channel,
                        attempt = entry.attempts_made,
                        "Job claimed"
                    );
                    return Ok(Some(entry.clone()));
                }
            }
        }

        Ok(None)
    }

    async fn complete(
        &self,
        channel: Channel,
        id: Uuid,
        result: Value,
    ) -> Result<(), JobStoreError> {
        match self.jobs.get_mut(&id) {
            Some(mut entry) => {
                entry.state = JobState::Completed;
                entry.result = Some(result);
                entry.finished_at = Some(Utc::now());
                Ok(())
            }
            None => {
                tracing::warn!(job_id = %id, channel = %channel, "Completion for unknown job");
                Ok(())
            }
        }
    }

    async fn fail(
        &self,
        channel: Channel,
        id: Uuid,
        error: String,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), JobStoreError> {
        match self.jobs.get_mut(&id) {
            Some(mut entry) => {
                entry.last_error = Some(error);
                match retry_at {
                    Some(at) => {
                        entry.state = JobState::Delayed;
                        entry.not_before = Some(at);
                    }
                    None => {
                        entry.state = JobState::Failed;
                        entry.finished_at = Some(Utc::now());
                    }
                }
                Ok(())
            }
            None => {
                tracing::warn!(job_id = %id, channel = %channel, "Failure report for unknown job");
                Ok(())
            }
        }
    }

    async fn lookup(&self, channel: Channel, id: Uuid) -> Result<Option<Job>, JobStoreError> {
        Ok(self
            .jobs
            .get(&id)
            .filter(|entry| entry.channel == channel)
            .map(|entry| entry.value().clone()))
    }

    async fn cleanup_finished(&self) -> Result<usize, JobStoreError> {
        let now = Utc::now();
        let mut removed = 0;

        for channel in Channel::ALL {
            for state in [JobState::Completed, JobState::Failed] {
                // Terminal jobs with this outcome, newest first
                let mut finished: Vec<(DateTime<Utc>, Uuid, RetentionLimit)> = self
                    .jobs
                    .iter()
                    .filter(|e| e.channel == channel && e.state == state)
                    .map(|e| {
                        (
                            e.finished_at.unwrap_or(e.created_at),
                            e.id,
                            e.retention_limit(),
                        )
                    })
                    .collect();
                finished.sort_by(|a, b| b.0.cmp(&a.0));

                for (rank, (finished_at, id, limit)) in finished.iter().enumerate() {
                    let expired = match limit {
                        // Not among the newest `n` terminal jobs with this outcome
                        RetentionLimit::Count(n) => rank as u64 >= *n,
                        RetentionLimit::AgeSeconds(secs) => {
                            now.signed_duration_since(*finished_at).num_seconds() >= *secs as i64
                        }
                    };

                    if expired && self.jobs.remove(id).is_some() {
                        removed += 1;
                    }
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed = removed, "Retention cleanup removed terminal jobs");
        }

        Ok(removed)
    }

    async fn stats(&self) -> Result<JobStoreStats, JobStoreError> {
        let mut stats = JobStoreStats {
            backend_type: "memory".to_string(),
            ..Default::default()
        };

        for entry in self.jobs.iter() {
            match entry.state {
                JobState::Waiting => stats.waiting += 1,
                JobState::Delayed => stats.delayed += 1,
                JobState::Active => stats.active += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
            }
        }

        Ok(stats)
    }
}
