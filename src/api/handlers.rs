//! Admission and status handlers.

use std::str::FromStr;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::queue::{BackoffPolicy, Channel, JobOptions, JobPayload, RetentionLimit, RetentionPolicy};
use crate::server::AppState;

use super::models::{
    AdmissionResponse, AdmissionStatus, EmailNotificationRequest, JobStatusResponse,
    WhatsAppNotificationRequest,
};

/// Accept an email notification for asynchronous delivery.
#[tracing::instrument(
    name = "http.submit_email",
    skip(state, request),
    fields(app = %request.app)
)]
pub async fn submit_email(
    State(state): State<AppState>,
    Json(request): Json<EmailNotificationRequest>,
) -> Result<(StatusCode, Json<AdmissionResponse>)> {
    request.validate()?;

    let (delay_ms, not_before) = scheduling_delay(request.schedule_at, Utc::now());
    let options = job_options(&state, not_before);
    let payload = JobPayload::Email(request.into_payload(&state.settings.mail));

    let job = state.email_queue.enqueue(payload, options).await?;

    tracing::info!(
        job_id = %job.id,
        queue = state.email_queue.name(),
        delay_ms = delay_ms,
        "Email notification accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(admission_response(job.id, state.email_queue.name(), delay_ms)),
    ))
}

/// Accept a WhatsApp notification for asynchronous delivery.
#[tracing::instrument(
    name = "http.submit_whatsapp",
    skip(state, request),
    fields(app = %request.app)
)]
pub async fn submit_whatsapp(
    State(state): State<AppState>,
    Json(request): Json<WhatsAppNotificationRequest>,
) -> Result<(StatusCode, Json<AdmissionResponse>)> {
    request.validate()?;

    let (delay_ms, not_before) = scheduling_delay(request.schedule_at, Utc::now());
    let options = job_options(&state, not_before);
    let payload = JobPayload::Whatsapp(request.into_payload());

    let job = state.whatsapp_queue.enqueue(payload, options).await?;

    tracing::info!(
        job_id = %job.id,
        queue = state.whatsapp_queue.name(),
        delay_ms = delay_ms,
        "WhatsApp notification accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(admission_response(
            job.id,
            state.whatsapp_queue.name(),
            delay_ms,
        )),
    ))
}

/// Report the current state of a job. Read-only.
#[tracing::instrument(name = "http.job_status", skip(state))]
pub async fn job_status(
    State(state): State<AppState>,
    Path((channel, id)): Path<(String, Uuid)>,
) -> Result<Json<JobStatusResponse>> {
    let channel = Channel::from_str(&channel).map_err(AppError::Validation)?;

    let job = state
        .queue_for(channel)
        .lookup(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {} not found", id)))?;

    Ok(Json(JobStatusResponse::from(job)))
}

/// Delay until a requested schedule instant, clamped at zero, plus the
/// visibility time to store when the delay is positive.
fn scheduling_delay(
    schedule_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> (u64, Option<DateTime<Utc>>) {
    match schedule_at {
        Some(at) => {
            let delay_ms = (at - now).num_milliseconds().max(0) as u64;
            (delay_ms, (delay_ms > 0).then_some(at))
        }
        None => (0, None),
    }
}

/// Job options from configuration defaults.
fn job_options(state: &AppState, not_before: Option<DateTime<Utc>>) -> JobOptions {
    let queue = &state.settings.queue;
    JobOptions {
        max_attempts: queue.default_max_attempts,
        backoff: BackoffPolicy::Exponential {
            base_delay_ms: queue.backoff_base_ms,
        },
        not_before,
        retention: RetentionPolicy {
            on_success: RetentionLimit::Count(queue.keep_completed),
            on_failure: RetentionLimit::Count(queue.keep_failed),
        },
    }
}

fn admission_response(job_id: Uuid, queue: &str, delay_ms: u64) -> AdmissionResponse {
    AdmissionResponse {
        status: if delay_ms > 0 {
            AdmissionStatus::Scheduled
        } else {
            AdmissionStatus::Queued
        },
        job_id,
        queue: queue.to_string(),
        delay_ms,
    }
}
