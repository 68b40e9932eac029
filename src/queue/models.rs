//! Job model shared by all queue backends.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Arbitrary string-keyed metadata attached to a job payload.
pub type Metadata = HashMap<String, Value>;

/// Notification channel, each with its own queue and delivery adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Whatsapp,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Whatsapp => "whatsapp",
        }
    }

    /// Logical queue name, visible in admission responses.
    pub fn queue_name(&self) -> &'static str {
        match self {
            Channel::Email => "email-queue",
            Channel::Whatsapp => "whatsapp-queue",
        }
    }

    pub const ALL: [Channel; 2] = [Channel::Email, Channel::Whatsapp];
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Channel::Email),
            "whatsapp" => Ok(Channel::Whatsapp),
            other => Err(format!("unknown channel: {}", other)),
        }
    }
}

/// Job lifecycle state.
///
/// `waiting`/`delayed` jobs are claimable (delayed ones only once their
/// visibility time has passed); `active` jobs are held by exactly one
/// worker; `completed` and `failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Delayed => "delayed",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delay policy applied between retried delivery attempts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackoffPolicy {
    /// Delay is always `base_delay_ms`.
    Fixed { base_delay_ms: u64 },
    /// Delay for the k-th retry is `base_delay_ms * 2^(k-1)`.
    Exponential { base_delay_ms: u64 },
}

/// How long a terminal job stays queryable before retention removes it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionLimit {
    /// Keep at most this many terminal jobs with the same outcome.
    Count(u64),
    /// Keep the job for this many seconds after it finished.
    AgeSeconds(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub on_success: RetentionLimit,
    pub on_failure: RetentionLimit,
}

/// Per-job execution options, fixed at enqueue time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOptions {
    /// Total delivery attempts before the job fails terminally (>= 1)
    pub max_attempts: u32,
    /// Backoff policy between retried attempts
    pub backoff: BackoffPolicy,
    /// Requested visibility time; jobs scheduled in the future start delayed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
    /// Retention of the terminal record
    pub retention: RetentionPolicy,
}

/// Normalized email delivery data, forwarded to the mail service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailPayload {
    pub to: String,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_email: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

/// WhatsApp delivery data: either a free-text message or a structured
/// template message, distinguished by an explicit discriminant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WhatsAppPayload {
    Text(WhatsAppTextPayload),
    Template(WhatsAppTemplatePayload),
}

impl WhatsAppPayload {
    /// Recipient in E.164 format.
    pub fn to(&self) -> &str {
        match self {
            WhatsAppPayload::Text(p) => &p.to,
            WhatsAppPayload::Template(p) => &p.to,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsAppTextPayload {
    pub to: String,
    pub text: String,
    #[serde(default)]
    pub preview_url: bool,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsAppTemplatePayload {
    pub to: String,
    pub template: WhatsAppTemplate,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppTemplate {
    pub name: String,
    pub language: TemplateLanguage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<TemplateComponent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateLanguage {
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateComponent {
    #[serde(rename = "type")]
    pub kind: TemplateComponentKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<TemplateParameter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateComponentKind {
    Header,
    Body,
    Button,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TemplateParameter {
    Text { text: String },
}

/// Channel-specific delivery data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "lowercase")]
pub enum JobPayload {
    Email(EmailPayload),
    Whatsapp(WhatsAppPayload),
}

impl JobPayload {
    pub fn channel(&self) -> Channel {
        match self {
            JobPayload::Email(_) => Channel::Email,
            JobPayload::Whatsapp(_) => Channel::Whatsapp,
        }
    }
}

/// One unit of requested notification delivery with its own lifecycle
/// and retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub channel: Channel,
    pub payload: JobPayload,
    pub options: JobOptions,
    pub state: JobState,
    /// Attempts started so far; incremented when a worker claims the job
    pub attempts_made: u32,
    /// Last failure description, set on failed attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Normalized delivery adapter output, set only on completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub created_at: DateTime<Utc>,
    /// Current visibility time; updated when a retry is scheduled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Build a fresh job record. Jobs scheduled in the future start
    /// `delayed`; everything else starts `waiting`.
    pub fn new(payload: JobPayload, options: JobOptions, now: DateTime<Utc>) -> Self {
        let channel = payload.channel();
        let not_before = options.not_before.filter(|t| *t > now);
        let state = if not_before.is_some() {
            JobState::Delayed
        } else {
            JobState::Waiting
        };

        Self {
            id: Uuid::new_v4(),
            channel,
            payload,
            options,
            state,
            attempts_made: 0,
            last_error: None,
            result: None,
            created_at: now,
            not_before,
            finished_at: None,
        }
    }

    /// Whether a worker may claim this job at `now`.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            JobState::Waiting => true,
            JobState::Delayed => self.not_before.map(|t| t <= now).unwrap_or(true),
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Visibility time used for ready-queue ordering.
    pub fn visible_at(&self) -> DateTime<Utc> {
        self.not_before.unwrap_or(self.created_at)
    }

    /// Retention limit that applies to this job's terminal outcome.
    pub fn retention_limit(&self) -> RetentionLimit {
        match self.state {
            JobState::Failed => self.options.retention.on_failure,
            _ => self.options.retention.on_success,
        }
    }
}
