//! Admission and status API request/response models.
//!
//! Request shapes follow the external interface: camelCase fields, with
//! validation applied before anything reaches the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::MailConfig;
use crate::error::AppError;
use crate::queue::{
    EmailPayload, Job, JobState, Metadata, WhatsAppPayload, WhatsAppTemplate,
    WhatsAppTemplatePayload, WhatsAppTextPayload,
};

const MAX_TEXT_LENGTH: usize = 4096;

/// Email admission request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailNotificationRequest {
    pub app: String,
    pub to: String,
    pub subject: String,
    pub html: Option<String>,
    pub text: Option<String>,
    pub from_name: Option<String>,
    pub from_email: Option<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub reply_to: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    /// Optional future delivery instant (ISO 8601)
    pub schedule_at: Option<DateTime<Utc>>,
}

impl EmailNotificationRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut issues = Vec::new();

        if self.app.len() < 2 || self.app.len() > 100 {
            issues.push("app must be 2-100 characters".to_string());
        }
        if !is_valid_email(&self.to) {
            issues.push("to must be a valid email address".to_string());
        }
        if self.subject.is_empty() || self.subject.len() > 200 {
            issues.push("subject must be 1-200 characters".to_string());
        }
        match (&self.html, &self.text) {
            (None, None) => issues.push("provide html or text".to_string()),
            (Some(_), Some(_)) => {
                issues.push("provide either html or text, not both".to_string())
            }
            (Some(h), None) if h.is_empty() => issues.push("html must not be empty".to_string()),
            (None, Some(t)) if t.is_empty() => issues.push("text must not be empty".to_string()),
            _ => {}
        }
        if let Some(name) = &self.from_name {
            if name.len() > 120 {
                issues.push("fromName must be at most 120 characters".to_string());
            }
        }
        for (field, value) in [("fromEmail", &self.from_email), ("replyTo", &self.reply_to)] {
            if let Some(addr) = value {
                if !is_valid_email(addr) {
                    issues.push(format!("{} must be a valid email address", field));
                }
            }
        }
        for (field, list) in [("cc", &self.cc), ("bcc", &self.bcc)] {
            if list.iter().any(|addr| !is_valid_email(addr)) {
                issues.push(format!("{} entries must be valid email addresses", field));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(issues.join("; ")))
        }
    }

    /// Build the job payload, applying configured sender defaults and
    /// stamping the calling app into the metadata map.
    pub fn into_payload(self, mail: &MailConfig) -> EmailPayload {
        let mut metadata = self.metadata;
        metadata.insert("app".to_string(), Value::String(self.app));

        EmailPayload {
            to: self.to,
            subject: self.subject,
            html: self.html,
            text: self.text,
            from_name: self.from_name.or_else(|| mail.default_from_name.clone()),
            from_email: self.from_email.or_else(|| mail.default_from_email.clone()),
            cc: self.cc,
            bcc: self.bcc,
            reply_to: self.reply_to,
            metadata,
        }
    }
}

/// WhatsApp admission request: free text or a template message,
/// exactly one of the two.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsAppNotificationRequest {
    pub app: String,
    /// Recipient in E.164 format
    pub to: String,
    pub text: Option<String>,
    #[serde(default)]
    pub preview_url: bool,
    pub template: Option<WhatsAppTemplate>,
    #[serde(default)]
    pub metadata: Metadata,
    /// Optional future delivery instant (ISO 8601)
    pub schedule_at: Option<DateTime<Utc>>,
}

impl WhatsAppNotificationRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut issues = Vec::new();

        if self.app.len() < 2 || self.app.len() > 100 {
            issues.push("app must be 2-100 characters".to_string());
        }
        if !is_e164(&self.to) {
            issues.push("to must be an E.164 phone number".to_string());
        }
        match (&self.text, &self.template) {
            (None, None) => issues.push("provide text or template".to_string()),
            (Some(_), Some(_)) => {
                issues.push("provide either text or template, not both".to_string())
            }
            (Some(t), None) => {
                if t.is_empty() || t.len() > MAX_TEXT_LENGTH {
                    issues.push(format!("text must be 1-{} characters", MAX_TEXT_LENGTH));
                }
            }
            (None, Some(template)) => {
                if template.name.is_empty() {
                    issues.push("template.name must not be empty".to_string());
                }
                if template.language.code.is_empty() {
                    issues.push("template.language.code must not be empty".to_string());
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(issues.join("; ")))
        }
    }

    pub fn into_payload(self) -> WhatsAppPayload {
        let mut metadata = self.metadata;
        metadata.insert("app".to_string(), Value::String(self.app));

        match self.template {
            Some(template) => WhatsAppPayload::Template(WhatsAppTemplatePayload {
                to: self.to,
                template,
                metadata,
            }),
            None => WhatsAppPayload::Text(WhatsAppTextPayload {
                to: self.to,
                text: self.text.unwrap_or_default(),
                preview_url: self.preview_url,
                metadata,
            }),
        }
    }
}

/// Admission acknowledgment, answered with HTTP 202.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    pub status: AdmissionStatus,
    pub job_id: Uuid,
    pub queue: String,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionStatus {
    Queued,
    Scheduled,
}

/// Status projection of a job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub id: Uuid,
    pub state: JobState,
    pub attempts_made: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            state: job.state,
            attempts_made: job.attempts_made,
            result: job.result,
            last_error: job.last_error,
        }
    }
}

/// Pragmatic email shape check: local part, domain with a dot.
fn is_valid_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.contains(char::is_whitespace)
}

/// E.164: a plus sign followed by 8 to 15 digits, no leading zero.
fn is_e164(value: &str) -> bool {
    let Some(digits) = value.strip_prefix('+') else {
        return false;
    };
    (8..=15).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
        && !digits.starts_with('0')
}
