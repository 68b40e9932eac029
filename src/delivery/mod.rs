//! Delivery adapters: the channel-specific outbound send.
//!
//! An adapter turns a job payload into one call against an external
//! provider and returns a normalized receipt, or a `DeliveryError` that
//! tells the dispatcher whether the attempt may be retried.

mod email;
mod whatsapp;

pub use email::MailServiceAdapter;
pub use whatsapp::{WhatsAppAdapter, WhatsAppProvider};

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::Settings;
use crate::queue::{Channel, JobPayload};

/// Adapter-level failure, classified for the retry loop.
///
/// Failures are retryable by default (at-least-once semantics); an adapter
/// marks a failure non-retryable only when the provider signaled a
/// permanent rejection.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DeliveryError {
    pub retryable: bool,
    pub message: String,
    pub provider_status: Option<u16>,
}

impl DeliveryError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            retryable: true,
            message: message.into(),
            provider_status: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            retryable: false,
            message: message.into(),
            provider_status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.provider_status = Some(status);
        self
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            retryable: true,
            message: format!("transport error: {}", err),
            provider_status: err.status().map(|s| s.as_u16()),
        }
    }
}

/// Whether a provider HTTP status is worth retrying.
///
/// Server errors and throttling are transient; other client errors mean
/// the provider rejected the request permanently (e.g. invalid recipient).
pub(crate) fn status_is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || matches!(status.as_u16(), 408 | 429)
}

/// Normalized output of a successful delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Provider that accepted the message
    pub provider: String,
    /// Raw provider response body
    pub response: Value,
}

/// Performs the external send for one channel.
#[async_trait]
pub trait DeliveryAdapter: Send + Sync {
    async fn deliver(&self, payload: &JobPayload) -> Result<DeliveryReceipt, DeliveryError>;
}

/// Create the delivery adapter for a channel from configuration.
///
/// Provider selection for WhatsApp is a pure function of the settings,
/// evaluated once here.
pub fn create_delivery_adapter(channel: Channel, settings: &Settings) -> Arc<dyn DeliveryAdapter> {
    match channel {
        Channel::Email => {
            tracing::info!(
                channel = "email",
                base_url = %settings.mail.base_url,
                "Creating mail service adapter"
            );
            Arc::new(MailServiceAdapter::new(&settings.mail))
        }
        Channel::Whatsapp => {
            let provider = WhatsAppProvider::from_setting(&settings.whatsapp.provider);
            tracing::info!(
                channel = "whatsapp",
                provider = provider.as_str(),
                "Creating WhatsApp adapter"
            );
            Arc::new(WhatsAppAdapter::new(&settings.whatsapp))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_status_classification() {
        assert!(status_is_retryable(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(status_is_retryable(StatusCode::BAD_GATEWAY));
        assert!(status_is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(status_is_retryable(StatusCode::REQUEST_TIMEOUT));

        assert!(!status_is_retryable(StatusCode::BAD_REQUEST));
        assert!(!status_is_retryable(StatusCode::NOT_FOUND));
        assert!(!status_is_retryable(StatusCode::UNPROCESSABLE_ENTITY));
    }

    #[test]
    fn test_delivery_error_constructors() {
        let err = DeliveryError::retryable("timeout").with_status(503);
        assert!(err.retryable);
        assert_eq!(err.provider_status, Some(503));

        let err = DeliveryError::permanent("invalid number");
        assert!(!err.retryable);
        assert_eq!(err.to_string(), "invalid number");
    }
}
