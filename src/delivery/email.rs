//! Email delivery via the external mail-sending service.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::MailConfig;
use crate::queue::JobPayload;

use super::{DeliveryAdapter, DeliveryError, DeliveryReceipt};

const PROVIDER: &str = "mail-service";

/// Forwards the normalized email payload to the mail service over HTTP.
///
/// Any non-2xx response or transport error is a retryable failure; the
/// mail service owns permanent rejection handling on its side.
pub struct MailServiceAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl MailServiceAdapter {
    pub fn new(config: &MailConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl DeliveryAdapter for MailServiceAdapter {
    async fn deliver(&self, payload: &JobPayload) -> Result<DeliveryReceipt, DeliveryError> {
        let JobPayload::Email(email) = payload else {
            return Err(DeliveryError::permanent(
                "email adapter received a non-email payload",
            ));
        };

        let mut request = self.client.post(&self.base_url).json(email);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        let body: Value =
            serde_json::from_str(&body).unwrap_or_else(|_| Value::String(body.clone()));

        if !status.is_success() {
            // The mail service treats every non-2xx as transient
            let err = DeliveryError {
                retryable: true,
                message: format!("[{}] {}: {}", PROVIDER, status, body),
                provider_status: Some(status.as_u16()),
            };
            return Err(err);
        }

        tracing::debug!(to = %email.to, status = status.as_u16(), "Mail service accepted message");

        Ok(DeliveryReceipt {
            provider: PROVIDER.to_string(),
            response: body,
        })
    }
}
