//! WhatsApp delivery via Meta Cloud or Twilio.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::WhatsAppConfig;
use crate::queue::{JobPayload, WhatsAppPayload};

use super::{status_is_retryable, DeliveryAdapter, DeliveryError, DeliveryReceipt};

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// WhatsApp provider backend, selected from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhatsAppProvider {
    Meta,
    Twilio,
}

impl WhatsAppProvider {
    /// Parse the configured provider name; anything unrecognized falls
    /// back to Meta Cloud.
    pub fn from_setting(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "twilio" => WhatsAppProvider::Twilio,
            _ => WhatsAppProvider::Meta,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WhatsAppProvider::Meta => "meta",
            WhatsAppProvider::Twilio => "twilio",
        }
    }
}

/// Sends WhatsApp messages through the configured provider backend.
///
/// Provider selection happens once at construction; each delivery builds a
/// provider-specific request from the tagged payload variant.
pub struct WhatsAppAdapter {
    client: reqwest::Client,
    provider: WhatsAppProvider,
    config: WhatsAppConfig,
}

impl WhatsAppAdapter {
    pub fn new(config: &WhatsAppConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            provider: WhatsAppProvider::from_setting(&config.provider),
            config: config.clone(),
        }
    }

    pub fn provider(&self) -> WhatsAppProvider {
        self.provider
    }

    async fn send_via_meta(
        &self,
        payload: &WhatsAppPayload,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let meta = &self.config.meta;
        let url = format!(
            "{}/{}/{}/messages",
            meta.graph_base_url, meta.graph_version, meta.phone_number_id
        );

        let body = match payload {
            WhatsAppPayload::Text(text) => json!({
                "messaging_product": "whatsapp",
                "to": text.to,
                "type": "text",
                "text": { "body": text.text, "preview_url": text.preview_url },
            }),
            WhatsAppPayload::Template(template) => json!({
                "messaging_product": "whatsapp",
                "to": template.to,
                "type": "template",
                "template": template.template,
            }),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&meta.access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let parsed: Value =
            serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.clone()));

        if !status.is_success() {
            return Err(DeliveryError {
                retryable: status_is_retryable(status),
                message: format!("[meta] {}: {}", status, text),
                provider_status: Some(status.as_u16()),
            });
        }

        tracing::debug!(to = %payload.to(), status = status.as_u16(), "Meta Cloud accepted message");

        Ok(DeliveryReceipt {
            provider: "meta".to_string(),
            response: parsed,
        })
    }

    async fn send_via_twilio(
        &self,
        payload: &WhatsAppPayload,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let WhatsAppPayload::Text(text) = payload else {
            return Err(DeliveryError::permanent(
                "[twilio] template messages are not supported",
            ));
        };

        let twilio = &self.config.twilio;
        let url = format!(
            "{}/Accounts/{}/Messages.json",
            TWILIO_API_BASE, twilio.account_sid
        );

        let params = [
            ("To", format!("whatsapp:{}", text.to)),
            ("From", twilio.from.clone()),
            ("Body", text.text.clone()),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(&twilio.account_sid, Some(&twilio.auth_token))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let parsed: Value =
            serde_json::from_str(&body).unwrap_or_else(|_| Value::String(body.clone()));

        if !status.is_success() {
            return Err(DeliveryError {
                retryable: status_is_retryable(status),
                message: format!("[twilio] {}: {}", status, body),
                provider_status: Some(status.as_u16()),
            });
        }

        tracing::debug!(to = %text.to, status = status.as_u16(), "Twilio accepted message");

        Ok(DeliveryReceipt {
            provider: "twilio".to_string(),
            response: parsed,
        })
    }
}

#[async_trait]
impl DeliveryAdapter for WhatsAppAdapter {
    async fn deliver(&self, payload: &JobPayload) -> Result<DeliveryReceipt, DeliveryError> {
        let JobPayload::Whatsapp(whatsapp) = payload else {
            return Err(DeliveryError::permanent(
                "whatsapp adapter received a non-whatsapp payload",
            ));
        };

        match self.provider {
            WhatsAppProvider::Meta => self.send_via_meta(whatsapp).await,
            WhatsAppProvider::Twilio => self.send_via_twilio(whatsapp).await,
        }
    }
}
