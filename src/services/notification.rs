//! Payment-completion notification.
//!
//! The bot process owns the Telegram connection; this service only forwards a
//! notification request to its internal HTTP endpoint. Delivery is
//! best-effort: the call is bounded by a timeout, never retried, and failure
//! is logged without surfacing to the payment protocol.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::NotifierConfig;

#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    #[error("notification request failed: {message}")]
    Request { message: String },

    #[error("notifier returned HTTP {status}")]
    Status { status: u16 },
}

#[async_trait]
pub trait PaymentNotifier: Send + Sync {
    async fn payment_completed(
        &self,
        telegram_id: i64,
        amount: &BigDecimal,
    ) -> Result<(), NotifyError>;
}

/// Forwards notification requests to the bot's internal endpoint.
pub struct HttpNotifier {
    client: Client,
    url: String,
}

impl HttpNotifier {
    pub fn new(config: &NotifierConfig) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotifyError::Request {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl PaymentNotifier for HttpNotifier {
    async fn payment_completed(
        &self,
        telegram_id: i64,
        amount: &BigDecimal,
    ) -> Result<(), NotifyError> {
        let payload = serde_json::json!({
            "telegramId": telegram_id,
            "amount": amount.to_string(),
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Request {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(NotifyError::Status {
                status: response.status().as_u16(),
            });
        }

        info!(telegram_id, "payment notification forwarded to bot");
        Ok(())
    }
}
