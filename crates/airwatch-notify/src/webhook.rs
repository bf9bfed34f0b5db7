use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::channel::{Alert, NotificationChannel};
use crate::error::NotifyError;

/// Discord-style webhook channel.
///
/// Posts one embed per alert with fixed Price/Airline/Route/Departure fields.
/// Failed attempts are retried with exponential backoff up to `max_attempts`
/// total attempts; every attempt is bounded by `timeout`.
#[derive(Clone)]
pub struct WebhookChannel {
    url: String,
    client: Client,
    timeout: Duration,
    max_attempts: u8,
    backoff: Duration,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total attempts per alert, including the first. At least one.
    pub fn with_attempts(mut self, attempts: u8) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn post_once(&self, payload: &WebhookPayload) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), NotifyError> {
        let payload = WebhookPayload::from_alert(alert);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            match self.post_once(&payload).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.max_attempts => {
                    debug!(attempt, error = %e, "Webhook attempt failed, retrying");
                    tokio::time::sleep(self.backoff * (1u32 << (attempt - 1).min(10))).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

const EMBED_COLOR: u32 = 0x2E_CC71;

#[derive(Debug, Serialize, PartialEq)]
struct EmbedField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Debug, Serialize, PartialEq)]
struct Embed {
    title: String,
    description: String,
    color: u32,
    fields: Vec<EmbedField>,
    timestamp: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct WebhookPayload {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl WebhookPayload {
    fn from_alert(alert: &Alert) -> Self {
        let field = |name: &str, value: String, inline: bool| EmbedField {
            name: name.to_string(),
            value: if value.is_empty() { "-".to_string() } else { value },
            inline,
        };
        let flight = &alert.flight;

        Self {
            content: None,
            embeds: vec![Embed {
                title: format!("Price drop: {}", alert.route_label()),
                description: format!(
                    "{} is ${} below your ${} alert threshold.",
                    flight.carrier,
                    alert.savings(),
                    alert.threshold
                ),
                color: EMBED_COLOR,
                fields: vec![
                    field("Price", format!("${}", flight.price), true),
                    field("Airline", flight.carrier.clone(), true),
                    field("Route", alert.route_label(), false),
                    field("Departure", flight.departure.clone(), true),
                    field("Source", flight.source.clone(), true),
                ],
                timestamp: alert.triggered_at.to_rfc3339(),
            }],
        }
    }
}
