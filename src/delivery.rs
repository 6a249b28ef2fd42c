//! Webhook delivery with bounded retries
//!
//! Each attempt is one awaited POST. Only HTTP 200 counts as delivered; any
//! other status or a transport failure uses up one attempt and the next one
//! starts immediately. There is no backoff between attempts.

use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::WebhookConfig;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// How a single attempt ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Delivered,
    Rejected,
    TransportError,
}

/// One delivery attempt, kept for retry decisions and logging only
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryAttempt {
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub http_status: Option<u16>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub delivered: bool,
    pub attempts: Vec<DeliveryAttempt>,
}

impl DeliveryReport {
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }
}

pub struct DeliveryClient {
    client: reqwest::Client,
    url: String,
    max_attempts: u32,
}

impl DeliveryClient {
    pub fn new(config: &WebhookConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(DeliveryError::Client)?;

        Ok(Self {
            client,
            url: config.url.clone(),
            max_attempts: config.retries.max(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST `payload` until the endpoint answers 200 or attempts run out
    ///
    /// Exhausting the attempts is reported through `DeliveryReport::delivered`,
    /// not as an error. Serialization failures abort before any attempt.
    pub async fn deliver<T: Serialize + ?Sized>(
        &self,
        payload: &T,
    ) -> Result<DeliveryReport, DeliveryError> {
        let body = serde_json::to_vec(payload)?;
        let mut attempts = Vec::new();

        for attempt in 1..=self.max_attempts {
            info!(
                "Sending data to webhook (attempt {}/{})",
                attempt, self.max_attempts
            );

            let record = self.attempt(attempt, body.clone()).await;
            let delivered = record.outcome == AttemptOutcome::Delivered;
            attempts.push(record);

            if delivered {
                info!("Data sent successfully to webhook");
                return Ok(DeliveryReport {
                    delivered: true,
                    attempts,
                });
            }
        }

        error!("All {} delivery attempts failed", self.max_attempts);
        Ok(DeliveryReport {
            delivered: false,
            attempts,
        })
    }

    async fn attempt(&self, attempt: u32, body: Vec<u8>) -> DeliveryAttempt {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                info!(status = status.as_u16(), "Webhook response: {}", text);

                if status == reqwest::StatusCode::OK {
                    DeliveryAttempt {
                        attempt,
                        outcome: AttemptOutcome::Delivered,
                        http_status: Some(status.as_u16()),
                        error: None,
                    }
                } else {
                    warn!("Webhook returned non-200 status: {}", status);
                    DeliveryAttempt {
                        attempt,
                        outcome: AttemptOutcome::Rejected,
                        http_status: Some(status.as_u16()),
                        error: None,
                    }
                }
            }
            Err(e) => {
                error!(
                    "Request failed (attempt {}/{}): {}",
                    attempt, self.max_attempts, e
                );
                DeliveryAttempt {
                    attempt,
                    outcome: AttemptOutcome::TransportError,
                    http_status: e.status().map(|s| s.as_u16()),
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
