//! HTTP webhook delivery.
//!
//! Posts each batch as JSON to `<webhook_url>/emotions`, with a bearer token
//! when one is configured.

use crate::clock::{Clock, SystemClock};
use crate::config::{DeliveryConfig, SessionConfig};
use crate::defaults;
use crate::delivery::webhook::{DeliveryOutcome, WebhookDelivery, WebhookPayload};
use crate::error::{FacecueError, Result};
use crate::expression::ExpressionEvent;
use std::sync::Arc;

pub struct HttpWebhook {
    client: reqwest::Client,
    endpoint: Option<String>,
    jwt: Option<String>,
    session: SessionConfig,
    clock: Arc<dyn Clock>,
}

impl HttpWebhook {
    pub fn new(delivery: &DeliveryConfig, session: SessionConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: delivery.webhook_url.as_deref().map(endpoint_for),
            jwt: delivery.jwt.clone(),
            session,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    async fn post(&self, endpoint: &str, events: &[ExpressionEvent]) -> Result<()> {
        let payload = WebhookPayload::new(&self.session, events, self.clock.now_ms());
        let body = serde_json::to_vec(&payload)?;

        let mut request = self
            .client
            .post(endpoint)
            .header("Content-Type", "application/json")
            .body(body);
        if let Some(jwt) = &self.jwt {
            request = request.header("Authorization", format!("Bearer {}", jwt));
        }

        let response = request.send().await.map_err(|e| FacecueError::Delivery {
            message: format!("could not send request: {}", e),
        })?;

        if !response.status().is_success() {
            return Err(FacecueError::Delivery {
                message: format!("webhook returned status {}", response.status()),
            });
        }
        Ok(())
    }
}

fn endpoint_for(base: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), defaults::WEBHOOK_PATH)
}

#[async_trait::async_trait]
impl WebhookDelivery for HttpWebhook {
    async fn deliver(&self, events: &[ExpressionEvent]) -> DeliveryOutcome {
        let Some(endpoint) = self.endpoint.as_deref() else {
            return DeliveryOutcome::NotConfigured;
        };

        match self.post(endpoint, events).await {
            Ok(()) => {
                tracing::debug!(events = events.len(), "webhook batch delivered");
                DeliveryOutcome::Sent
            }
            Err(e) => {
                tracing::warn!(endpoint = %endpoint, "{}", e);
                DeliveryOutcome::Failed
            }
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
