//! Webhook delivery collaborator and its payload.

use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::expression::ExpressionEvent;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Result of one delivery attempt. Only `Sent` allows removing events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent,
    NotConfigured,
    Failed,
}

/// Ships a batch of expression events to an external endpoint.
#[async_trait::async_trait]
pub trait WebhookDelivery: Send + Sync {
    async fn deliver(&self, events: &[ExpressionEvent]) -> DeliveryOutcome;

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "webhook"
    }
}

/// JSON body posted to the webhook.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload<'a> {
    pub meeting_fqn: &'a str,
    pub session_id: &'a str,
    /// Submission time in milliseconds since the Unix epoch.
    pub submitted: u64,
    pub emotions: &'a [ExpressionEvent],
    pub participant_id: &'a str,
    pub participant_name: &'a str,
    pub participant_jid: &'a str,
}

impl<'a> WebhookPayload<'a> {
    pub fn new(session: &'a SessionConfig, events: &'a [ExpressionEvent], submitted: u64) -> Self {
        Self {
            meeting_fqn: &session.meeting_fqn,
            session_id: &session.session_id,
            submitted,
            emotions: events,
            participant_id: &session.participant_id,
            participant_name: &session.participant_name,
            participant_jid: &session.participant_jid,
        }
    }
}

/// Delivery target used when no webhook is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullWebhook;

#[async_trait::async_trait]
impl WebhookDelivery for NullWebhook {
    async fn deliver(&self, _events: &[ExpressionEvent]) -> DeliveryOutcome {
        DeliveryOutcome::NotConfigured
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

/// Prints each batch as one JSON line on stdout.
#[derive(Debug, Clone, Default)]
pub struct StdoutWebhook {
    session: SessionConfig,
}

impl StdoutWebhook {
    pub fn new(session: SessionConfig) -> Self {
        Self { session }
    }
}

#[async_trait::async_trait]
impl WebhookDelivery for StdoutWebhook {
    async fn deliver(&self, events: &[ExpressionEvent]) -> DeliveryOutcome {
        let submitted = SystemClock.now_ms();
        let payload = WebhookPayload::new(&self.session, events, submitted);
        match serde_json::to_string(&payload) {
            Ok(line) => {
                println!("{}", line);
                DeliveryOutcome::Sent
            }
            Err(e) => {
                tracing::error!("could not serialize webhook payload: {}", e);
                DeliveryOutcome::Failed
            }
        }
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}

/// Webhook double that replays scripted outcomes and records every batch.
///
/// Once the script is exhausted every delivery reports `Sent`.
#[derive(Debug, Default)]
pub struct MockWebhook {
    outcomes: Mutex<VecDeque<DeliveryOutcome>>,
    batches: Mutex<Vec<Vec<ExpressionEvent>>>,
    delay: Option<Duration>,
}

impl MockWebhook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcomes<I: IntoIterator<Item = DeliveryOutcome>>(outcomes: I) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Hold every delivery for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Batches received so far, in call order.
    pub fn batches(&self) -> Vec<Vec<ExpressionEvent>> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.batches.lock().map(|b| b.len()).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl WebhookDelivery for MockWebhook {
    async fn deliver(&self, events: &[ExpressionEvent]) -> DeliveryOutcome {
        if let Ok(mut batches) = self.batches.lock() {
            batches.push(events.to_vec());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcomes
            .lock()
            .ok()
            .and_then(|mut outcomes| outcomes.pop_front())
            .unwrap_or(DeliveryOutcome::Sent)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
