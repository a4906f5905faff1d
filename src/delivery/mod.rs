//! Buffered, periodic delivery of expression events to a webhook.

pub mod buffer;
#[cfg(feature = "webhook")]
pub mod http;
pub mod scheduler;
pub mod webhook;

pub use buffer::DeliveryBuffer;
#[cfg(feature = "webhook")]
pub use http::HttpWebhook;
pub use scheduler::{DeliveryReport, DeliveryScheduler, FlushProgress, SchedulerEvent};
pub use webhook::{
    DeliveryOutcome, MockWebhook, NullWebhook, StdoutWebhook, WebhookDelivery, WebhookPayload,
};
