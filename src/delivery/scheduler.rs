//! Periodic webhook delivery of the expression buffer.
//!
//! The scheduler owns the delivery timer and at most one in-flight delivery.
//! The timer is armed and cancelled by the lifecycle controller; the buffer
//! itself stays with the controller and is only borrowed here.

use crate::delivery::buffer::DeliveryBuffer;
use crate::delivery::webhook::{DeliveryOutcome, WebhookDelivery};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Shortest accepted delivery period.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Result of a finished delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Number of buffered events the attempt carried.
    pub batch_len: usize,
    pub outcome: DeliveryOutcome,
}

/// Input the scheduler wants the owner to react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerEvent {
    Tick,
    Completed(DeliveryReport),
}

/// Where an explicitly requested flush stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushProgress {
    /// No flush was involved.
    Idle,
    /// The flush waits for a delivery to finish.
    Pending,
    /// The flush is over. `None` when there was nothing to deliver.
    Finished(Option<DeliveryOutcome>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushState {
    Idle,
    /// Requested while a tick delivery was running.
    Queued,
    InFlight,
}

struct InFlight {
    batch_len: usize,
    task: JoinHandle<DeliveryOutcome>,
}

pub struct DeliveryScheduler {
    period: Duration,
    webhook: Arc<dyn WebhookDelivery>,
    armed_at: Option<Instant>,
    ticker: Option<Interval>,
    in_flight: Option<InFlight>,
    flush: FlushState,
}

impl DeliveryScheduler {
    /// Periods shorter than [`MIN_PERIOD`] are raised to it.
    pub fn new(period: Duration, webhook: Arc<dyn WebhookDelivery>) -> Self {
        if period < MIN_PERIOD {
            tracing::warn!(
                period_ms = period.as_millis() as u64,
                "delivery period too short, using {}ms",
                MIN_PERIOD.as_millis()
            );
        }
        Self {
            period: period.max(MIN_PERIOD),
            webhook,
            armed_at: None,
            ticker: None,
            in_flight: None,
            flush: FlushState::Idle,
        }
    }

    /// Arm the timer. The first tick fires one full period from now.
    pub fn start(&mut self) {
        if self.armed_at.is_none() {
            self.armed_at = Some(Instant::now());
            tracing::debug!(period_ms = self.period.as_millis() as u64, "delivery timer armed");
        }
    }

    /// Disarm the timer. An in-flight delivery is left to finish.
    pub fn cancel(&mut self) {
        if self.armed_at.take().is_some() {
            self.ticker = None;
            tracing::debug!("delivery timer cancelled");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed_at.is_some()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait for the next tick. Never resolves while the timer is disarmed.
    pub async fn tick(&mut self) {
        wait_tick(self.armed_at, self.period, &mut self.ticker).await;
    }

    /// Wait for whichever comes first: a tick or the in-flight delivery finishing.
    pub async fn next_event(&mut self) -> SchedulerEvent {
        let Self {
            period,
            armed_at,
            ticker,
            in_flight,
            ..
        } = self;
        tokio::select! {
            report = wait_completion(in_flight) => SchedulerEvent::Completed(report),
            _ = wait_tick(*armed_at, *period, ticker) => SchedulerEvent::Tick,
        }
    }

    /// Start delivering the current buffer contents on a background task.
    ///
    /// Skipped when the buffer is empty or a previous delivery is still running.
    pub fn dispatch(&mut self, buffer: &DeliveryBuffer) -> bool {
        if buffer.is_empty() {
            return false;
        }
        if self.in_flight.is_some() {
            tracing::debug!("previous delivery still in flight, skipping tick");
            return false;
        }

        let batch = buffer.snapshot();
        let batch_len = batch.len();
        let webhook = Arc::clone(&self.webhook);
        tracing::debug!(events = batch_len, target = webhook.name(), "delivering batch");

        let task = tokio::spawn(async move { webhook.deliver(&batch).await });
        self.in_flight = Some(InFlight { batch_len, task });
        true
    }

    /// Wait for the in-flight delivery to finish. Never resolves when there is none.
    pub async fn completion(&mut self) -> DeliveryReport {
        wait_completion(&mut self.in_flight).await
    }

    /// Apply a finished delivery to the buffer.
    pub fn apply(buffer: &mut DeliveryBuffer, report: DeliveryReport) {
        match report.outcome {
            DeliveryOutcome::Sent => buffer.acknowledge(report.batch_len),
            DeliveryOutcome::NotConfigured => {
                tracing::trace!(buffered = buffer.len(), "webhook not configured, keeping buffer")
            }
            DeliveryOutcome::Failed => {
                tracing::warn!(buffered = buffer.len(), "delivery failed, retrying next tick")
            }
        }
    }

    /// Ask for the buffer to be delivered right away.
    ///
    /// A running delivery is waited out first: the flush then goes out on the
    /// [`complete`](Self::complete) call that finishes it. Requests made
    /// while a flush is already in flight share its result.
    pub fn request_flush(&mut self, buffer: &DeliveryBuffer) -> FlushProgress {
        if self.in_flight.is_some() {
            if self.flush == FlushState::Idle {
                self.flush = FlushState::Queued;
            }
            return FlushProgress::Pending;
        }
        self.dispatch_flush(buffer)
    }

    fn dispatch_flush(&mut self, buffer: &DeliveryBuffer) -> FlushProgress {
        if self.dispatch(buffer) {
            self.flush = FlushState::InFlight;
            FlushProgress::Pending
        } else {
            self.flush = FlushState::Idle;
            FlushProgress::Finished(None)
        }
    }

    pub fn is_flush_pending(&self) -> bool {
        self.flush != FlushState::Idle
    }

    /// Apply a finished delivery to the buffer and advance a requested flush.
    pub fn complete(
        &mut self,
        buffer: &mut DeliveryBuffer,
        report: DeliveryReport,
    ) -> FlushProgress {
        Self::apply(buffer, report);
        match std::mem::replace(&mut self.flush, FlushState::Idle) {
            FlushState::Idle => FlushProgress::Idle,
            FlushState::Queued => self.dispatch_flush(buffer),
            FlushState::InFlight => FlushProgress::Finished(Some(report.outcome)),
        }
    }

    /// Deliver the buffer right away and wait for the result.
    ///
    /// For owners that can afford to wait inline; the pipeline driver goes
    /// through [`request_flush`](Self::request_flush) instead. Returns `None`
    /// if there was nothing left to deliver.
    pub async fn flush_now(&mut self, buffer: &mut DeliveryBuffer) -> Option<DeliveryOutcome> {
        let mut progress = self.request_flush(buffer);
        loop {
            match progress {
                FlushProgress::Finished(outcome) => return outcome,
                FlushProgress::Pending if self.in_flight.is_some() => {
                    let report = self.completion().await;
                    progress = self.complete(buffer, report);
                }
                FlushProgress::Pending | FlushProgress::Idle => return None,
            }
        }
    }
}

async fn wait_tick(armed_at: Option<Instant>, period: Duration, ticker: &mut Option<Interval>) {
    let Some(armed_at) = armed_at else {
        return std::future::pending().await;
    };
    let ticker = ticker.get_or_insert_with(|| {
        let mut interval = tokio::time::interval_at(armed_at + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });
    ticker.tick().await;
}

async fn wait_completion(in_flight: &mut Option<InFlight>) -> DeliveryReport {
    let Some(current) = in_flight.as_mut() else {
        return std::future::pending().await;
    };
    let outcome = match (&mut current.task).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("delivery task failed: {}", e);
            DeliveryOutcome::Failed
        }
    };
    let batch_len = current.batch_len;
    *in_flight = None;
    DeliveryReport { batch_len, outcome }
}
