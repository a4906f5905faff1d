//! Streaming run-length reduction of per-frame classifications.
//!
//! Holds at most one open run. A run is closed, and turned into an
//! [`ExpressionEvent`], when a different non-empty label arrives or when the
//! pipeline stops. Empty labels neither extend nor break a run.

use crate::expression::types::{DetectionInterval, ExpressionEvent};

/// The run currently being accumulated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingExpression {
    pub label: String,
    pub first_observed_at_ms: u64,
    /// Frames that repeated `label` after the first one.
    pub repeat_count: u64,
}

impl PendingExpression {
    pub fn occurrences(&self) -> u64 {
        self.repeat_count + 1
    }

    fn finish(self, interval: DetectionInterval) -> ExpressionEvent {
        let occurrences = self.occurrences();
        ExpressionEvent::from_run(self.label, occurrences, self.first_observed_at_ms, interval)
    }
}

#[derive(Debug, Default)]
pub struct ExpressionReducer {
    pending: Option<PendingExpression>,
}

impl ExpressionReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one classification into the current run.
    ///
    /// Returns the event for the previous run when `label` starts a new one.
    pub fn observe(
        &mut self,
        label: &str,
        now_ms: u64,
        interval: DetectionInterval,
    ) -> Option<ExpressionEvent> {
        if label.is_empty() {
            return None;
        }

        if let Some(pending) = self.pending.as_mut()
            && pending.label == label
        {
            pending.repeat_count += 1;
            return None;
        }

        let finished = self.pending.take().map(|p| p.finish(interval));
        self.pending = Some(PendingExpression {
            label: label.to_string(),
            first_observed_at_ms: now_ms,
            repeat_count: 0,
        });
        finished
    }

    /// Close the open run, if any, and reset for the next session.
    pub fn flush(&mut self, interval: DetectionInterval) -> Option<ExpressionEvent> {
        self.pending.take().map(|p| p.finish(interval))
    }

    pub fn pending(&self) -> Option<&PendingExpression> {
        self.pending.as_ref()
    }
}
