//! Lifecycle phase and the status snapshot exposed to hosts.

use crate::expression::ExpressionTotals;
use serde::Serialize;

/// Lifecycle phase of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Running,
}

impl Phase {
    pub fn is_running(&self) -> bool {
        matches!(self, Phase::Running)
    }
}

/// Point-in-time view of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStatus {
    pub phase: Phase,
    pub worker_loaded: bool,
    pub capture_bound: bool,
    /// Backend the worker reported, if any.
    pub backend: Option<String>,
    /// Detection interval in milliseconds, `-1` while unresolved.
    pub detection_interval_ms: i64,
    pub frames_submitted: u64,
    pub buffered_events: usize,
    pub delivery_in_flight: bool,
    pub totals: ExpressionTotals,
}

impl PipelineStatus {
    /// Serialize the status as a single JSON line.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
