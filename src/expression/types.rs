//! Data types for expression events.

use crate::defaults;
use crate::worker::protocol::BackendKind;
use serde::{Deserialize, Serialize};

/// Expected time between classifications, resolved from the worker's backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionInterval {
    /// The worker has not reported a recognized backend.
    #[default]
    Unresolved,
    Millis(u64),
}

impl DetectionInterval {
    /// Resolve the interval for `backend` using the configured per-backend values.
    pub fn for_backend(backend: &BackendKind, webgl_ms: u64, cpu_ms: u64) -> Self {
        match backend {
            BackendKind::Webgl => DetectionInterval::Millis(webgl_ms),
            BackendKind::Cpu => DetectionInterval::Millis(cpu_ms),
            BackendKind::Other(_) => DetectionInterval::Unresolved,
        }
    }

    /// Wire representation: milliseconds, or `-1` when unresolved.
    pub fn as_raw(&self) -> i64 {
        match self {
            DetectionInterval::Unresolved => defaults::UNRESOLVED_INTERVAL,
            DetectionInterval::Millis(ms) => *ms as i64,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, DetectionInterval::Millis(_))
    }
}

/// Unit of [`ExpressionEvent::duration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationUnit {
    Seconds,
    /// Raw classification count; the detection interval was unknown.
    Frames,
}

/// One run of identical classifications, collapsed into a timed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionEvent {
    #[serde(rename = "emotion")]
    pub label: String,
    pub duration: f64,
    pub unit: DurationUnit,
    /// When the run started, in milliseconds since the Unix epoch.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
}

impl ExpressionEvent {
    /// Build the event for a run of `occurrences` frames.
    pub fn from_run(
        label: impl Into<String>,
        occurrences: u64,
        timestamp_ms: u64,
        interval: DetectionInterval,
    ) -> Self {
        let (duration, unit) = match interval {
            DetectionInterval::Millis(ms) => {
                (occurrences as f64 * (ms as f64 / 1000.0), DurationUnit::Seconds)
            }
            DetectionInterval::Unresolved => (occurrences as f64, DurationUnit::Frames),
        };
        Self {
            label: label.into(),
            duration,
            unit,
            timestamp_ms,
        }
    }
}
