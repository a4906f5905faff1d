//! Error reporting for pipeline components.

use crate::error::FacecueError;
use std::fmt;
use std::sync::Mutex;

/// A failure raised by one pipeline component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentError {
    /// The component keeps working; the pipeline may degrade to Idle.
    Recoverable(String),
    /// The component is gone and has to be rebuilt.
    Fatal(String),
}

impl ComponentError {
    /// Classify a crate error by whether the component survives it.
    pub fn from_error(error: &FacecueError) -> Self {
        match error {
            FacecueError::WorkerDisconnected => ComponentError::Fatal(error.to_string()),
            _ => ComponentError::Recoverable(error.to_string()),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ComponentError::Fatal(_))
    }
}

impl fmt::Display for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentError::Recoverable(msg) => write!(f, "Recoverable error: {}", msg),
            ComponentError::Fatal(msg) => write!(f, "Fatal error: {}", msg),
        }
    }
}

impl std::error::Error for ComponentError {}

/// Trait for reporting component errors.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error from a component.
    fn report(&self, component: &str, error: &ComponentError);
}

/// Reporter that forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, component: &str, error: &ComponentError) {
        match error {
            ComponentError::Recoverable(_) => tracing::warn!(component, "{}", error),
            ComponentError::Fatal(_) => tracing::error!(component, "{}", error),
        }
    }
}

/// Reporter that keeps every report, for assertions.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    reports: Mutex<Vec<(String, ComponentError)>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(String, ComponentError)> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, component: &str, error: &ComponentError) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push((component.to_string(), error.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_error_display() {
        let recoverable = ComponentError::Recoverable("temporary failure".to_string());
        assert_eq!(
            recoverable.to_string(),
            "Recoverable error: temporary failure"
        );

        let fatal = ComponentError::Fatal("critical failure".to_string());
        assert_eq!(fatal.to_string(), "Fatal error: critical failure");
    }

    #[test]
    fn test_from_error_severity() {
        assert!(ComponentError::from_error(&FacecueError::WorkerDisconnected).is_fatal());
        assert!(!ComponentError::from_error(&FacecueError::unavailable("no worker")).is_fatal());
    }

    #[test]
    fn test_log_reporter() {
        let reporter = LogReporter;
        let error = ComponentError::Recoverable("test error".to_string());
        // Just ensure it doesn't panic
        reporter.report("worker", &error);
    }

    #[test]
    fn test_collecting_reporter_keeps_order() {
        let reporter = CollectingReporter::new();
        reporter.report("worker", &ComponentError::Fatal("gone".to_string()));
        reporter.report("capture", &ComponentError::Recoverable("blank".to_string()));

        let reports = reporter.reports();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].0, "worker");
        assert_eq!(reports[1].1, ComponentError::Recoverable("blank".to_string()));
    }
}
