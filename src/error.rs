//! Error types for facecue.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FacecueError {
    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Capability errors (feature degrades to "unavailable")
    #[error("Capability unavailable: {message}")]
    CapabilityUnavailable { message: String },

    // Capture errors
    #[error("Frame capture failed: {message}")]
    Capture { message: String },

    // Worker errors
    #[error("Detection worker disconnected")]
    WorkerDisconnected,

    #[error("Classification failed: {message}")]
    Classification { message: String },

    #[error("Worker protocol error: {0}")]
    Protocol(#[from] serde_json::Error),

    // Delivery errors
    #[error("Webhook delivery failed: {message}")]
    Delivery { message: String },

    // Pipeline driver errors
    #[error("Pipeline task is not running")]
    PipelineClosed,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl FacecueError {
    /// Shorthand for a capability failure.
    pub fn unavailable(message: impl Into<String>) -> Self {
        FacecueError::CapabilityUnavailable {
            message: message.into(),
        }
    }

    /// Returns true for errors that mean "feature not available here" rather than a fault.
    pub fn is_capability(&self) -> bool {
        matches!(self, FacecueError::CapabilityUnavailable { .. })
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, FacecueError>;
