//! facecue - Facial expression events for conference webhooks
//!
//! Collapses per-frame expression classifications into timed events and
//! delivers them in periodic batches.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod clock;
pub mod config;
pub mod defaults;
pub mod delivery;
pub mod error;
pub mod expression;
pub mod logging;
pub mod pipeline;
pub mod replay;
pub mod track;
pub mod worker;

// Collaborator seams (video in, classification, webhook out)
pub use delivery::webhook::WebhookDelivery;
pub use track::{CaptureFactory, CaptureHandle, LocalTrack, VideoSource};
pub use worker::{ExpressionClassifier, WorkerHost};

// Pipeline
pub use pipeline::{Phase, PipelineController, PipelineDriver, PipelineHandle, PipelineStatus};

// Error handling
pub use error::{FacecueError, Result};

// Config
pub use config::Config;

// Events
pub use expression::{DurationUnit, ExpressionEvent};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
