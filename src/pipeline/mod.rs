//! Expression pipeline lifecycle.
//!
//! [`PipelineController`] is the Idle/Running state machine; [`PipelineDriver`]
//! runs it on a tokio task and exposes a [`PipelineHandle`] to hosts.

pub mod controller;
pub mod driver;
pub mod error;
pub mod state;

pub use controller::{PipelineController, PipelineEvent};
pub use driver::{PipelineCommand, PipelineDriver, PipelineHandle};
pub use error::{CollectingReporter, ComponentError, ErrorReporter, LogReporter};
pub use state::{Phase, PipelineStatus};
