//! Detection worker: background classification and its message protocol.

pub mod channel;
pub mod classifier;
pub mod protocol;

pub use channel::{ThreadWorkerHost, UnavailableWorkerHost, WorkerChannel, WorkerHost};
pub use classifier::{ExpressionClassifier, ScriptedClassifier};
pub use protocol::{BackendKind, HostMessage, WorkerMessage};
