//! JSON message protocol between the pipeline and the detection worker.

use crate::defaults;
use crate::track::Frame;
use serde::{Deserialize, Serialize};

/// Messages sent by the pipeline to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "id")]
pub enum HostMessage {
    /// Where to load classification models from. Sent once after spawn.
    #[serde(rename = "SET_MODELS_URL")]
    SetModelsUrl { url: String },
    /// Cancel any pending detection the worker has scheduled.
    #[serde(rename = "CLEAR_TIMEOUT")]
    ClearTimeout,
    /// Schedule a detection on this frame.
    #[serde(rename = "SET_TIMEOUT")]
    SubmitFrame { frame: Frame },
}

impl HostMessage {
    /// Serialize message to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize message from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Messages sent by the worker back to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum WorkerMessage {
    /// Compute backend the worker settled on.
    #[serde(rename = "tf-backend")]
    Backend(String),
    /// Classification of the last submitted frame. Empty means no confident result.
    #[serde(rename = "facial-expression")]
    FacialExpression(String),
}

impl WorkerMessage {
    /// Serialize message to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize message from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Compute backend reported through `tf-backend`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    Webgl,
    Cpu,
    Other(String),
}

impl BackendKind {
    pub fn parse(value: &str) -> Self {
        match value {
            defaults::BACKEND_WEBGL => BackendKind::Webgl,
            defaults::BACKEND_CPU => BackendKind::Cpu,
            other => BackendKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            BackendKind::Webgl => defaults::BACKEND_WEBGL,
            BackendKind::Cpu => defaults::BACKEND_CPU,
            BackendKind::Other(name) => name,
        }
    }
}
