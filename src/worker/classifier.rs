use crate::defaults;
use crate::error::{FacecueError, Result};
use crate::track::Frame;
use std::collections::VecDeque;
use tokio::sync::oneshot;

/// Per-frame facial expression inference, run inside the detection worker.
///
/// This trait allows swapping implementations (real model vs scripted).
pub trait ExpressionClassifier: Send {
    /// Load classification models from `base_url`.
    fn load_models(&mut self, base_url: &str) -> Result<()>;

    /// Compute backend in use, reported to the pipeline as `tf-backend`.
    fn backend(&self) -> &str;

    /// Classify one frame. `None` means no face was confidently classified.
    fn classify(&mut self, frame: &Frame) -> Result<Option<String>>;
}

/// Classifier that replays a fixed sequence of labels, one per frame.
///
/// Empty strings in the script stand for "no confident classification".
/// Once the script is exhausted every frame yields `None`.
#[derive(Debug)]
pub struct ScriptedClassifier {
    backend: String,
    script: VecDeque<String>,
    models_url: Option<String>,
    fail_models: bool,
    exhausted_tx: Option<oneshot::Sender<()>>,
}

impl ScriptedClassifier {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            backend: defaults::BACKEND_WEBGL.to_string(),
            script: labels.into_iter().map(Into::into).collect(),
            models_url: None,
            fail_models: false,
            exhausted_tx: None,
        }
    }

    /// Report a different compute backend.
    pub fn with_backend(mut self, backend: &str) -> Self {
        self.backend = backend.to_string();
        self
    }

    /// Fail model loading.
    pub fn with_model_failure(mut self) -> Self {
        self.fail_models = true;
        self
    }

    /// Signal `tx` the first time a frame arrives after the script ran out.
    pub fn with_exhausted_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.exhausted_tx = Some(tx);
        self
    }

    pub fn models_url(&self) -> Option<&str> {
        self.models_url.as_deref()
    }
}

impl ExpressionClassifier for ScriptedClassifier {
    fn load_models(&mut self, base_url: &str) -> Result<()> {
        if self.fail_models {
            return Err(FacecueError::Classification {
                message: format!("could not load models from '{}'", base_url),
            });
        }
        self.models_url = Some(base_url.to_string());
        Ok(())
    }

    fn backend(&self) -> &str {
        &self.backend
    }

    fn classify(&mut self, _frame: &Frame) -> Result<Option<String>> {
        match self.script.pop_front() {
            Some(label) if label.is_empty() => Ok(None),
            Some(label) => Ok(Some(label)),
            None => {
                if let Some(tx) = self.exhausted_tx.take()
                    && tx.send(()).is_err()
                {
                    tracing::trace!("script exhaustion signal had no listener");
                }
                Ok(None)
            }
        }
    }
}
