//! Replay: drives the full pipeline from a label script.
//!
//! A scripted classifier stands in for the ML model and a synthetic capture
//! device stands in for the camera, so a configuration (intervals, webhook,
//! session identity) can be exercised end to end without either.

use crate::config::Config;
use crate::delivery::{DeliveryOutcome, NullWebhook, StdoutWebhook, WebhookDelivery};
use crate::error::{FacecueError, Result};
use crate::pipeline::{PipelineController, PipelineDriver, PipelineStatus};
use crate::track::{LocalTrack, StaticTrack, StaticVideoSource, SyntheticCaptureFactory};
use crate::worker::{ScriptedClassifier, ThreadWorkerHost};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Track id reported by the synthetic camera.
pub const REPLAY_TRACK_ID: &str = "replay";

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// One classification per frame; empty means no confident classification.
    pub script: Vec<String>,
    /// Backend the scripted classifier reports.
    pub backend: String,
    /// Worker delay between receiving a frame and classifying it.
    pub pace: Duration,
    /// Print batches as JSON lines instead of posting them.
    pub to_stdout: bool,
}

#[derive(Debug, Clone)]
pub struct ReplaySummary {
    /// Outcome of the final flush, `None` if nothing was left to deliver.
    pub final_delivery: Option<DeliveryOutcome>,
    pub status: PipelineStatus,
}

/// Parse a label script: one label per line, blank lines for "no face",
/// `#` lines ignored.
pub fn parse_script(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .map(|line| line.trim().to_string())
        .collect()
}

fn build_webhook(config: &Config, to_stdout: bool) -> Arc<dyn WebhookDelivery> {
    if to_stdout {
        return Arc::new(StdoutWebhook::new(config.session.clone()));
    }
    #[cfg(feature = "webhook")]
    {
        if config.delivery.webhook_url.is_some() {
            return Arc::new(crate::delivery::HttpWebhook::new(
                &config.delivery,
                config.session.clone(),
            ));
        }
    }
    tracing::warn!("no webhook configured, events stay buffered");
    Arc::new(NullWebhook)
}

/// Run the script through a live pipeline, then stop and flush.
pub async fn run_replay(config: Config, options: ReplayOptions) -> Result<ReplaySummary> {
    let webhook = build_webhook(&config, options.to_stdout);
    let frames = options.script.len();

    let (done_tx, done_rx) = oneshot::channel();
    let classifier = ScriptedClassifier::new(options.script)
        .with_backend(&options.backend)
        .with_exhausted_signal(done_tx);
    let host = ThreadWorkerHost::once(classifier).with_pacing(options.pace);

    let track: Arc<dyn LocalTrack> = Arc::new(StaticTrack::video(REPLAY_TRACK_ID));
    let source = StaticVideoSource::new(Some(track));
    let mut controller = PipelineController::new(
        config,
        Arc::new(source),
        Arc::new(SyntheticCaptureFactory::default()),
        webhook,
    );

    if !controller.load_worker(&host) {
        return Err(FacecueError::unavailable("detection worker could not be loaded"));
    }
    if !controller.phase().is_running() {
        return Err(FacecueError::unavailable("pipeline did not start"));
    }

    tracing::info!(frames, "replaying script");
    let handle = PipelineDriver::spawn(controller);

    if done_rx.await.is_err() {
        tracing::warn!("worker exited before the script finished");
    }

    handle.stop().await?;
    let final_delivery = handle.flush_now().await?;
    let status = handle.status().await?;
    handle.shutdown().await?;

    Ok(ReplaySummary {
        final_delivery,
        status,
    })
}
