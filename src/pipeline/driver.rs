//! Async driver: runs a [`PipelineController`] on a single tokio task.
//!
//! Host commands, worker messages, delivery ticks and delivery completions
//! are all serialized onto that task, so controller state is never shared.

use crate::delivery::{DeliveryOutcome, FlushProgress};
use crate::error::{FacecueError, Result};
use crate::pipeline::controller::PipelineController;
use crate::pipeline::state::PipelineStatus;
use crate::track::LocalTrack;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Commands accepted by the driver task. Each carries its reply channel.
pub enum PipelineCommand {
    Start(oneshot::Sender<bool>),
    Stop(oneshot::Sender<()>),
    RebindTrack(Arc<dyn LocalTrack>, oneshot::Sender<bool>),
    ResetTrack(oneshot::Sender<bool>),
    FlushNow(oneshot::Sender<Option<DeliveryOutcome>>),
    Status(oneshot::Sender<PipelineStatus>),
    Shutdown,
}

pub struct PipelineDriver;

impl PipelineDriver {
    /// Move `controller` onto its own task and return a handle to it.
    pub fn spawn(controller: PipelineController) -> PipelineHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(controller, rx));
        PipelineHandle { commands: tx, task }
    }
}

type FlushReply = oneshot::Sender<Option<DeliveryOutcome>>;

async fn run(
    mut controller: PipelineController,
    mut commands: mpsc::UnboundedReceiver<PipelineCommand>,
) -> PipelineController {
    // Flush callers waiting on a delivery that is still running
    let mut flush_waiters: Vec<FlushReply> = Vec::new();

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(PipelineCommand::Shutdown) | None => break,
                Some(cmd) => execute(&mut controller, cmd, &mut flush_waiters),
            },
            event = controller.next_event() => {
                if let FlushProgress::Finished(outcome) = controller.handle_event(event) {
                    for reply in flush_waiters.drain(..) {
                        answer(reply, outcome);
                    }
                }
            }
        }
    }

    if !flush_waiters.is_empty() {
        tracing::debug!(waiting = flush_waiters.len(), "shutdown abandons pending flushes");
    }
    controller.shutdown();
    controller
}

fn answer<T>(reply: oneshot::Sender<T>, value: T) {
    // A dropped reply receiver means the caller stopped waiting
    if reply.send(value).is_err() {
        tracing::debug!("pipeline command reply dropped by caller");
    }
}

fn execute(
    controller: &mut PipelineController,
    cmd: PipelineCommand,
    flush_waiters: &mut Vec<FlushReply>,
) {
    match cmd {
        PipelineCommand::Start(reply) => answer(reply, controller.start()),
        PipelineCommand::Stop(reply) => {
            controller.stop();
            answer(reply, ());
        }
        PipelineCommand::RebindTrack(track, reply) => {
            answer(reply, controller.rebind_track(track.as_ref()))
        }
        PipelineCommand::ResetTrack(reply) => answer(reply, controller.reset_track()),
        PipelineCommand::FlushNow(reply) => match controller.request_flush() {
            FlushProgress::Finished(outcome) => answer(reply, outcome),
            FlushProgress::Pending | FlushProgress::Idle => flush_waiters.push(reply),
        },
        PipelineCommand::Status(reply) => answer(reply, controller.status()),
        PipelineCommand::Shutdown => {}
    }
}

/// Handle to a pipeline running on the driver task.
pub struct PipelineHandle {
    commands: mpsc::UnboundedSender<PipelineCommand>,
    task: JoinHandle<PipelineController>,
}

impl PipelineHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> PipelineCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .map_err(|_| FacecueError::PipelineClosed)?;
        rx.await.map_err(|_| FacecueError::PipelineClosed)
    }

    /// Returns whether the pipeline entered Running.
    pub async fn start(&self) -> Result<bool> {
        self.request(PipelineCommand::Start).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(PipelineCommand::Stop).await
    }

    pub async fn rebind_track(&self, track: Arc<dyn LocalTrack>) -> Result<bool> {
        self.request(|reply| PipelineCommand::RebindTrack(track, reply))
            .await
    }

    pub async fn reset_track(&self) -> Result<bool> {
        self.request(PipelineCommand::ResetTrack).await
    }

    /// Deliver the buffer now and wait for the outcome.
    ///
    /// The pipeline keeps running while the delivery is under way; a
    /// shutdown before it finishes fails the request with
    /// [`FacecueError::PipelineClosed`].
    pub async fn flush_now(&self) -> Result<Option<DeliveryOutcome>> {
        self.request(PipelineCommand::FlushNow).await
    }

    pub async fn status(&self) -> Result<PipelineStatus> {
        self.request(PipelineCommand::Status).await
    }

    /// Stop the pipeline, terminate the worker and hand the controller back.
    pub async fn shutdown(self) -> Result<PipelineController> {
        if self.commands.send(PipelineCommand::Shutdown).is_err() {
            tracing::debug!("pipeline task already finished");
        }
        self.task
            .await
            .map_err(|e| FacecueError::Other(format!("pipeline task failed: {}", e)))
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}
