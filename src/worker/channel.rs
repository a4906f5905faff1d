//! Detection worker: a classifier running on its own thread, reached only
//! through typed messages.
//!
//! Host→worker messages travel over a crossbeam channel (the worker thread
//! blocks on it); worker→host messages travel over a tokio mpsc so the
//! pipeline task can await them alongside its other inputs.

use crate::error::{FacecueError, Result};
use crate::track::Frame;
use crate::worker::classifier::ExpressionClassifier;
use crate::worker::protocol::{HostMessage, WorkerMessage};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, error::TryRecvError};

/// Something able to start a detection worker.
///
/// Spawning fails with [`FacecueError::CapabilityUnavailable`] when the host
/// environment cannot run background workers.
pub trait WorkerHost: Send + Sync {
    fn spawn(&self) -> Result<WorkerChannel>;
}

type ClassifierFactory = Box<dyn Fn() -> Result<Box<dyn ExpressionClassifier>> + Send + Sync>;

/// Runs each worker's classifier on a dedicated OS thread.
pub struct ThreadWorkerHost {
    factory: ClassifierFactory,
    pacing: Duration,
}

impl ThreadWorkerHost {
    /// Create a host that builds a fresh classifier for every spawned worker.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn ExpressionClassifier>> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            pacing: Duration::ZERO,
        }
    }

    /// Create a host around a single classifier instance.
    ///
    /// Only the first spawn succeeds; later spawns report the capability as unavailable.
    pub fn once<C: ExpressionClassifier + 'static>(classifier: C) -> Self {
        let slot: Mutex<Option<Box<dyn ExpressionClassifier>>> =
            Mutex::new(Some(Box::new(classifier)));
        Self::new(move || {
            slot.lock()
                .ok()
                .and_then(|mut guard| guard.take())
                .ok_or_else(|| FacecueError::unavailable("classifier already taken by a worker"))
        })
    }

    /// Delay between receiving a frame and classifying it.
    ///
    /// A `CLEAR_TIMEOUT` arriving within this window cancels the detection.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }
}

impl WorkerHost for ThreadWorkerHost {
    fn spawn(&self) -> Result<WorkerChannel> {
        let classifier = (self.factory)()?;
        let (host_tx, host_rx) = crossbeam_channel::unbounded();
        let (worker_tx, worker_rx) = tokio::sync::mpsc::unbounded_channel();
        let pacing = self.pacing;

        let handle = thread::Builder::new()
            .name("facecue-worker".to_string())
            .spawn(move || run_worker(classifier, host_rx, worker_tx, pacing))
            .map_err(|e| FacecueError::unavailable(format!("cannot spawn worker thread: {}", e)))?;

        Ok(WorkerChannel::new(host_tx, worker_rx, Some(handle)))
    }
}

/// Host without background worker support.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableWorkerHost;

impl WorkerHost for UnavailableWorkerHost {
    fn spawn(&self) -> Result<WorkerChannel> {
        Err(FacecueError::unavailable("background workers are not supported"))
    }
}

/// Main loop of the worker thread.
fn run_worker(
    mut classifier: Box<dyn ExpressionClassifier>,
    inbox: Receiver<HostMessage>,
    outbox: UnboundedSender<WorkerMessage>,
    pacing: Duration,
) {
    // At most one frame is scheduled; a newer submission replaces it.
    let mut scheduled: Option<(Frame, Instant)> = None;

    loop {
        let received = match &scheduled {
            Some((_, deadline)) => match inbox.recv_deadline(*deadline) {
                Ok(msg) => Some(msg),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match inbox.recv() {
                Ok(msg) => Some(msg),
                Err(_) => break,
            },
        };

        let reply = match received {
            None => scheduled.take().map(|(frame, _)| {
                let label = match classifier.classify(&frame) {
                    Ok(label) => label.unwrap_or_default(),
                    Err(e) => {
                        tracing::warn!("classification failed: {}", e);
                        String::new()
                    }
                };
                WorkerMessage::FacialExpression(label)
            }),
            Some(HostMessage::SetModelsUrl { url }) => match classifier.load_models(&url) {
                Ok(()) => Some(WorkerMessage::Backend(classifier.backend().to_string())),
                Err(e) => {
                    tracing::error!(url = %url, "model loading failed: {}", e);
                    None
                }
            },
            // Every submitted frame gets exactly one reply, cancelled ones included
            Some(HostMessage::ClearTimeout) => scheduled.take().map(|_| {
                tracing::trace!("scheduled detection cancelled");
                WorkerMessage::FacialExpression(String::new())
            }),
            Some(HostMessage::SubmitFrame { frame }) => {
                scheduled = Some((frame, Instant::now() + pacing));
                None
            }
        };

        if let Some(msg) = reply
            && outbox.send(msg).is_err()
        {
            // Pipeline side dropped its receiver
            break;
        }
    }

    tracing::debug!("detection worker exiting");
}

/// Pipeline-side end of a detection worker.
///
/// Enforces the one-outstanding-frame protocol: a frame is only submitted
/// when the previous one has been answered or cancelled.
///
/// The worker answers every submitted frame exactly once, in order. Replies
/// to frames abandoned by [`clear_timeout`](Self::clear_timeout) are counted
/// and consumed before a reply is accepted for the current frame.
pub struct WorkerChannel {
    outbox: Option<Sender<HostMessage>>,
    inbox: UnboundedReceiver<WorkerMessage>,
    thread: Option<JoinHandle<()>>,
    outstanding: bool,
    abandoned: u64,
    submitted: u64,
}

impl WorkerChannel {
    pub fn new(
        outbox: Sender<HostMessage>,
        inbox: UnboundedReceiver<WorkerMessage>,
        thread: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            outbox: Some(outbox),
            inbox,
            thread,
            outstanding: false,
            abandoned: 0,
            submitted: 0,
        }
    }

    fn post(&self, msg: HostMessage) -> Result<()> {
        match &self.outbox {
            Some(tx) => tx.send(msg).map_err(|_| FacecueError::WorkerDisconnected),
            None => Err(FacecueError::WorkerDisconnected),
        }
    }

    /// Tell the worker where its models live.
    pub fn set_models_url(&self, url: &str) -> Result<()> {
        self.post(HostMessage::SetModelsUrl {
            url: url.to_string(),
        })
    }

    /// Submit a frame for classification.
    ///
    /// Returns `Ok(false)` without sending anything if a frame is already outstanding.
    pub fn submit_frame(&mut self, frame: Frame) -> Result<bool> {
        if self.outstanding {
            return Ok(false);
        }
        self.post(HostMessage::SubmitFrame { frame })?;
        self.outstanding = true;
        self.submitted += 1;
        Ok(true)
    }

    /// Ask the worker to cancel its scheduled detection and abandon the outstanding frame.
    pub fn clear_timeout(&mut self) -> Result<()> {
        if std::mem::replace(&mut self.outstanding, false) {
            self.abandoned += 1;
        }
        self.post(HostMessage::ClearTimeout)
    }

    /// Record that a classification arrived.
    ///
    /// Returns whether it answered the outstanding frame; `false` means the
    /// response belongs to a frame abandoned by [`clear_timeout`](Self::clear_timeout).
    pub fn acknowledge(&mut self) -> bool {
        if self.abandoned > 0 {
            self.abandoned -= 1;
            return false;
        }
        std::mem::replace(&mut self.outstanding, false)
    }

    pub fn has_outstanding_frame(&self) -> bool {
        self.outstanding
    }

    /// Replies still expected for frames abandoned by [`clear_timeout`](Self::clear_timeout).
    pub fn abandoned_frames(&self) -> u64 {
        self.abandoned
    }

    pub fn frames_submitted(&self) -> u64 {
        self.submitted
    }

    /// Wait for the next message. `None` once the worker is gone.
    pub async fn recv(&mut self) -> Option<WorkerMessage> {
        self.inbox.recv().await
    }

    /// Number of worker messages received but not yet consumed.
    pub fn pending(&self) -> usize {
        self.inbox.len()
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Result<Option<WorkerMessage>> {
        match self.inbox.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(FacecueError::WorkerDisconnected),
        }
    }

    /// Stop the worker thread and wait for it to exit.
    pub fn terminate(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender ends the worker loop
        self.outbox.take();
        self.inbox.close();
        if let Some(handle) = self.thread.take()
            && handle.join().is_err()
        {
            tracing::error!("detection worker thread panicked");
        }
    }
}

impl Drop for WorkerChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}
