//! Idle/Running lifecycle of the expression pipeline.
//!
//! The controller owns every piece of session state: the capture binding,
//! the worker channel, the reducer, the delivery buffer and its scheduler.
//! It is not shared; the driver task is its single owner.

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::delivery::{
    DeliveryBuffer, DeliveryOutcome, DeliveryReport, DeliveryScheduler, FlushProgress,
    SchedulerEvent, WebhookDelivery,
};
use crate::error::{FacecueError, Result};
use crate::expression::{DetectionInterval, ExpressionEvent, ExpressionReducer, ExpressionTotals};
use crate::pipeline::error::{ComponentError, ErrorReporter, LogReporter};
use crate::pipeline::state::{Phase, PipelineStatus};
use crate::track::{CaptureFactory, LocalTrack, TrackBinder, VideoSource};
use crate::worker::{BackendKind, WorkerChannel, WorkerHost, WorkerMessage};
use std::sync::Arc;

/// Input the controller reacts to, as produced by [`PipelineController::next_event`].
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Worker(WorkerMessage),
    /// The worker's channel closed underneath us.
    WorkerLost,
    DeliveryTick,
    DeliveryComplete(DeliveryReport),
}

pub struct PipelineController {
    config: Config,
    source: Arc<dyn VideoSource>,
    binder: TrackBinder,
    worker: Option<WorkerChannel>,
    phase: Phase,
    backend: Option<BackendKind>,
    interval: DetectionInterval,
    reducer: ExpressionReducer,
    totals: ExpressionTotals,
    buffer: DeliveryBuffer,
    scheduler: DeliveryScheduler,
    clock: Arc<dyn Clock>,
    error_reporter: Arc<dyn ErrorReporter>,
}

impl PipelineController {
    pub fn new(
        config: Config,
        source: Arc<dyn VideoSource>,
        capture: Arc<dyn CaptureFactory>,
        webhook: Arc<dyn WebhookDelivery>,
    ) -> Self {
        let scheduler = DeliveryScheduler::new(config.delivery.tick(), webhook);
        Self {
            config,
            source,
            binder: TrackBinder::new(capture),
            worker: None,
            phase: Phase::Idle,
            backend: None,
            interval: DetectionInterval::Unresolved,
            reducer: ExpressionReducer::new(),
            totals: ExpressionTotals::new(),
            buffer: DeliveryBuffer::new(),
            scheduler,
            clock: Arc::new(SystemClock),
            error_reporter: Arc::new(LogReporter),
        }
    }

    /// Sets a custom clock for event timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets a custom error reporter.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    fn report(&self, component: &str, error: &FacecueError) {
        self.error_reporter
            .report(component, &ComponentError::from_error(error));
    }

    /// Spawn the detection worker (unless one is loaded), point it at the
    /// models, then try to start.
    ///
    /// Returns whether a worker is loaded afterwards.
    pub fn load_worker(&mut self, host: &dyn WorkerHost) -> bool {
        if self.worker.is_none() {
            let channel = match host.spawn() {
                Ok(channel) => channel,
                Err(e) => {
                    self.report("worker", &e);
                    return false;
                }
            };
            if let Err(e) = channel.set_models_url(&self.config.worker.models_url) {
                self.report("worker", &e);
                return false;
            }
            tracing::info!(models_url = %self.config.worker.models_url, "detection worker loaded");
            self.worker = Some(channel);
        }

        self.start();
        true
    }

    /// Enter Running: bind the active video track, submit the first frame
    /// and arm the delivery timer.
    ///
    /// No-op when already running, when no worker is loaded, or when there
    /// is no local video track to capture from.
    pub fn start(&mut self) -> bool {
        if self.phase.is_running() {
            return false;
        }
        if self.worker.is_none() {
            tracing::debug!("start requested before the worker was loaded");
            return false;
        }
        if !self.binder.bind_active(self.source.as_ref()) {
            self.report(
                "capture",
                &FacecueError::unavailable("no local video track to capture"),
            );
            return false;
        }
        if let Err(e) = self.submit_next_frame() {
            self.report("capture", &e);
            self.binder.release();
            return false;
        }

        self.scheduler.start();
        self.phase = Phase::Running;
        tracing::info!(
            track = self.binder.bound_track_id().unwrap_or_default(),
            "expression pipeline running"
        );
        true
    }

    /// Leave Running: release capture, cancel the worker's pending detection,
    /// close the open run and disarm the delivery timer. Idempotent.
    pub fn stop(&mut self) {
        if !self.phase.is_running() {
            self.binder.release();
            return;
        }

        self.drain_worker();
        self.binder.release();
        if let Some(worker) = self.worker.as_mut()
            && let Err(e) = worker.clear_timeout()
        {
            self.report("worker", &e);
        }
        if let Some(event) = self.reducer.flush(self.interval) {
            self.record(event);
        }
        self.scheduler.cancel();
        self.phase = Phase::Idle;
        tracing::info!(buffered = self.buffer.len(), "expression pipeline stopped");
    }

    /// Apply the worker messages that arrived before now.
    ///
    /// Bounded by the queue length at entry, since every handled
    /// classification submits a new frame the worker may answer at once.
    fn drain_worker(&mut self) {
        let queued = self.worker.as_ref().map(|w| w.pending()).unwrap_or(0);
        for _ in 0..queued {
            let Some(worker) = self.worker.as_mut() else {
                return;
            };
            match worker.try_recv() {
                Ok(Some(msg)) => self.handle_worker_message(msg),
                Ok(None) => return,
                Err(e) => {
                    self.report("worker", &e);
                    self.worker = None;
                    return;
                }
            }
        }
    }

    /// Capture from `track` from now on. The phase is unchanged.
    pub fn rebind_track(&mut self, track: &dyn LocalTrack) -> bool {
        let bound = self.binder.bind(track);
        self.resume_after_rebind(bound);
        bound
    }

    /// Re-bind capture to whatever local video track is currently active.
    pub fn reset_track(&mut self) -> bool {
        let bound = self.binder.bind_active(self.source.as_ref());
        self.resume_after_rebind(bound);
        bound
    }

    fn resume_after_rebind(&mut self, bound: bool) {
        if !self.phase.is_running() {
            return;
        }
        if !bound {
            tracing::warn!("running without a capture handle until the next rebind");
            return;
        }
        if let Err(e) = self.submit_next_frame() {
            self.report("capture", &e);
        }
    }

    /// Grab a frame and hand it to the worker unless one is already outstanding.
    fn submit_next_frame(&mut self) -> Result<bool> {
        let Some(worker) = self.worker.as_mut() else {
            return Ok(false);
        };
        if worker.has_outstanding_frame() {
            return Ok(false);
        }
        let frame = self.binder.grab_frame()?;
        worker.submit_frame(frame)
    }

    fn record(&mut self, event: ExpressionEvent) {
        tracing::debug!(
            expression = %event.label,
            duration = event.duration,
            "expression event"
        );
        self.totals.record(&event);
        self.buffer.push(event);
    }

    /// React to one message from the worker.
    pub fn handle_worker_message(&mut self, msg: WorkerMessage) {
        match msg {
            WorkerMessage::Backend(value) => {
                if self.worker.is_none() {
                    tracing::debug!(backend = %value, "backend report without a worker, ignoring");
                    return;
                }
                let backend = BackendKind::parse(&value);
                self.interval = DetectionInterval::for_backend(
                    &backend,
                    self.config.worker.webgl_interval_ms,
                    self.config.worker.cpu_interval_ms,
                );
                tracing::info!(
                    backend = backend.as_str(),
                    interval_ms = self.interval.as_raw(),
                    "worker backend resolved"
                );
                self.backend = Some(backend);
            }
            WorkerMessage::FacialExpression(value) => {
                let Some(worker) = self.worker.as_mut() else {
                    return;
                };
                // Consumed even while idle so abandoned replies stay accounted for
                if !worker.acknowledge() {
                    tracing::debug!(expression = %value, "classification for an abandoned frame");
                    return;
                }
                if !self.phase.is_running() {
                    tracing::debug!(expression = %value, "classification while idle, ignoring");
                    return;
                }

                // Keep the worker busy before doing our own bookkeeping
                if let Err(e) = self.submit_next_frame() {
                    self.report("capture", &e);
                }

                let now = self.clock.now_ms();
                if let Some(event) = self.reducer.observe(&value, now, self.interval) {
                    self.record(event);
                }
            }
        }
    }

    /// Start a delivery of the buffer if one is due.
    pub fn on_delivery_tick(&mut self) -> bool {
        self.scheduler.dispatch(&self.buffer)
    }

    /// Apply a finished delivery. Reports the result of a requested flush once it is over.
    pub fn on_delivery_complete(&mut self, report: DeliveryReport) -> FlushProgress {
        self.scheduler.complete(&mut self.buffer, report)
    }

    /// Wait for the next worker message or delivery event.
    pub async fn next_event(&mut self) -> PipelineEvent {
        let worker = &mut self.worker;
        let scheduler = &mut self.scheduler;
        tokio::select! {
            msg = recv_worker(worker) => match msg {
                Some(msg) => PipelineEvent::Worker(msg),
                None => PipelineEvent::WorkerLost,
            },
            event = scheduler.next_event() => match event {
                SchedulerEvent::Tick => PipelineEvent::DeliveryTick,
                SchedulerEvent::Completed(report) => PipelineEvent::DeliveryComplete(report),
            },
        }
    }

    /// React to one event. Only a delivery completion can advance a flush.
    pub fn handle_event(&mut self, event: PipelineEvent) -> FlushProgress {
        match event {
            PipelineEvent::Worker(msg) => self.handle_worker_message(msg),
            PipelineEvent::WorkerLost => {
                // The inbox is already drained and closed
                self.worker = None;
                self.report("worker", &FacecueError::WorkerDisconnected);
                self.stop();
            }
            PipelineEvent::DeliveryTick => {
                self.on_delivery_tick();
            }
            PipelineEvent::DeliveryComplete(report) => return self.on_delivery_complete(report),
        }
        FlushProgress::Idle
    }

    /// Start delivering whatever is buffered without waiting for the tick.
    ///
    /// Returns [`FlushProgress::Pending`] while the delivery runs; its result
    /// comes back from [`handle_event`](Self::handle_event).
    pub fn request_flush(&mut self) -> FlushProgress {
        self.scheduler.request_flush(&self.buffer)
    }

    /// Deliver whatever is buffered right away and wait for the outcome.
    pub async fn flush_now(&mut self) -> Option<DeliveryOutcome> {
        self.scheduler.flush_now(&mut self.buffer).await
    }

    /// Stop, then terminate the worker.
    pub fn shutdown(&mut self) {
        self.stop();
        if let Some(worker) = self.worker.take() {
            worker.terminate();
            tracing::info!("detection worker terminated");
        }
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            phase: self.phase,
            worker_loaded: self.worker.is_some(),
            capture_bound: self.binder.is_bound(),
            backend: self.backend.as_ref().map(|b| b.as_str().to_string()),
            detection_interval_ms: self.interval.as_raw(),
            frames_submitted: self
                .worker
                .as_ref()
                .map(|w| w.frames_submitted())
                .unwrap_or(0),
            buffered_events: self.buffer.len(),
            delivery_in_flight: self.scheduler.is_in_flight(),
            totals: self.totals.clone(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn interval(&self) -> DetectionInterval {
        self.interval
    }

    pub fn buffer(&self) -> &DeliveryBuffer {
        &self.buffer
    }

    pub fn totals(&self) -> &ExpressionTotals {
        &self.totals
    }

    pub fn is_worker_loaded(&self) -> bool {
        self.worker.is_some()
    }

    pub fn is_capture_bound(&self) -> bool {
        self.binder.is_bound()
    }

    pub fn is_delivery_armed(&self) -> bool {
        self.scheduler.is_armed()
    }
}

async fn recv_worker(worker: &mut Option<WorkerChannel>) -> Option<WorkerMessage> {
    match worker {
        Some(channel) => channel.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::delivery::MockWebhook;
    use crate::expression::DurationUnit;
    use crate::pipeline::error::CollectingReporter;
    use crate::track::{StaticTrack, StaticVideoSource, SyntheticCaptureFactory};
    use crate::worker::{HostMessage, UnavailableWorkerHost};
    use crossbeam_channel::Receiver;
    use std::sync::Mutex;
    use tokio::sync::mpsc::UnboundedSender;

    /// Worker side of a channel driven by hand.
    struct FakeWorker {
        inbox: Receiver<HostMessage>,
        outbox: UnboundedSender<WorkerMessage>,
    }

    impl FakeWorker {
        fn drain(&self) -> Vec<HostMessage> {
            self.inbox.try_iter().collect()
        }

        fn reply(&self, msg: WorkerMessage) {
            self.outbox.send(msg).unwrap();
        }
    }

    struct FakeHost {
        slot: Mutex<Option<WorkerChannel>>,
    }

    impl WorkerHost for FakeHost {
        fn spawn(&self) -> Result<WorkerChannel> {
            self.slot
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| FacecueError::unavailable("fake worker already spawned"))
        }
    }

    fn fake_host() -> (FakeHost, FakeWorker) {
        let (host_tx, host_rx) = crossbeam_channel::unbounded();
        let (worker_tx, worker_rx) = tokio::sync::mpsc::unbounded_channel();
        let host = FakeHost {
            slot: Mutex::new(Some(WorkerChannel::new(host_tx, worker_rx, None))),
        };
        (
            host,
            FakeWorker {
                inbox: host_rx,
                outbox: worker_tx,
            },
        )
    }

    struct Fixture {
        controller: PipelineController,
        source: Arc<StaticVideoSource>,
        capture: SyntheticCaptureFactory,
        clock: ManualClock,
        reporter: Arc<CollectingReporter>,
    }

    fn fixture_with_track(track: Option<StaticTrack>) -> Fixture {
        let mut config = Config::default();
        config.worker.models_url = "https://models.example.com/".to_string();
        let source = Arc::new(StaticVideoSource::new(
            track.map(|t| Arc::new(t) as Arc<dyn LocalTrack>),
        ));
        let capture = SyntheticCaptureFactory::default();
        let clock = ManualClock::new(1_000);
        let reporter = Arc::new(CollectingReporter::new());
        let controller = PipelineController::new(
            config,
            source.clone(),
            Arc::new(capture.clone()),
            Arc::new(MockWebhook::new()),
        )
        .with_clock(Arc::new(clock.clone()))
        .with_error_reporter(reporter.clone());
        Fixture {
            controller,
            source,
            capture,
            clock,
            reporter,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_track(Some(StaticTrack::video("cam-1")))
    }

    fn submitted_frames(messages: &[HostMessage]) -> Vec<String> {
        messages
            .iter()
            .filter_map(|m| match m {
                HostMessage::SubmitFrame { frame } => Some(frame.track_id.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_load_worker_sends_models_url_then_starts() {
        let mut f = fixture();
        let (host, worker) = fake_host();

        assert!(f.controller.load_worker(&host));

        let messages = worker.drain();
        assert_eq!(
            messages[0],
            HostMessage::SetModelsUrl {
                url: "https://models.example.com/".to_string()
            }
        );
        assert_eq!(submitted_frames(&messages), vec!["cam-1"]);
        assert_eq!(f.controller.phase(), Phase::Running);
        assert!(f.controller.is_capture_bound());
        assert!(f.controller.is_delivery_armed());
    }

    #[tokio::test]
    async fn test_load_worker_twice_keeps_first_worker() {
        let mut f = fixture();
        let (host, worker) = fake_host();

        assert!(f.controller.load_worker(&host));
        // The fake host refuses a second spawn; a loaded worker must not ask for one
        assert!(f.controller.load_worker(&host));

        let messages = worker.drain();
        let models: Vec<_> = messages
            .iter()
            .filter(|m| matches!(m, HostMessage::SetModelsUrl { .. }))
            .collect();
        assert_eq!(models.len(), 1);
        assert_eq!(submitted_frames(&messages).len(), 1);
    }

    #[tokio::test]
    async fn test_worker_capability_unavailable_stays_idle() {
        let mut f = fixture();

        assert!(!f.controller.load_worker(&UnavailableWorkerHost));

        assert_eq!(f.controller.phase(), Phase::Idle);
        assert!(!f.controller.is_worker_loaded());
        let reports = f.reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, "worker");
        assert!(!reports[0].1.is_fatal());
    }

    #[tokio::test]
    async fn test_start_without_video_track_stays_idle() {
        let mut f = fixture_with_track(None);
        let (host, worker) = fake_host();

        assert!(f.controller.load_worker(&host));

        assert_eq!(f.controller.phase(), Phase::Idle);
        assert!(!f.controller.is_capture_bound());
        assert!(!f.controller.is_delivery_armed());
        assert!(submitted_frames(&worker.drain()).is_empty());
    }

    #[tokio::test]
    async fn test_start_with_detached_track_stays_idle() {
        let mut f = fixture_with_track(Some(StaticTrack::detached("cam-1")));
        let (host, _worker) = fake_host();

        f.controller.load_worker(&host);

        assert_eq!(f.controller.phase(), Phase::Idle);
        assert_eq!(f.capture.live_handles(), 0);
    }

    #[tokio::test]
    async fn test_start_is_noop_while_running() {
        let mut f = fixture();
        let (host, worker) = fake_host();
        f.controller.load_worker(&host);
        worker.drain();

        assert!(!f.controller.start());
        assert!(worker.drain().is_empty());
        assert_eq!(f.capture.created_handles(), 1);
    }

    #[tokio::test]
    async fn test_classifications_reduce_into_buffer() {
        let mut f = fixture();
        let (host, worker) = fake_host();
        f.controller.load_worker(&host);
        f.controller
            .handle_worker_message(WorkerMessage::Backend("webgl".to_string()));
        assert_eq!(f.controller.interval(), DetectionInterval::Millis(1000));

        for label in ["", "happy", "happy", "happy", "sad"] {
            f.clock.advance(1000);
            f.controller
                .handle_worker_message(WorkerMessage::FacialExpression(label.to_string()));
        }

        let buffer = f.controller.buffer().events();
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer[0].label, "happy");
        assert_eq!(buffer[0].duration, 3.0);
        assert_eq!(buffer[0].unit, DurationUnit::Seconds);
        assert_eq!(buffer[0].timestamp_ms, 3_000);
        assert_eq!(f.controller.totals().get("happy"), 3.0);

        // One initial frame plus one per classification
        assert_eq!(submitted_frames(&worker.drain()).len(), 6);
        assert_eq!(f.controller.status().frames_submitted, 6);
    }

    #[tokio::test]
    async fn test_stop_flushes_pending_run_and_clears_worker_timeout() {
        let mut f = fixture();
        let (host, worker) = fake_host();
        f.controller.load_worker(&host);
        f.controller
            .handle_worker_message(WorkerMessage::Backend("cpu".to_string()));
        f.controller
            .handle_worker_message(WorkerMessage::FacialExpression("sad".to_string()));
        f.controller
            .handle_worker_message(WorkerMessage::FacialExpression("sad".to_string()));
        worker.drain();

        f.controller.stop();

        assert_eq!(f.controller.phase(), Phase::Idle);
        assert_eq!(f.capture.live_handles(), 0);
        assert!(!f.controller.is_delivery_armed());
        assert_eq!(worker.drain(), vec![HostMessage::ClearTimeout]);

        let buffer = f.controller.buffer().events();
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer[0].label, "sad");
        assert_eq!(buffer[0].duration, 12.0);

        // Idempotent
        f.controller.stop();
        assert!(worker.drain().is_empty());
        assert_eq!(f.controller.buffer().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_applies_already_queued_classifications() {
        let mut f = fixture();
        let (host, worker) = fake_host();
        f.controller.load_worker(&host);
        worker.reply(WorkerMessage::FacialExpression("happy".to_string()));
        worker.reply(WorkerMessage::FacialExpression("sad".to_string()));

        f.controller.stop();

        let labels: Vec<&str> = f
            .controller
            .buffer()
            .events()
            .iter()
            .map(|e| e.label.as_str())
            .collect();
        assert_eq!(labels, vec!["happy", "sad"]);
        assert_eq!(f.controller.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_classification_after_stop_is_ignored() {
        let mut f = fixture();
        let (host, worker) = fake_host();
        f.controller.load_worker(&host);
        f.controller.stop();
        worker.drain();

        f.controller
            .handle_worker_message(WorkerMessage::FacialExpression("happy".to_string()));
        f.controller.stop();

        assert!(f.controller.buffer().is_empty());
        assert!(submitted_frames(&worker.drain()).is_empty());
    }

    #[tokio::test]
    async fn test_backend_applies_while_idle() {
        let mut f = fixture_with_track(None);
        let (host, _worker) = fake_host();
        f.controller.load_worker(&host);

        f.controller
            .handle_worker_message(WorkerMessage::Backend("cpu".to_string()));

        assert_eq!(f.controller.phase(), Phase::Idle);
        assert_eq!(f.controller.interval(), DetectionInterval::Millis(6000));
    }

    #[tokio::test]
    async fn test_unknown_backend_leaves_interval_unresolved() {
        let mut f = fixture();
        let (host, _worker) = fake_host();
        f.controller.load_worker(&host);
        f.controller
            .handle_worker_message(WorkerMessage::Backend("wasm".to_string()));
        f.controller
            .handle_worker_message(WorkerMessage::FacialExpression("angry".to_string()));
        f.controller
            .handle_worker_message(WorkerMessage::FacialExpression("angry".to_string()));
        f.controller.stop();

        let event = &f.controller.buffer().events()[0];
        assert_eq!(event.duration, 2.0);
        assert_eq!(event.unit, DurationUnit::Frames);
        assert_eq!(f.controller.status().detection_interval_ms, -1);
        assert_eq!(f.controller.status().backend.as_deref(), Some("wasm"));
    }

    #[tokio::test]
    async fn test_rebind_replaces_handle_and_resumes() {
        let mut f = fixture();
        let (host, worker) = fake_host();
        f.controller.load_worker(&host);
        f.controller
            .handle_worker_message(WorkerMessage::FacialExpression("happy".to_string()));
        worker.drain();

        // Outstanding frame exists, so the rebind itself submits nothing
        assert!(f.controller.rebind_track(&StaticTrack::video("cam-2")));
        assert_eq!(f.capture.live_handles(), 1);
        assert_eq!(f.capture.created_handles(), 2);
        assert!(worker.drain().is_empty());

        f.controller
            .handle_worker_message(WorkerMessage::FacialExpression("happy".to_string()));
        assert_eq!(submitted_frames(&worker.drain()), vec!["cam-2"]);
        assert_eq!(f.controller.phase(), Phase::Running);
    }

    #[tokio::test]
    async fn test_rebind_without_stream_leaves_no_handle() {
        let mut f = fixture();
        let (host, _worker) = fake_host();
        f.controller.load_worker(&host);

        assert!(!f.controller.rebind_track(&StaticTrack::detached("cam-2")));

        assert_eq!(f.capture.live_handles(), 0);
        assert_eq!(f.controller.phase(), Phase::Running);
    }

    #[tokio::test]
    async fn test_rebind_while_idle_does_not_start() {
        let mut f = fixture_with_track(None);
        let (host, worker) = fake_host();
        f.controller.load_worker(&host);
        worker.drain();

        assert!(f.controller.rebind_track(&StaticTrack::video("cam-9")));

        assert_eq!(f.controller.phase(), Phase::Idle);
        assert!(worker.drain().is_empty());
        // A later stop releases the preconfigured handle
        f.controller.stop();
        assert_eq!(f.capture.live_handles(), 0);
    }

    #[tokio::test]
    async fn test_reset_track_follows_active_source() {
        let mut f = fixture();
        let (host, worker) = fake_host();
        f.controller.load_worker(&host);

        // Ping-pong stalled on a streamless track, then the source moves on
        f.controller.rebind_track(&StaticTrack::detached("gone"));
        f.controller
            .handle_worker_message(WorkerMessage::FacialExpression("happy".to_string()));
        worker.drain();
        f.source
            .set_track(Some(Arc::new(StaticTrack::video("cam-3"))));

        assert!(f.controller.reset_track());

        assert_eq!(submitted_frames(&worker.drain()), vec!["cam-3"]);
        assert_eq!(f.capture.live_handles(), 1);
    }

    #[tokio::test]
    async fn test_worker_lost_stops_and_forgets_worker() {
        let mut f = fixture();
        let (host, worker) = fake_host();
        f.controller.load_worker(&host);
        f.controller
            .handle_worker_message(WorkerMessage::FacialExpression("happy".to_string()));
        drop(worker);

        let event = f.controller.next_event().await;
        assert_eq!(event, PipelineEvent::WorkerLost);
        f.controller.handle_event(event);

        assert_eq!(f.controller.phase(), Phase::Idle);
        assert!(!f.controller.is_worker_loaded());
        assert_eq!(f.controller.buffer().len(), 1);
        let reports = f.reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, "worker");
        assert!(reports[0].1.is_fatal());
    }

    #[tokio::test]
    async fn test_stale_reply_after_restart_is_ignored() {
        let mut f = fixture();
        let (host, worker) = fake_host();
        f.controller.load_worker(&host);
        f.controller.stop();
        // Answer to the abandoned frame, sent before the worker saw CLEAR_TIMEOUT
        worker.reply(WorkerMessage::FacialExpression("stale".to_string()));
        assert!(f.controller.start());
        assert_eq!(submitted_frames(&worker.drain()), vec!["cam-1", "cam-1"]);

        let event = f.controller.next_event().await;
        assert_eq!(
            event,
            PipelineEvent::Worker(WorkerMessage::FacialExpression("stale".to_string()))
        );
        f.controller.handle_event(event);

        // Still waiting on the restart frame: nothing recorded, nothing resubmitted
        assert!(f.controller.buffer().is_empty());
        assert!(worker.drain().is_empty());
        assert_eq!(f.controller.status().frames_submitted, 2);

        f.controller
            .handle_worker_message(WorkerMessage::FacialExpression("happy".to_string()));
        assert_eq!(submitted_frames(&worker.drain()).len(), 1);
        f.controller.stop();

        let labels: Vec<&str> = f
            .controller
            .buffer()
            .events()
            .iter()
            .map(|e| e.label.as_str())
            .collect();
        assert_eq!(labels, vec!["happy"]);
    }

    #[tokio::test]
    async fn test_stale_reply_handled_while_idle_keeps_restart_in_step() {
        let mut f = fixture();
        let (host, worker) = fake_host();
        f.controller.load_worker(&host);
        f.controller.stop();
        f.controller
            .handle_worker_message(WorkerMessage::FacialExpression("stale".to_string()));

        assert!(f.controller.start());
        worker.drain();
        f.controller
            .handle_worker_message(WorkerMessage::FacialExpression("happy".to_string()));
        f.controller.stop();

        assert_eq!(f.controller.buffer().len(), 1);
        assert_eq!(f.controller.buffer().events()[0].label, "happy");
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_tick_config_still_ticks() {
        let mut config = Config::default();
        config.delivery.tick_ms = 0;
        let mut controller = PipelineController::new(
            config,
            Arc::new(StaticVideoSource::new(Some(
                Arc::new(StaticTrack::video("cam-1")) as Arc<dyn LocalTrack>
            ))),
            Arc::new(SyntheticCaptureFactory::default()),
            Arc::new(MockWebhook::new()),
        );
        let (host, _worker) = fake_host();
        controller.load_worker(&host);

        assert_eq!(controller.next_event().await, PipelineEvent::DeliveryTick);
    }

    #[tokio::test]
    async fn test_flush_now_after_shutdown_delivers_remaining_events() {
        let mut f = fixture();
        let (host, _worker) = fake_host();
        f.controller.load_worker(&host);
        f.controller
            .handle_worker_message(WorkerMessage::FacialExpression("fearful".to_string()));
        f.controller.shutdown();

        assert_eq!(f.controller.buffer().len(), 1);
        assert_eq!(f.controller.flush_now().await, Some(DeliveryOutcome::Sent));
        assert!(f.controller.buffer().is_empty());
        assert_eq!(f.controller.flush_now().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requested_flush_finishes_through_events() {
        let webhook = Arc::new(MockWebhook::new().with_delay(std::time::Duration::from_secs(30)));
        let mut controller = PipelineController::new(
            Config::default(),
            Arc::new(StaticVideoSource::new(Some(
                Arc::new(StaticTrack::video("cam-1")) as Arc<dyn LocalTrack>
            ))),
            Arc::new(SyntheticCaptureFactory::default()),
            webhook.clone(),
        );
        let (host, _worker) = fake_host();
        controller.load_worker(&host);
        controller.handle_worker_message(WorkerMessage::FacialExpression("happy".to_string()));
        controller.stop();

        assert_eq!(controller.request_flush(), FlushProgress::Pending);
        // Worker input is still accepted while the delivery runs
        controller.handle_worker_message(WorkerMessage::Backend("cpu".to_string()));
        assert_eq!(controller.interval(), DetectionInterval::Millis(6000));

        let event = controller.next_event().await;
        assert!(matches!(event, PipelineEvent::DeliveryComplete(_)));
        assert_eq!(
            controller.handle_event(event),
            FlushProgress::Finished(Some(DeliveryOutcome::Sent))
        );
        assert!(controller.buffer().is_empty());
        assert_eq!(webhook.calls(), 1);
    }

    #[tokio::test]
    async fn test_next_event_forwards_worker_messages() {
        let mut f = fixture();
        let (host, worker) = fake_host();
        f.controller.load_worker(&host);

        worker.reply(WorkerMessage::Backend("webgl".to_string()));
        let event = f.controller.next_event().await;
        assert_eq!(
            event,
            PipelineEvent::Worker(WorkerMessage::Backend("webgl".to_string()))
        );
    }

    #[tokio::test]
    async fn test_shutdown_terminates_worker() {
        let mut f = fixture();
        let (host, worker) = fake_host();
        f.controller.load_worker(&host);
        worker.drain();

        f.controller.shutdown();

        assert!(!f.controller.is_worker_loaded());
        assert_eq!(worker.drain(), vec![HostMessage::ClearTimeout]);
        assert!(worker.inbox.recv().is_err());
        assert!(worker.outbox.is_closed());
    }

    #[tokio::test]
    async fn test_status_reports_totals_and_buffer() {
        let mut f = fixture();
        let (host, _worker) = fake_host();
        f.controller.load_worker(&host);
        f.controller
            .handle_worker_message(WorkerMessage::Backend("webgl".to_string()));
        f.controller
            .handle_worker_message(WorkerMessage::FacialExpression("neutral".to_string()));
        f.controller.stop();

        let status = f.controller.status();
        assert_eq!(status.phase, Phase::Idle);
        assert!(status.worker_loaded);
        assert!(!status.capture_bound);
        assert_eq!(status.buffered_events, 1);
        assert_eq!(status.totals.get("neutral"), 1.0);
        assert!(!status.delivery_in_flight);
    }
}
