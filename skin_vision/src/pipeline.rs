// THEORY:
// The `pipeline` module is the top-level API of the capture side of the engine.
// A `CaptureSession` owns the camera, the landmark detector, and every stage of
// live analysis, and runs them on one tokio task. The caller holds a
// `CaptureHandle`: it sends commands in, receives `SessionEvent`s out, and can
// peek at the latest `FaceObservation` at any time.
//
// Key architectural principles:
// 1.  **Single Owner, No Locks**: All mutable state (capture memory, countdown,
//     latest frame, latest sample, capture store) lives inside the session task.
//     Every timer, frame and command is a branch of one `select!` loop, so no two
//     pieces of code ever touch that state at the same time.
// 2.  **Whole-Value Publication**: Each detection result becomes a complete
//     `FaceObservation` that replaces the previous one in a `watch` channel. The
//     heatmap, the sampler, and outside readers see either the old value or the
//     new one, never a mix.
// 3.  **Detection Off the Frame Path**: At most one landmark detection is in
//     flight. Frames that arrive meanwhile still update the overlay and the
//     latest-frame slot; the next frame after a result starts the next detection.
// 4.  **Scoped Acquisition**: The camera sits in a `CameraGuard` owned by the
//     task. Stopping, dropping the handle (which aborts the task), a failed
//     model load, or the end of the stream all release it.

use std::future::pending;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval, interval_at};
use tracing::{debug, info, warn};

use crate::config::VisionConfig;
use crate::core_modules::auto_capture::{
    AutoCaptureAction, AutoCaptureMachine, CaptureMemory, GateContext,
};
use crate::core_modules::camera::{CameraGuard, CameraSource};
use crate::core_modules::capture_store::{CaptureItem, CaptureOrigin, CaptureStore, encode_capture};
use crate::core_modules::draw::DrawCommand;
use crate::core_modules::face::FaceObservation;
use crate::core_modules::frame::frame::Frame;
use crate::core_modules::frame_sampler::FrameQualitySampler;
use crate::core_modules::landmarker::{
    Delegate, LandmarkSource, LandmarkerFactory, load_landmarker, observe,
};
use crate::core_modules::live_heatmap::LiveHeatmapSynthesizer;
use crate::core_modules::quality::QualitySample;
use crate::error::{VisionError, VisionResult};

/// Lifecycle of a capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Acquiring the camera and loading the landmark model.
    Starting,
    Live { delegate: Delegate },
    Stopped,
    /// A capability failed; the session has ended and the camera is released.
    Error(String),
}

/// Everything the session reports to its owner.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Status(SessionStatus),
    /// The newest quality sample, once per sampling tick.
    Quality(QualitySample),
    /// Ticks left on the auto-capture countdown; `None` once no countdown is shown.
    Countdown(Option<u32>),
    Captured(CaptureItem),
    CaptureFailed(String),
    Removed(u64),
    /// All captures were discarded and the capture memory was cleared.
    Reset,
    /// Replacement commands for the live overlay.
    Overlay(Vec<DrawCommand>),
}

enum SessionCommand {
    SetAutoCapture(bool),
    CaptureNow,
    Remove(u64),
    Reset,
    Stop(oneshot::Sender<Vec<CaptureItem>>),
}

type Detection = BoxFuture<'static, FaceObservation>;

/// Entry point for live capture sessions.
pub struct CaptureSession;

impl CaptureSession {
    /// Spawns a session on the current tokio runtime.
    pub fn start<C>(config: VisionConfig, camera: C, factory: Arc<dyn LandmarkerFactory>) -> CaptureHandle
    where
        C: CameraSource + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (observation_tx, observation_rx) = watch::channel(FaceObservation::not_found());

        let task = tokio::spawn(run_session(
            config,
            camera,
            factory,
            command_rx,
            event_tx,
            observation_tx,
        ));

        CaptureHandle {
            commands: command_tx,
            events: event_rx,
            observation: observation_rx,
            task,
        }
    }
}

/// The caller's side of a running session. Dropping it stops the session.
pub struct CaptureHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    observation: watch::Receiver<FaceObservation>,
    task: JoinHandle<()>,
}

impl CaptureHandle {
    /// Waits for the next event. `None` once the session has ended and all
    /// events were drained.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// The most recently published face observation.
    pub fn observation(&self) -> FaceObservation {
        *self.observation.borrow()
    }

    /// A receiver that is notified on every new observation.
    pub fn watch_observation(&self) -> watch::Receiver<FaceObservation> {
        self.observation.clone()
    }

    pub fn set_auto_capture(&self, enabled: bool) -> VisionResult<()> {
        self.send(SessionCommand::SetAutoCapture(enabled))
    }

    /// Captures the current frame regardless of quality. Respects the budget and
    /// cancels a running countdown.
    pub fn capture_now(&self) -> VisionResult<()> {
        self.send(SessionCommand::CaptureNow)
    }

    pub fn remove(&self, id: u64) -> VisionResult<()> {
        self.send(SessionCommand::Remove(id))
    }

    /// Discards all captures and forgets the last auto-capture.
    pub fn reset(&self) -> VisionResult<()> {
        self.send(SessionCommand::Reset)
    }

    /// Stops the session and returns the captures. The camera has been released
    /// by the time this resolves.
    pub async fn stop(self) -> VisionResult<Vec<CaptureItem>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SessionCommand::Stop(reply_tx))?;
        reply_rx.await.map_err(|_| VisionError::SessionClosed)
    }

    fn send(&self, command: SessionCommand) -> VisionResult<()> {
        self.commands.send(command).map_err(|_| VisionError::SessionClosed)
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// State owned by the session task.
struct LiveState {
    sampler: FrameQualitySampler,
    heatmap: LiveHeatmapSynthesizer,
    machine: AutoCaptureMachine,
    memory: CaptureMemory,
    store: CaptureStore,
    latest_frame: Option<Arc<Frame>>,
    latest_sample: QualitySample,
    countdown: Option<Interval>,
    tick_period: std::time::Duration,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl LiveState {
    fn new(config: &VisionConfig, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            sampler: FrameQualitySampler::new(config.sampler.clone()),
            heatmap: LiveHeatmapSynthesizer::new(config.live_heatmap.clone()),
            machine: AutoCaptureMachine::new(config.auto_capture.clone()),
            memory: CaptureMemory::new(),
            store: CaptureStore::new(config.auto_capture.budget),
            latest_frame: None,
            latest_sample: QualitySample::empty(),
            countdown: None,
            tick_period: config.auto_capture.tick_interval,
            events,
        }
    }

    fn emit(&self, event: SessionEvent) {
        // The owner may have stopped listening; the session keeps running until stopped.
        let _ = self.events.send(event);
    }

    fn gate(&self) -> GateContext {
        GateContext {
            surface_active: self.latest_frame.is_some(),
            captured_count: self.store.len(),
        }
    }

    fn apply(&mut self, action: AutoCaptureAction, now: std::time::Instant) {
        match action {
            AutoCaptureAction::None => {}
            AutoCaptureAction::CountdownStarted(ticks) => {
                debug!(ticks, score = self.latest_sample.score, "auto-capture countdown started");
                self.countdown = Some(countdown_interval(self.tick_period));
                self.emit(SessionEvent::Countdown(Some(ticks)));
            }
            AutoCaptureAction::CountdownTick(ticks) => {
                self.emit(SessionEvent::Countdown(Some(ticks)));
            }
            AutoCaptureAction::Aborted(reason) => {
                debug!(?reason, "auto-capture countdown aborted");
                self.countdown = None;
                self.emit(SessionEvent::Countdown(None));
            }
            AutoCaptureAction::Fire(pose) => {
                self.countdown = None;
                self.emit(SessionEvent::Countdown(None));
                info!(pose = pose.as_str(), score = self.latest_sample.score, "auto-capture fired");
                // Only a stored capture counts against the pose cooldown.
                if self.capture(CaptureOrigin::Auto) {
                    self.memory.stamp(now, pose);
                }
            }
        }
    }

    /// Encodes the latest frame into the store. Returns whether an item was stored.
    fn capture(&mut self, origin: CaptureOrigin) -> bool {
        let Some(frame) = self.latest_frame.clone() else {
            self.emit(SessionEvent::CaptureFailed("no camera frame yet".into()));
            return false;
        };
        if self.store.is_full() {
            self.emit(SessionEvent::CaptureFailed(format!(
                "capture budget of {} reached",
                self.store.budget()
            )));
            return false;
        }
        let bytes = match encode_capture(&frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "capture encoding failed");
                self.emit(SessionEvent::CaptureFailed(e.to_string()));
                return false;
            }
        };
        let pose = self.latest_sample.pose;
        let score = self.latest_sample.score;
        match self.store.push(bytes, pose, score, origin).cloned() {
            Some(item) => {
                info!(id = item.id, pose = pose.as_str(), ?origin, bytes = item.image_bytes.len(), "captured");
                self.emit(SessionEvent::Captured(item));
                true
            }
            None => false,
        }
    }

    fn cancel_countdown(&mut self) {
        if self.machine.cancel() {
            self.countdown = None;
            self.emit(SessionEvent::Countdown(None));
        }
    }
}

fn countdown_interval(period: std::time::Duration) -> Interval {
    let mut ticks = interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticks
}

fn start_detection(source: &Arc<dyn LandmarkSource>, frame: Arc<Frame>) -> Detection {
    let source = Arc::clone(source);
    Box::pin(async move { observe(source.as_ref(), frame).await })
}

async fn run_session<C: CameraSource>(
    config: VisionConfig,
    camera: C,
    factory: Arc<dyn LandmarkerFactory>,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
    observation: watch::Sender<FaceObservation>,
) {
    let _ = events.send(SessionEvent::Status(SessionStatus::Starting));

    // Stage 1: acquire capabilities. The guard releases the camera on every exit below.
    let mut camera = match CameraGuard::acquire(camera).await {
        Ok(guard) => guard,
        Err(e) => {
            let _ = events.send(SessionEvent::Status(SessionStatus::Error(e.to_string())));
            return;
        }
    };
    let (landmarker, delegate) = match load_landmarker(factory.as_ref()).await {
        Ok(loaded) => loaded,
        Err(e) => {
            warn!(error = %e, "capture session cannot start");
            let _ = events.send(SessionEvent::Status(SessionStatus::Error(e.to_string())));
            return;
        }
    };
    info!(delegate = delegate.as_str(), "capture session live");
    let _ = events.send(SessionEvent::Status(SessionStatus::Live { delegate }));

    let mut state = LiveState::new(&config, events.clone());
    let mut in_flight: Option<Detection> = None;
    let mut stop_reply = None;
    let mut sample_ticks = interval(config.sampler.interval);
    sample_ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Stage 2: the live loop.
    loop {
        let pending_detection = in_flight.as_mut();
        let detection = async move {
            match pending_detection {
                Some(future) => future.await,
                None => pending().await,
            }
        };
        let countdown = state.countdown.as_mut();
        let countdown_tick = async move {
            match countdown {
                Some(ticks) => ticks.tick().await,
                None => pending().await,
            }
        };

        tokio::select! {
            frame = camera.next_frame() => {
                let Some(frame) = frame else {
                    warn!("camera stream ended");
                    state.emit(SessionEvent::Status(SessionStatus::Error("camera stream ended".into())));
                    break;
                };
                let frame = Arc::new(frame);
                let face = *observation.borrow();
                if let Some(overlay) = state.heatmap.on_frame(&frame, &face, Instant::now().into_std()) {
                    state.emit(SessionEvent::Overlay(overlay));
                }
                if in_flight.is_none() {
                    in_flight = Some(start_detection(&landmarker, frame.clone()));
                }
                state.latest_frame = Some(frame);
            }
            face = detection => {
                in_flight = None;
                observation.send_replace(face);
            }
            _ = sample_ticks.tick() => {
                let Some(frame) = state.latest_frame.clone() else {
                    continue;
                };
                let face = *observation.borrow();
                state.latest_sample = state.sampler.sample(&frame, &face);
                state.emit(SessionEvent::Quality(state.latest_sample.clone()));
                let gate = state.gate();
                let now = Instant::now().into_std();
                let action = state.machine.on_sample(&state.latest_sample, &state.memory, gate, now);
                state.apply(action, now);
            }
            _ = countdown_tick, if state.machine.is_counting() => {
                let gate = state.gate();
                let now = Instant::now().into_std();
                let action = state.machine.on_countdown_tick(&state.latest_sample, &state.memory, gate, now);
                state.apply(action, now);
            }
            command = commands.recv() => match command {
                Some(SessionCommand::SetAutoCapture(enabled)) => {
                    debug!(enabled, "auto-capture toggled");
                    let action = state.machine.set_enabled(enabled);
                    state.apply(action, Instant::now().into_std());
                }
                Some(SessionCommand::CaptureNow) => {
                    state.cancel_countdown();
                    state.capture(CaptureOrigin::Manual);
                }
                Some(SessionCommand::Remove(id)) => {
                    if state.store.remove(id).is_some() {
                        state.emit(SessionEvent::Removed(id));
                    }
                }
                Some(SessionCommand::Reset) => {
                    state.cancel_countdown();
                    state.store.take_all();
                    state.memory = CaptureMemory::new();
                    state.emit(SessionEvent::Reset);
                }
                Some(SessionCommand::Stop(reply)) => {
                    state.cancel_countdown();
                    stop_reply = Some(reply);
                    break;
                }
                None => break,
            },
        }
    }

    // Stage 3: teardown. The camera is dark before `stop` returns to its caller.
    drop(in_flight);
    camera.release();
    if let Some(reply) = stop_reply {
        let _ = reply.send(state.store.take_all());
    }
    observation.send_replace(FaceObservation::not_found());
    if state.heatmap.is_showing() {
        state.emit(SessionEvent::Overlay(vec![DrawCommand::Clear]));
    }
    state.emit(SessionEvent::Status(SessionStatus::Stopped));
    info!("capture session stopped");
}
