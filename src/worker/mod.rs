//! Background acquisition and inference.
//!
//! One worker thread per session: it loads the model, opens the source and
//! loops pull → detect → publish until stopped or the source ends. The UI side
//! talks to it only through a `WorkerHandle`:
//! - the latest publication, in a single-slot `Mailbox` (newer overwrites older)
//! - an ordered event queue of status, FPS and finish events
//! - the shared confidence threshold, read on every frame
//! - the stop flag, checked on every iteration
//!
//! State machine: `Idle → Loading → Running → (Stopping → Idle | Error → Idle)`.

mod fps;
mod mailbox;

pub use fps::FpsCounter;
pub use mailbox::Mailbox;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::config::{clamp_confidence, SessionConfig};
use crate::detect::{resolve_model, BackendRegistry, DetectorBackend, EngineOptions};
use crate::error::{SessionError, Severity};
use crate::frame::Publication;
use crate::ingest::{FrameSource, SourceOptions, SourceRead};

/// Worker lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Loading = 1,
    Running = 2,
    Stopping = 3,
    Error = 4,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => WorkerState::Loading,
            2 => WorkerState::Running,
            3 => WorkerState::Stopping,
            4 => WorkerState::Error,
            _ => WorkerState::Idle,
        }
    }
}

/// What a status event reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Loading,
    Ready,
    Running,
    Reconnecting,
    EndOfStream,
    Stopped,
    Error,
}

/// Human-readable status change with a severity color.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusEvent {
    pub phase: Phase,
    pub message: String,
    pub severity: Severity,
}

impl StatusEvent {
    pub fn new(phase: Phase, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            phase,
            message: message.into(),
            severity,
        }
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Why the worker loop ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExitReason {
    /// Stop was requested.
    Stopped,
    /// File or image exhausted.
    Completed,
    /// Load, read or inference failure. Carries `SessionError::kind`.
    Failed(&'static str),
}

/// Messages from the worker, in emission order.
#[derive(Clone, Debug, PartialEq)]
pub enum WorkerEvent {
    Status(StatusEvent),
    Fps(f32),
    /// Last event of a session. The source is already closed.
    Finished(ExitReason),
}

/// Confidence threshold shared between the UI and the worker.
#[derive(Clone, Debug)]
pub struct SharedConfidence(Arc<AtomicU32>);

impl SharedConfidence {
    pub fn new(value: f32) -> Self {
        Self(Arc::new(AtomicU32::new(clamp_confidence(value).to_bits())))
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Store a clamped threshold. Returns the stored value.
    pub fn set(&self, value: f32) -> f32 {
        let clamped = clamp_confidence(value);
        self.0.store(clamped.to_bits(), Ordering::Relaxed);
        clamped
    }
}

/// Settings the worker needs besides the session itself.
#[derive(Clone, Debug, Default)]
pub struct WorkerOptions {
    pub source: SourceOptions,
    pub engine: EngineOptions,
}

/// A session ready to be spawned.
pub struct Worker {
    session: SessionConfig,
    options: WorkerOptions,
    registry: Arc<BackendRegistry>,
}

impl Worker {
    pub fn new(
        session: SessionConfig,
        options: WorkerOptions,
        registry: Arc<BackendRegistry>,
    ) -> Self {
        Self {
            session,
            options,
            registry,
        }
    }

    /// Start the worker thread.
    pub fn spawn(self) -> Result<WorkerHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let state = Arc::new(AtomicU8::new(WorkerState::Idle as u8));
        let confidence = SharedConfidence::new(self.session.confidence);
        let mailbox = Arc::new(Mailbox::new());
        let (events_tx, events_rx) = unbounded();

        let ctx = WorkerContext {
            session: self.session,
            options: self.options,
            registry: self.registry,
            stop: stop.clone(),
            state: state.clone(),
            confidence: confidence.clone(),
            mailbox: mailbox.clone(),
            events: events_tx,
        };
        let join = std::thread::Builder::new()
            .name("firewatch-worker".to_string())
            .spawn(move || ctx.run())
            .map_err(|e| anyhow!("failed to spawn worker thread: {}", e))?;

        Ok(WorkerHandle {
            stop,
            state,
            confidence,
            mailbox,
            events: events_rx,
            join: Some(join),
        })
    }
}

/// Owner's side of a running worker. Dropping the handle stops the worker.
pub struct WorkerHandle {
    stop: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    confidence: SharedConfidence,
    mailbox: Arc<Mailbox<Publication>>,
    events: Receiver<WorkerEvent>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// True once the thread has exited (or was already joined).
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |join| join.is_finished())
    }

    /// Change the threshold used for the next frame. Returns the clamped value.
    pub fn set_confidence(&self, value: f32) -> f32 {
        self.confidence.set(value)
    }

    /// Latest unread publication.
    pub fn take_publication(&self) -> Option<Publication> {
        self.mailbox.take()
    }

    pub fn wait_publication(&self, timeout: Duration) -> Option<Publication> {
        self.mailbox.wait(timeout)
    }

    /// Publications replaced before the UI read them.
    pub fn skipped_publications(&self) -> u64 {
        self.mailbox.overwritten()
    }

    /// Drain all pending events without blocking.
    pub fn events(&self) -> Vec<WorkerEvent> {
        self.events.try_iter().collect()
    }

    /// Wait up to `timeout` for the next event.
    pub fn recv_event(&self, timeout: Duration) -> Option<WorkerEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Ask the worker to stop without waiting.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Stop and join. Safe to call more than once.
    ///
    /// A panic on the worker thread is returned as an error.
    pub fn stop(&mut self) -> Result<()> {
        self.request_stop();
        if let Some(join) = self.join.take() {
            join.join().map_err(|payload| {
                let reason = panic_message(payload.as_ref());
                self.state.store(WorkerState::Idle as u8, Ordering::SeqCst);
                anyhow!("worker thread panicked: {}", reason)
            })?;
        }
        Ok(())
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::error!("{}", err);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

struct WorkerContext {
    session: SessionConfig,
    options: WorkerOptions,
    registry: Arc<BackendRegistry>,
    stop: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    confidence: SharedConfidence,
    mailbox: Arc<Mailbox<Publication>>,
    events: Sender<WorkerEvent>,
}

impl WorkerContext {
    fn run(self) {
        let reason = match self.session_loop() {
            Ok(reason) => reason,
            Err(err) => {
                log::error!("worker: {}", err);
                self.set_state(WorkerState::Error);
                self.status(Phase::Error, err.to_string(), err.severity());
                ExitReason::Failed(err.kind())
            }
        };
        self.set_state(WorkerState::Idle);
        self.emit(WorkerEvent::Finished(reason));
    }

    fn session_loop(&self) -> Result<ExitReason, SessionError> {
        self.set_state(WorkerState::Loading);
        self.status(
            Phase::Loading,
            format!("Loading model {}...", self.session.model),
            Severity::Warning,
        );
        let mut backend = self.load_backend()?;
        self.status(
            Phase::Ready,
            format!("Model loaded ({} engine)", backend.name()),
            Severity::Ok,
        );

        if self.stop_requested() {
            return Ok(self.stopped());
        }

        let mut source = FrameSource::open(&self.session.source, &self.options.source)?;
        self.set_state(WorkerState::Running);
        self.status(
            Phase::Running,
            format!("Detecting on {}", self.session.source),
            Severity::Ok,
        );
        let result = self.frame_loop(&mut source, backend.as_mut());
        source.close();
        let stats = source.stats();
        log::info!(
            "worker: {} frames from {} ({} reconnects)",
            stats.frames_captured,
            stats.descriptor,
            stats.reconnects
        );
        result
    }

    fn load_backend(&self) -> Result<Box<dyn DetectorBackend>, SessionError> {
        let model = resolve_model(&self.session.model)?;
        let mut backend = self.registry.load(&model, &self.options.engine)?;
        backend
            .warm_up()
            .map_err(|err| SessionError::model_load(&model, format!("{:#}", err)))?;
        Ok(backend)
    }

    fn frame_loop(
        &self,
        source: &mut FrameSource,
        backend: &mut dyn DetectorBackend,
    ) -> Result<ExitReason, SessionError> {
        let mut fps = FpsCounter::new();
        let mut sequence = 0u64;
        loop {
            if self.stop_requested() {
                return Ok(self.stopped());
            }
            let read = source
                .next()
                .map_err(|err| SessionError::ReadFailure(format!("{:#}", err)))?;
            match read {
                SourceRead::Frame(frame) => {
                    let detections = backend
                        .detect(&frame, self.confidence.get())
                        .map_err(|err| SessionError::InferenceError(format!("{:#}", err)))?;
                    sequence += 1;
                    self.mailbox.put(Publication {
                        sequence,
                        frame,
                        detections,
                    });
                    if let Some(sample) = fps.tick() {
                        self.emit(WorkerEvent::Fps(sample));
                    }
                }
                SourceRead::Reconnecting(reason) => {
                    fps.reset();
                    self.status(
                        Phase::Reconnecting,
                        format!("Camera read failed, reconnecting: {}", reason),
                        Severity::Warning,
                    );
                }
                SourceRead::EndOfStream => {
                    let message = if source.descriptor().is_image() {
                        self.emit(WorkerEvent::Fps(0.0));
                        "Image detection complete"
                    } else {
                        "Stream ended"
                    };
                    self.status(Phase::EndOfStream, message, Severity::Ok);
                    return Ok(ExitReason::Completed);
                }
            }
        }
    }

    fn stopped(&self) -> ExitReason {
        self.set_state(WorkerState::Stopping);
        self.status(Phase::Stopped, "Detection stopped", Severity::Idle);
        ExitReason::Stopped
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn status(&self, phase: Phase, message: impl Into<String>, severity: Severity) {
        let event = StatusEvent::new(phase, message, severity);
        log::info!("worker: {}", event.message);
        self.emit(WorkerEvent::Status(event));
    }

    fn emit(&self, event: WorkerEvent) {
        // The receiver is gone only when the handle was dropped mid-shutdown.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(model: &str, source: &str) -> SessionConfig {
        SessionConfig {
            model: model.to_string(),
            source: source.parse().expect("valid source"),
            confidence: 0.25,
            save_results: false,
        }
    }

    fn spawn(model: &str, source: &str) -> WorkerHandle {
        let options = WorkerOptions {
            source: SourceOptions {
                reconnect_delay: Duration::from_millis(1),
                ..SourceOptions::default()
            },
            engine: EngineOptions::default(),
        };
        Worker::new(
            session(model, source),
            options,
            Arc::new(BackendRegistry::with_builtin()),
        )
        .spawn()
        .expect("spawn worker")
    }

    fn collect_until_finished(handle: &WorkerHandle) -> Vec<WorkerEvent> {
        let mut events = Vec::new();
        while let Some(event) = handle.recv_event(Duration::from_secs(5)) {
            let done = matches!(event, WorkerEvent::Finished(_));
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    fn phases(events: &[WorkerEvent]) -> Vec<Phase> {
        events
            .iter()
            .filter_map(|event| match event {
                WorkerEvent::Status(status) => Some(status.phase),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn video_runs_to_end_of_stream() {
        let mut handle = spawn("stub://detector?fire=1", "stub://video?frames=5");
        let events = collect_until_finished(&handle);
        assert_eq!(
            phases(&events),
            vec![Phase::Loading, Phase::Ready, Phase::Running, Phase::EndOfStream]
        );
        assert_eq!(
            events.last(),
            Some(&WorkerEvent::Finished(ExitReason::Completed))
        );
        let publication = handle.take_publication().expect("last frame published");
        assert_eq!(publication.sequence, 5);
        assert_eq!(publication.detections.len(), 1);
        handle.stop().expect("join");
        assert_eq!(handle.state(), WorkerState::Idle);
    }

    #[test]
    fn missing_model_never_runs() {
        let mut handle = spawn("weights/missing.pt", "stub://video");
        let events = collect_until_finished(&handle);
        let phases = phases(&events);
        assert!(!phases.contains(&Phase::Running));
        assert_eq!(phases.last(), Some(&Phase::Error));
        assert_eq!(
            events.last(),
            Some(&WorkerEvent::Finished(ExitReason::Failed("model_not_found")))
        );
        assert!(handle.take_publication().is_none());
        handle.stop().expect("join");
    }

    #[test]
    fn inference_failure_ends_the_loop() {
        let mut handle = spawn("stub://detector?fire=1&fail_at=2", "stub://camera");
        let events = collect_until_finished(&handle);
        assert_eq!(
            events.last(),
            Some(&WorkerEvent::Finished(ExitReason::Failed("inference_error")))
        );
        handle.stop().expect("join");
    }

    #[test]
    fn stop_is_idempotent_and_joins() {
        let mut handle = spawn("stub://detector", "stub://camera");
        assert!(handle.wait_publication(Duration::from_secs(5)).is_some());
        handle.stop().expect("first stop");
        handle.stop().expect("second stop");
        assert!(handle.is_finished());
        let events = handle.events();
        assert!(events.contains(&WorkerEvent::Finished(ExitReason::Stopped)));
        assert_eq!(handle.state(), WorkerState::Idle);
    }

    #[test]
    fn camera_reconnects_are_reported() {
        let handle = spawn("stub://detector", "stub://camera?fail_every=2");
        let mut reconnecting = 0;
        while reconnecting < 2 {
            match handle.recv_event(Duration::from_secs(5)) {
                Some(WorkerEvent::Status(status)) if status.phase == Phase::Reconnecting => {
                    assert_eq!(status.severity, Severity::Warning);
                    reconnecting += 1;
                }
                Some(_) => {}
                None => panic!("no reconnect reported"),
            }
        }
    }

    #[test]
    fn shared_confidence_clamps() {
        let shared = SharedConfidence::new(5.0);
        assert_eq!(shared.get(), 1.0);
        assert_eq!(shared.set(0.0), 0.01);
        assert_eq!(shared.get(), 0.01);
    }
}
