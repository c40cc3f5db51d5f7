//! UI-thread controller.
//!
//! Owns the session settings, the worker handle and everything the screen
//! shows: the annotated frame, per-class stats, status line, FPS and the info
//! log. Nothing here blocks on acquisition or inference; `pump` only drains
//! what the worker has already produced.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbImage;

use crate::config::{clamp_confidence, AppConfig, SessionConfig};
use crate::detect::{resolve_model, BackendRegistry, Detection, DetectionStats};
use crate::error::{SessionError, Severity};
use crate::frame::Publication;
use crate::ingest::{FrameSource, SourceDescriptor, SourceRead};
use crate::recorder::ResultRecorder;
use crate::render;
use crate::worker::{
    ExitReason, StatusEvent, Worker, WorkerEvent, WorkerHandle, WorkerOptions, WorkerState,
};

const INFO_LOG_CAPACITY: usize = 200;
/// Confidence changes smaller than this are applied silently.
const CONFIDENCE_LOG_STEP: f32 = 0.05;

/// Text and color of the status bar.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusLine {
    pub text: String,
    pub severity: Severity,
}

impl StatusLine {
    pub fn color(&self) -> &'static str {
        self.severity.color()
    }
}

/// What one `pump` call changed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PumpOutcome {
    /// A new frame was rendered.
    pub rendered: bool,
    /// The worker ended and was reaped.
    pub finished: Option<ExitReason>,
}

pub struct Presenter {
    registry: Arc<BackendRegistry>,
    options: WorkerOptions,
    session: SessionConfig,
    camera: SourceDescriptor,
    recorder: ResultRecorder,
    worker: Option<WorkerHandle>,
    display: Option<RgbImage>,
    detections: Vec<Detection>,
    stats: DetectionStats,
    stats_visible: bool,
    status: StatusLine,
    fps: f32,
    resolution: Option<(u32, u32)>,
    last_sequence: u64,
    info_log: VecDeque<String>,
}

impl Presenter {
    pub fn new(config: &AppConfig, registry: Arc<BackendRegistry>) -> Self {
        let camera = if config.session.source.is_camera() {
            config.session.source.clone()
        } else {
            SourceDescriptor::camera_index(0)
        };
        let mut presenter = Self {
            registry,
            options: WorkerOptions {
                source: config.camera.clone(),
                engine: config.engine.clone(),
            },
            session: config.session.clone(),
            camera,
            recorder: ResultRecorder::new(&config.results_dir).with_json(config.save_json),
            worker: None,
            display: None,
            detections: Vec::new(),
            stats: DetectionStats::default(),
            stats_visible: true,
            status: StatusLine {
                text: "Ready".to_string(),
                severity: Severity::Idle,
            },
            fps: 0.0,
            resolution: None,
            last_sequence: 0,
            info_log: VecDeque::with_capacity(INFO_LOG_CAPACITY),
        };
        presenter.session.confidence = clamp_confidence(presenter.session.confidence);
        presenter
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Validate the session and launch a worker.
    ///
    /// Returns `Ok(false)` when a worker is already running.
    pub fn start(&mut self) -> Result<bool, SessionError> {
        if self.worker.is_some() {
            self.log_info("Detection already running");
            return Ok(false);
        }
        if let Err(err) = self.validate_session() {
            self.report_error(&err);
            return Err(err);
        }

        self.stats.clear();
        self.detections.clear();
        self.fps = 0.0;
        self.last_sequence = 0;
        self.log_info(format!("Using model {}", self.session.model));
        self.log_info(format!("Using source {}", self.session.source));

        let worker = Worker::new(
            self.session.clone(),
            self.options.clone(),
            self.registry.clone(),
        );
        match worker.spawn() {
            Ok(handle) => {
                self.worker = Some(handle);
                self.set_status("Detecting...", Severity::Ok);
                Ok(true)
            }
            Err(err) => {
                let err = SessionError::Worker(format!("{:#}", err));
                self.report_error(&err);
                Err(err)
            }
        }
    }

    fn validate_session(&self) -> Result<(), SessionError> {
        resolve_model(&self.session.model)?;
        self.session.source.check_available()
    }

    /// Stop the running worker and wait for it. Returns false when idle.
    pub fn stop(&mut self) -> bool {
        let Some(mut handle) = self.worker.take() else {
            return false;
        };
        self.log_info("Stopping detection");
        let joined = handle.stop();
        self.drain(&handle);
        if let Err(err) = joined {
            self.report_error(&SessionError::Worker(format!("{:#}", err)));
        } else {
            self.set_status("Ready", Severity::Idle);
        }
        true
    }

    /// Stop before exit.
    pub fn shutdown(&mut self) {
        if self.stop() {
            log::info!("Presenter: worker stopped for shutdown");
        }
    }

    /// Set the threshold. Applied to a running worker from its next frame.
    pub fn set_confidence(&mut self, value: f32) -> f32 {
        let clamped = clamp_confidence(value);
        let previous = self.session.confidence;
        self.session.confidence = clamped;
        if let Some(handle) = &self.worker {
            handle.set_confidence(clamped);
        }
        if (previous - clamped).abs() >= CONFIDENCE_LOG_STEP {
            self.log_info(format!("Confidence set to {:.2}", clamped));
        }
        clamped
    }

    /// Takes effect on the next start.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.session.model = model.into();
        self.log_info(format!("Selected model {}", self.session.model));
    }

    /// Takes effect on the next start.
    pub fn set_source(&mut self, source: SourceDescriptor) {
        if source.is_camera() {
            self.camera = source.clone();
        }
        self.log_info(format!("Selected source {}", source));
        self.session.source = source;
    }

    pub fn set_save_results(&mut self, enabled: bool) {
        self.session.save_results = enabled;
        self.log_info(if enabled {
            "Saving detection results enabled"
        } else {
            "Saving detection results disabled"
        });
    }

    /// Show or hide the stats table. Returns the new visibility.
    pub fn toggle_stats(&mut self) -> bool {
        self.stats_visible = !self.stats_visible;
        self.log_info(if self.stats_visible {
            "Showing detection stats"
        } else {
            "Hiding detection stats"
        });
        self.stats_visible
    }

    /// Select a still image and show it as a preview.
    pub fn open_image(&mut self, path: impl Into<PathBuf>) -> Result<(), SessionError> {
        let path = path.into();
        let image = image::open(&path)
            .map_err(|err| SessionError::source_unavailable(path.display(), err))?
            .to_rgb8();
        self.resolution = Some(image.dimensions());
        self.display = Some(image);
        self.log_info(format!("Opened image {}", path.display()));
        self.set_source(SourceDescriptor::Image(path));
        self.set_status("Image loaded, ready to detect", Severity::Ok);
        Ok(())
    }

    /// Select a video file and show its first frame as a preview.
    pub fn open_video(&mut self, path: impl Into<PathBuf>) -> Result<(), SessionError> {
        let descriptor = SourceDescriptor::Video(path.into());
        let mut source = FrameSource::open(&descriptor, &self.options.source)?;
        let preview = source.next();
        source.close();
        match preview {
            Ok(SourceRead::Frame(frame)) => {
                let (w, h) = (frame.width(), frame.height());
                self.resolution = Some((w, h));
                self.display = Some(frame.into_image());
                self.log_info(format!("Video resolution {}x{}", w, h));
                self.set_status("Video loaded, ready to detect", Severity::Ok);
            }
            Ok(_) => self.log_info("Video has no frames to preview"),
            Err(err) => self.log_info(format!("Cannot load video preview: {:#}", err)),
        }
        self.set_source(descriptor);
        Ok(())
    }

    /// Stop the camera if it is running, otherwise switch to it and start.
    pub fn toggle_camera(&mut self) -> Result<bool, SessionError> {
        if self.worker.is_some() && self.session.source.is_camera() {
            self.stop();
            self.log_info("Camera off");
            return Ok(false);
        }
        self.stop();
        let camera = self.camera.clone();
        self.set_source(camera);
        self.log_info("Camera on");
        self.start()
    }

    // ------------------------------------------------------------------
    // Worker output
    // ------------------------------------------------------------------

    /// Apply everything the worker produced since the last call.
    pub fn pump(&mut self) -> PumpOutcome {
        let mut outcome = PumpOutcome::default();
        let Some(handle) = self.worker.take() else {
            return outcome;
        };

        let mut finished = self.apply_events(handle.events());
        if let Some(publication) = handle.take_publication() {
            self.present(publication);
            outcome.rendered = true;
        }

        if finished.is_some() || handle.is_finished() {
            let mut handle = handle;
            let joined = handle.stop();
            if let Some(reason) = self.apply_events(handle.events()) {
                finished = Some(reason);
            }
            if let Some(publication) = handle.take_publication() {
                self.present(publication);
                outcome.rendered = true;
            }
            if let Err(err) = joined {
                self.report_error(&SessionError::Worker(format!("{:#}", err)));
                finished.get_or_insert(ExitReason::Failed("worker"));
            }
            log::debug!(
                "Presenter: worker reaped, {} publication(s) skipped",
                handle.skipped_publications()
            );
            outcome.finished = finished.or(Some(ExitReason::Stopped));
        } else {
            self.worker = Some(handle);
        }
        outcome
    }

    fn drain(&mut self, handle: &WorkerHandle) {
        self.apply_events(handle.events());
        if let Some(publication) = handle.take_publication() {
            self.present(publication);
        }
    }

    fn apply_events(&mut self, events: Vec<WorkerEvent>) -> Option<ExitReason> {
        let mut finished = None;
        for event in events {
            match event {
                WorkerEvent::Status(status) => self.apply_status(status),
                WorkerEvent::Fps(fps) => self.fps = fps,
                WorkerEvent::Finished(reason) => finished = Some(reason),
            }
        }
        finished
    }

    fn apply_status(&mut self, status: StatusEvent) {
        self.set_status(status.message, status.severity);
    }

    fn present(&mut self, publication: Publication) {
        let Publication {
            sequence,
            frame,
            detections,
        } = publication;
        if sequence <= self.last_sequence {
            log::warn!(
                "Presenter: dropping out-of-order publication {} (last {})",
                sequence,
                self.last_sequence
            );
            return;
        }
        self.last_sequence = sequence;

        let annotated = render::annotate(&frame, &detections);
        self.stats.replace(&detections);
        self.resolution = Some((frame.width(), frame.height()));
        if self.session.save_results {
            match self.recorder.save(&annotated, &detections) {
                Ok(path) => self.log_info(format!("Saved detection result {}", path.display())),
                Err(err) => self.log_info(err.to_string()),
            }
        }
        self.display = Some(annotated);
        self.detections = detections;
    }

    // ------------------------------------------------------------------
    // Status and log
    // ------------------------------------------------------------------

    fn set_status(&mut self, text: impl Into<String>, severity: Severity) {
        let text = text.into();
        self.log_info(format!("Status: {}", text));
        self.status = StatusLine { text, severity };
    }

    fn report_error(&mut self, err: &SessionError) {
        log::warn!("Presenter: {}", err);
        self.set_status(err.to_string(), err.severity());
    }

    fn log_info(&mut self, line: impl Into<String>) {
        let line = line.into();
        log::debug!("Presenter: {}", line);
        if self.info_log.len() == INFO_LOG_CAPACITY {
            self.info_log.pop_front();
        }
        self.info_log.push_back(line);
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn worker_state(&self) -> WorkerState {
        self.worker
            .as_ref()
            .map_or(WorkerState::Idle, |handle| handle.state())
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    pub fn display(&self) -> Option<&RgbImage> {
        self.display.as_ref()
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn stats(&self) -> &DetectionStats {
        &self.stats
    }

    pub fn stats_visible(&self) -> bool {
        self.stats_visible
    }

    pub fn status(&self) -> &StatusLine {
        &self.status
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.resolution
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    pub fn results_dir(&self) -> &Path {
        self.recorder.dir()
    }

    pub fn saved_results(&self) -> u64 {
        self.recorder.saved()
    }

    pub fn info_log(&self) -> impl Iterator<Item = &str> {
        self.info_log.iter().map(String::as_str)
    }
}

impl Drop for Presenter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn config(model: &str, source: &str) -> AppConfig {
        let mut cfg = AppConfig::from_toml("").expect("defaults");
        cfg.session.model = model.to_string();
        cfg.session.source = source.parse().expect("source");
        cfg
    }

    fn presenter(model: &str, source: &str) -> Presenter {
        Presenter::new(
            &config(model, source),
            Arc::new(BackendRegistry::with_builtin()),
        )
    }

    fn pump_until_finished(presenter: &mut Presenter) -> PumpOutcome {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            let outcome = presenter.pump();
            if outcome.finished.is_some() {
                return outcome;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("worker did not finish");
    }

    #[test]
    fn stop_when_idle_is_a_no_op() {
        let mut presenter = presenter("stub://detector", "stub://camera");
        assert!(!presenter.stop());
        assert_eq!(presenter.status().text, "Ready");
        assert_eq!(presenter.status().color(), "#CCCCCC");
    }

    #[test]
    fn missing_model_is_rejected_before_launch() {
        let mut presenter = presenter("weights/missing.pt", "stub://camera");
        let err = presenter.start().unwrap_err();
        assert_eq!(err.kind(), "model_not_found");
        assert!(!presenter.is_running());
        assert_eq!(presenter.status().severity, Severity::Error);
    }

    #[test]
    fn missing_camera_device_never_starts() {
        let mut presenter = presenter("stub://detector", "/dev/video97");
        let err = presenter.start().unwrap_err();
        assert_eq!(err.kind(), "source_unavailable");
        assert!(!presenter.is_running());
        assert_eq!(presenter.status().severity, Severity::Error);
    }

    #[test]
    fn video_session_reaps_itself() {
        let mut presenter = presenter("stub://detector?fire=2&smoke=1", "stub://video?frames=3");
        assert!(presenter.start().expect("start"));
        let outcome = pump_until_finished(&mut presenter);
        assert_eq!(outcome.finished, Some(ExitReason::Completed));
        assert!(!presenter.is_running());
        assert_eq!(presenter.status().text, "Stream ended");
        assert_eq!(presenter.stats().get("fire"), 2);
        assert_eq!(presenter.resolution(), Some((64, 48)));
        assert!(presenter.display().is_some());
    }

    #[test]
    fn confidence_is_clamped_and_kept_for_next_start() {
        let mut presenter = presenter("stub://detector", "stub://camera");
        assert_eq!(presenter.set_confidence(0.0), 0.01);
        assert_eq!(presenter.set_confidence(3.0), 1.0);
        assert_eq!(presenter.session().confidence, 1.0);
    }

    #[test]
    fn info_log_is_bounded() {
        let mut presenter = presenter("stub://detector", "stub://camera");
        for _ in 0..(INFO_LOG_CAPACITY + 50) {
            presenter.toggle_stats();
        }
        assert_eq!(presenter.info_log().count(), INFO_LOG_CAPACITY);
    }
}
