use std::fmt;
use std::path::PathBuf;

use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend is created by a `ModelLoader` on the worker thread and lives there
/// until the session ends. `detect` receives the confidence threshold on every
/// call so a threshold change takes effect on the next frame without a reload.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class names indexed by class id.
    fn class_names(&self) -> &[String];

    /// Run detection on a frame, keeping detections at or above `confidence`.
    ///
    /// Implementations must treat the frame as read-only.
    fn detect(&mut self, frame: &Frame, confidence: f32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, run once after loading.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A resolved model identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelRef {
    /// Synthetic model (`stub://...`).
    Synthetic(String),
    /// Absolute path to an artifact that existed at resolution time.
    File(PathBuf),
}

impl ModelRef {
    /// Lowercase file extension, if the model is a file.
    pub fn extension(&self) -> Option<String> {
        match self {
            ModelRef::Synthetic(_) => None,
            ModelRef::File(path) => path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.to_ascii_lowercase()),
        }
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelRef::Synthetic(id) => f.write_str(id),
            ModelRef::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Inference settings shared by all loaders.
#[derive(Clone, Debug)]
pub struct EngineOptions {
    /// Square model input edge in pixels.
    pub input_size: u32,
    /// IoU above which overlapping boxes of one class are suppressed.
    pub iou_threshold: f32,
    /// Upper bound on detections per frame.
    pub max_detections: usize,
    /// Class names used when the model carries none.
    pub class_names: Vec<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            input_size: 640,
            iou_threshold: 0.45,
            max_detections: 300,
            class_names: vec!["smoke".to_string(), "fire".to_string()],
        }
    }
}

/// Creates backends from model artifacts.
pub trait ModelLoader: Send + Sync {
    /// Loader identifier.
    fn name(&self) -> &'static str;

    /// Returns true when this loader understands the model.
    fn accepts(&self, model: &ModelRef) -> bool;

    /// Load the model. Called on the worker thread.
    fn load(&self, model: &ModelRef, options: &EngineOptions) -> Result<Box<dyn DetectorBackend>>;
}
