use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::EngineOptions;
use crate::ingest::{SourceDescriptor, SourceOptions};

const DEFAULT_MODEL: &str = "weights/best.onnx";
const DEFAULT_SOURCE: &str = "camera:0";
const DEFAULT_CONFIDENCE: f32 = 0.25;
const DEFAULT_WEIGHTS_DIR: &str = "weights";
const DEFAULT_RESULTS_DIR: &str = "results";
const DEFAULT_RECONNECT_DELAY_MS: u64 = 500;
const MIN_RECONNECT_DELAY_MS: u64 = 50;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_MAX_DETECTIONS: usize = 300;
const DEFAULT_CLASS_NAMES: &[&str] = &["smoke", "fire"];

/// Lowest and highest accepted confidence threshold.
pub const MIN_CONFIDENCE: f32 = 0.01;
pub const MAX_CONFIDENCE: f32 = 1.0;

/// Clamp a threshold into the accepted range. NaN becomes the minimum.
pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        return MIN_CONFIDENCE;
    }
    value.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    session: Option<SessionConfigFile>,
    paths: Option<PathsConfigFile>,
    camera: Option<CameraConfigFile>,
    engine: Option<EngineConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SessionConfigFile {
    model: Option<String>,
    source: Option<String>,
    confidence: Option<f32>,
    save_results: Option<bool>,
    save_json: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct PathsConfigFile {
    weights: Option<PathBuf>,
    results: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    reconnect_delay_ms: Option<u64>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct EngineConfigFile {
    input_size: Option<u32>,
    iou_threshold: Option<f32>,
    max_detections: Option<usize>,
    class_names: Option<Vec<String>>,
}

/// What one detection run needs. Passed by value into the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Model path or `stub://` identifier.
    pub model: String,
    pub source: SourceDescriptor,
    pub confidence: f32,
    pub save_results: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub save_json: bool,
    pub weights_dir: PathBuf,
    pub results_dir: PathBuf,
    pub camera: SourceOptions,
    pub engine: EngineOptions,
}

impl AppConfig {
    /// Load from `FIREWATCH_CONFIG` (TOML, optional), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FIREWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document without consulting the environment.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let file: AppConfigFile =
            toml::from_str(raw).map_err(|e| anyhow!("invalid config: {}", e))?;
        let mut cfg = Self::from_file(file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Result<Self> {
        let session_file = file.session.unwrap_or_default();
        let source = session_file
            .source
            .as_deref()
            .unwrap_or(DEFAULT_SOURCE)
            .parse::<SourceDescriptor>()
            .map_err(|e| anyhow!("session.source: {}", e))?;
        let session = SessionConfig {
            model: session_file
                .model
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            source,
            confidence: session_file.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            save_results: session_file.save_results.unwrap_or(false),
        };

        let paths = file.paths.unwrap_or_default();
        let camera_file = file.camera.unwrap_or_default();
        let camera = SourceOptions {
            width: camera_file.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            target_fps: camera_file.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            reconnect_delay: Duration::from_millis(
                camera_file
                    .reconnect_delay_ms
                    .unwrap_or(DEFAULT_RECONNECT_DELAY_MS),
            ),
        };

        let engine_file = file.engine.unwrap_or_default();
        let engine = EngineOptions {
            input_size: engine_file.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            iou_threshold: engine_file.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
            max_detections: engine_file
                .max_detections
                .unwrap_or(DEFAULT_MAX_DETECTIONS),
            class_names: engine_file.class_names.unwrap_or_else(|| {
                DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect()
            }),
        };

        Ok(Self {
            session,
            save_json: session_file.save_json.unwrap_or(false),
            weights_dir: paths
                .weights
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WEIGHTS_DIR)),
            results_dir: paths
                .results
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RESULTS_DIR)),
            camera,
            engine,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(model) = std::env::var("FIREWATCH_MODEL") {
            if !model.trim().is_empty() {
                self.session.model = model;
            }
        }
        if let Ok(source) = std::env::var("FIREWATCH_SOURCE") {
            if !source.trim().is_empty() {
                self.session.source = source
                    .parse()
                    .map_err(|e| anyhow!("FIREWATCH_SOURCE: {}", e))?;
            }
        }
        if let Ok(confidence) = std::env::var("FIREWATCH_CONFIDENCE") {
            self.session.confidence = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("FIREWATCH_CONFIDENCE must be a number"))?;
        }
        if let Ok(path) = std::env::var("FIREWATCH_WEIGHTS_DIR") {
            if !path.trim().is_empty() {
                self.weights_dir = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("FIREWATCH_RESULTS_DIR") {
            if !path.trim().is_empty() {
                self.results_dir = PathBuf::from(path);
            }
        }
        if let Ok(save) = std::env::var("FIREWATCH_SAVE_RESULTS") {
            self.session.save_results = parse_bool(&save)
                .ok_or_else(|| anyhow!("FIREWATCH_SAVE_RESULTS must be true or false"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let confidence = self.session.confidence;
        if !(MIN_CONFIDENCE..=MAX_CONFIDENCE).contains(&confidence) {
            return Err(anyhow!(
                "confidence {} is outside {}..={}",
                confidence,
                MIN_CONFIDENCE,
                MAX_CONFIDENCE
            ));
        }
        if self.session.model.trim().is_empty() {
            return Err(anyhow!("model must not be empty"));
        }
        if self.engine.input_size == 0 || self.engine.input_size % 32 != 0 {
            return Err(anyhow!(
                "engine.input_size must be a positive multiple of 32, got {}",
                self.engine.input_size
            ));
        }
        if !(0.0..=1.0).contains(&self.engine.iou_threshold) {
            return Err(anyhow!("engine.iou_threshold must be within 0..=1"));
        }
        if self.engine.max_detections == 0 {
            return Err(anyhow!("engine.max_detections must be greater than zero"));
        }
        if self.engine.class_names.is_empty() {
            return Err(anyhow!("engine.class_names must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 || self.camera.target_fps == 0 {
            return Err(anyhow!("camera width, height and target_fps must be positive"));
        }
        if self.camera.reconnect_delay < Duration::from_millis(MIN_RECONNECT_DELAY_MS) {
            return Err(anyhow!(
                "camera.reconnect_delay_ms must be at least {}, got {}",
                MIN_RECONNECT_DELAY_MS,
                self.camera.reconnect_delay.as_millis()
            ));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() -> Result<()> {
        let cfg = AppConfig::from_toml("")?;
        assert_eq!(cfg.session.model, DEFAULT_MODEL);
        assert_eq!(cfg.session.source, SourceDescriptor::camera_index(0));
        assert!((cfg.session.confidence - 0.25).abs() < f32::EPSILON);
        assert!(!cfg.session.save_results);
        assert_eq!(cfg.engine.class_names, vec!["smoke", "fire"]);
        assert_eq!(cfg.camera.reconnect_delay, Duration::from_millis(500));
        Ok(())
    }

    #[test]
    fn sections_override_defaults() -> Result<()> {
        let cfg = AppConfig::from_toml(
            r#"
            [session]
            model = "stub://detector?fire=1"
            source = "clips/kitchen.mp4"
            confidence = 0.6
            save_results = true

            [engine]
            input_size = 320
            class_names = ["smoke", "fire", "spark"]
            "#,
        )?;
        assert_eq!(cfg.session.model, "stub://detector?fire=1");
        assert_eq!(
            cfg.session.source,
            SourceDescriptor::Video(PathBuf::from("clips/kitchen.mp4"))
        );
        assert!(cfg.session.save_results);
        assert_eq!(cfg.engine.input_size, 320);
        assert_eq!(cfg.engine.class_names.len(), 3);
        Ok(())
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(AppConfig::from_toml("[session]\nconfidence = 1.5").is_err());
        assert!(AppConfig::from_toml("[engine]\ninput_size = 300").is_err());
        assert!(AppConfig::from_toml("[session]\nsource = \"rtsp://cam/1\"").is_err());
    }

    #[test]
    fn reconnect_delay_has_a_floor() -> Result<()> {
        assert!(AppConfig::from_toml("[camera]\nreconnect_delay_ms = 0").is_err());
        assert!(AppConfig::from_toml("[camera]\nreconnect_delay_ms = 10").is_err());
        let cfg = AppConfig::from_toml("[camera]\nreconnect_delay_ms = 50")?;
        assert_eq!(cfg.camera.reconnect_delay, Duration::from_millis(50));
        Ok(())
    }

    #[test]
    fn clamp_confidence_bounds() {
        assert_eq!(clamp_confidence(0.0), MIN_CONFIDENCE);
        assert_eq!(clamp_confidence(2.0), MAX_CONFIDENCE);
        assert_eq!(clamp_confidence(f32::NAN), MIN_CONFIDENCE);
        assert_eq!(clamp_confidence(0.5), 0.5);
    }
}
