use anyhow::{anyhow, Result};

use crate::detect::backend::{DetectorBackend, EngineOptions, ModelLoader, ModelRef};
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;
use crate::ingest::synthetic::StubUrl;

const DEFAULT_CONFIDENCE: f32 = 0.9;

/// Query keys of a stub model URL that are settings rather than class counts.
const SETTING_KEYS: &[&str] = &["conf", "fail_at"];

/// One scripted detection. Box coordinates are fractions of the frame size.
#[derive(Clone, Debug)]
pub struct ScriptedDetection {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Stub backend for testing. Emits the same scripted detections on every frame.
///
/// Model URLs look like `stub://detector?fire=2&smoke=1&conf=0.8&fail_at=5`:
/// every other query key is a class name with a per-frame count.
pub struct StubBackend {
    class_names: Vec<String>,
    script: Vec<ScriptedDetection>,
    fail_at: Option<u64>,
    calls: u64,
}

impl StubBackend {
    pub fn new(class_names: Vec<String>, script: Vec<ScriptedDetection>) -> Self {
        Self {
            class_names,
            script,
            fail_at: None,
            calls: 0,
        }
    }

    /// Fail the `call`-th detect call (zero-based).
    pub fn failing_at(mut self, call: u64) -> Self {
        self.fail_at = Some(call);
        self
    }

    /// Build from a `stub://` model URL.
    pub fn from_url(raw: &str, options: &EngineOptions) -> Result<Self> {
        let url = StubUrl::parse(raw).ok_or_else(|| anyhow!("not a stub model: {}", raw))?;
        let confidence = url.param_f32("conf").unwrap_or(DEFAULT_CONFIDENCE);
        let mut class_names = options.class_names.clone();
        let mut script = Vec::new();

        for (key, value) in url.params() {
            if SETTING_KEYS.contains(&key) {
                continue;
            }
            let count: usize = value
                .parse()
                .map_err(|_| anyhow!("stub class '{}' needs a count, got '{}'", key, value))?;
            let class_id = match class_names.iter().position(|name| name == key) {
                Some(id) => id,
                None => {
                    class_names.push(key.to_string());
                    class_names.len() - 1
                }
            };
            for _ in 0..count {
                script.push(ScriptedDetection {
                    class_id,
                    confidence,
                    bbox: grid_cell(script.len()),
                });
            }
        }

        let mut backend = Self::new(class_names, script);
        backend.fail_at = url.param_u64("fail_at");
        Ok(backend)
    }
}

/// Non-overlapping cells on a 4x4 grid.
fn grid_cell(slot: usize) -> BoundingBox {
    let col = (slot % 4) as f32;
    let row = ((slot / 4) % 4) as f32;
    BoundingBox::new(
        col * 0.25 + 0.02,
        row * 0.25 + 0.02,
        col * 0.25 + 0.23,
        row * 0.25 + 0.23,
    )
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn detect(&mut self, frame: &Frame, confidence: f32) -> Result<Vec<Detection>> {
        let call = self.calls;
        self.calls += 1;
        if self.fail_at == Some(call) {
            return Err(anyhow!("stub inference failure on call {}", call));
        }

        let (w, h) = (frame.width() as f32, frame.height() as f32);
        Ok(self
            .script
            .iter()
            .filter(|scripted| scripted.confidence >= confidence)
            .map(|scripted| {
                let name = self
                    .class_names
                    .get(scripted.class_id)
                    .cloned()
                    .unwrap_or_else(|| format!("class{}", scripted.class_id));
                let b = scripted.bbox;
                Detection::new(
                    scripted.class_id,
                    name,
                    scripted.confidence,
                    BoundingBox::new(b.x1 * w, b.y1 * h, b.x2 * w, b.y2 * h),
                )
            })
            .collect())
    }
}

/// Loader for `stub://` models.
pub struct StubLoader;

impl ModelLoader for StubLoader {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn accepts(&self, model: &ModelRef) -> bool {
        matches!(model, ModelRef::Synthetic(_))
    }

    fn load(&self, model: &ModelRef, options: &EngineOptions) -> Result<Box<dyn DetectorBackend>> {
        match model {
            ModelRef::Synthetic(raw) => Ok(Box::new(StubBackend::from_url(raw, options)?)),
            ModelRef::File(path) => Err(anyhow!(
                "stub loader cannot open {}",
                path.display()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn frame() -> Frame {
        Frame::new(0, RgbImage::new(100, 80))
    }

    #[test]
    fn url_scripts_class_counts() -> Result<()> {
        let mut backend =
            StubBackend::from_url("stub://detector?fire=2&smoke=1", &EngineOptions::default())?;
        let detections = backend.detect(&frame(), 0.25)?;
        assert_eq!(detections.len(), 3);
        let fires = detections.iter().filter(|d| d.class_name == "fire").count();
        assert_eq!(fires, 2);
        assert!(detections.iter().all(|d| d.bbox.x2 <= 100.0 && d.bbox.y2 <= 80.0));
        assert_eq!(detections[0].class_id, 1);
        Ok(())
    }

    #[test]
    fn threshold_filters_scripted_detections() -> Result<()> {
        let mut backend = StubBackend::from_url(
            "stub://detector?fire=1&conf=0.5",
            &EngineOptions::default(),
        )?;
        assert_eq!(backend.detect(&frame(), 0.4)?.len(), 1);
        assert!(backend.detect(&frame(), 0.6)?.is_empty());
        Ok(())
    }

    #[test]
    fn unknown_classes_extend_the_name_table() -> Result<()> {
        let backend =
            StubBackend::from_url("stub://detector?person=1", &EngineOptions::default())?;
        assert_eq!(backend.class_names(), &["smoke", "fire", "person"]);
        assert!(StubBackend::from_url("stub://detector?fire=many", &EngineOptions::default())
            .is_err());
        Ok(())
    }

    #[test]
    fn scripted_failure() -> Result<()> {
        let mut backend = StubBackend::new(vec![], vec![]).failing_at(1);
        assert!(backend.detect(&frame(), 0.25).is_ok());
        assert!(backend.detect(&frame(), 0.25).is_err());
        assert!(backend.detect(&frame(), 0.25).is_ok());
        Ok(())
    }
}
