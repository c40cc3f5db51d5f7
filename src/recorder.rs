//! Persistence of annotated detection frames.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;
use image::{ImageFormat, RgbImage};
use serde::Serialize;

use crate::detect::Detection;
use crate::error::SessionError;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

#[derive(Serialize)]
struct Sidecar<'a> {
    image: &'a str,
    saved_at: String,
    width: u32,
    height: u32,
    detections: &'a [Detection],
}

/// Writes annotated frames as `detection_<timestamp>_<n>.jpg`.
///
/// The timestamp has millisecond resolution and never goes backwards within a
/// recorder; the counter suffix keeps names distinct when several frames land
/// in the same millisecond.
pub struct ResultRecorder {
    dir: PathBuf,
    write_json: bool,
    dir_ready: bool,
    counter: u64,
    last_stamp: String,
}

impl ResultRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_json: false,
            dir_ready: false,
            counter: 0,
            last_stamp: String::new(),
        }
    }

    /// Also write a JSON file with the detections next to every image.
    pub fn with_json(mut self, enabled: bool) -> Self {
        self.write_json = enabled;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of frames written so far.
    pub fn saved(&self) -> u64 {
        self.counter
    }

    /// Save one annotated frame. Returns the image path.
    pub fn save(
        &mut self,
        image: &RgbImage,
        detections: &[Detection],
    ) -> Result<PathBuf, SessionError> {
        self.try_save(image, detections).map_err(|err| {
            log::warn!("ResultRecorder: {:#}", err);
            SessionError::PersistError(format!("{:#}", err))
        })
    }

    fn try_save(&mut self, image: &RgbImage, detections: &[Detection]) -> anyhow::Result<PathBuf> {
        if !self.dir_ready {
            fs::create_dir_all(&self.dir)
                .with_context(|| format!("create results directory {}", self.dir.display()))?;
            self.dir_ready = true;
        }

        let now = Local::now().format(TIMESTAMP_FORMAT).to_string();
        if now > self.last_stamp {
            self.last_stamp = now;
        }
        let stem = format!("detection_{}_{:010}", self.last_stamp, self.counter);
        let path = self.dir.join(format!("{}.jpg", stem));

        image
            .save_with_format(&path, ImageFormat::Jpeg)
            .with_context(|| format!("write {}", path.display()))?;

        if self.write_json {
            let json_path = self.dir.join(format!("{}.json", stem));
            let file_name = format!("{}.jpg", stem);
            let sidecar = Sidecar {
                image: &file_name,
                saved_at: self.last_stamp.clone(),
                width: image.width(),
                height: image.height(),
                detections,
            };
            let payload = serde_json::to_vec_pretty(&sidecar)?;
            fs::write(&json_path, payload)
                .with_context(|| format!("write {}", json_path.display()))?;
        }

        self.counter += 1;
        log::info!("ResultRecorder: saved {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    #[test]
    fn creates_directory_and_never_reuses_names() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let results = dir.path().join("results");
        let mut recorder = ResultRecorder::new(&results);
        let image = RgbImage::new(16, 16);

        let first = recorder.save(&image, &[])?;
        let second = recorder.save(&image, &[])?;
        assert!(results.is_dir());
        assert_ne!(first, second);
        assert!(first < second);
        assert!(first
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("detection_") && n.ends_with(".jpg")));
        assert_eq!(recorder.saved(), 2);
        Ok(())
    }

    #[test]
    fn names_sort_in_save_order_past_a_million() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut recorder = ResultRecorder::new(dir.path());
        recorder.last_stamp = "99991231_235959_999".to_string();
        recorder.counter = 999_999;
        let image = RgbImage::new(4, 4);

        let before = recorder.save(&image, &[])?;
        let after = recorder.save(&image, &[])?;
        assert!(before < after);
        assert!(after.to_string_lossy().ends_with("_0001000000.jpg"));
        Ok(())
    }

    #[test]
    fn writes_json_sidecar() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut recorder = ResultRecorder::new(dir.path()).with_json(true);
        let detections = vec![Detection::new(
            1,
            "fire",
            0.8,
            BoundingBox::new(1.0, 2.0, 3.0, 4.0),
        )];
        let path = recorder.save(&RgbImage::new(8, 8), &detections)?;
        let json = fs::read_to_string(path.with_extension("json"))?;
        let value: serde_json::Value = serde_json::from_str(&json)?;
        assert_eq!(value["detections"][0]["class_name"], "fire");
        assert_eq!(value["width"], 8);
        Ok(())
    }

    #[test]
    fn unwritable_directory_is_a_persist_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let blocker = dir.path().join("occupied");
        fs::write(&blocker, b"file, not a directory")?;
        let mut recorder = ResultRecorder::new(blocker.join("results"));
        let err = recorder.save(&RgbImage::new(4, 4), &[]).unwrap_err();
        assert_eq!(err.kind(), "persist_error");
        assert_eq!(recorder.saved(), 0);
        Ok(())
    }
}
