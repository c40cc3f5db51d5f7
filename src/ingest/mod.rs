//! Frame sources.
//!
//! This module hides a camera, a video file or a single still image behind one
//! pull-based interface:
//! - Cameras (V4L2, feature: ingest-v4l2)
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Still images (always available)
//! - Synthetic `stub://` sources (testing)
//!
//! `FrameSource::next` returns the next frame, or tells the caller that the
//! source is reconnecting (cameras) or has ended (files and images).
//!
//! Source policies:
//! - Cameras never end on their own. A failed read triggers a reconnect and is
//!   reported as `SourceRead::Reconnecting`, so the caller can check for a stop
//!   request between attempts.
//! - Video files and still images report `SourceRead::EndOfStream` exactly once.
//!   Pulling again after that is an error.

use anyhow::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::SessionError;
use crate::frame::Frame;

pub mod camera;
#[cfg(feature = "ingest-v4l2")]
mod camera_v4l2;
pub mod still;
pub(crate) mod synthetic;
pub mod video;
#[cfg(feature = "ingest-file-ffmpeg")]
mod video_ffmpeg;

pub use camera::{CameraConfig, CameraSource};
pub use still::StillImageSource;
pub use video::{VideoConfig, VideoSource};

/// File extensions treated as still images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// What the user selected as input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// Camera device (`/dev/video0`) or synthetic camera (`stub://camera`).
    Camera(String),
    /// Local video file or synthetic video (`stub://video`).
    Video(PathBuf),
    /// Single still image.
    Image(PathBuf),
}

impl SourceDescriptor {
    /// Camera by index, mapped to its device node.
    pub fn camera_index(index: u32) -> Self {
        SourceDescriptor::Camera(format!("/dev/video{}", index))
    }

    pub fn is_camera(&self) -> bool {
        matches!(self, SourceDescriptor::Camera(_))
    }

    pub fn is_image(&self) -> bool {
        matches!(self, SourceDescriptor::Image(_))
    }

    /// Short label for the source kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceDescriptor::Camera(_) => "camera",
            SourceDescriptor::Video(_) => "video",
            SourceDescriptor::Image(_) => "image",
        }
    }

    /// Returns true for synthetic `stub://` sources.
    pub fn is_synthetic(&self) -> bool {
        match self {
            SourceDescriptor::Camera(device) => device.starts_with(synthetic::STUB_SCHEME),
            SourceDescriptor::Video(path) | SourceDescriptor::Image(path) => path
                .to_str()
                .is_some_and(|p| p.starts_with(synthetic::STUB_SCHEME)),
        }
    }

    /// Check that the source can plausibly be opened, without opening it.
    ///
    /// Files must exist. Cameras need capture support in this build and an
    /// existing device node; a device that vanishes later fails on open.
    pub fn check_available(&self) -> Result<(), SessionError> {
        if self.is_synthetic() {
            return Ok(());
        }
        match self {
            SourceDescriptor::Camera(device) => {
                if !cfg!(feature = "ingest-v4l2") {
                    return Err(SessionError::source_unavailable(
                        self,
                        "camera capture requires the ingest-v4l2 feature",
                    ));
                }
                if !Path::new(device).exists() {
                    return Err(SessionError::source_unavailable(
                        self,
                        "camera device does not exist",
                    ));
                }
                Ok(())
            }
            SourceDescriptor::Video(path) | SourceDescriptor::Image(path) => {
                if path.is_file() {
                    Ok(())
                } else {
                    Err(SessionError::source_unavailable(
                        self,
                        "file does not exist or is not readable",
                    ))
                }
            }
        }
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Camera(device) => write!(f, "camera:{}", device),
            SourceDescriptor::Video(path) => write!(f, "video:{}", path.display()),
            SourceDescriptor::Image(path) => write!(f, "image:{}", path.display()),
        }
    }
}

impl FromStr for SourceDescriptor {
    type Err = SessionError;

    /// Accepted forms: `camera`, `camera:<index>`, `camera:<device>`, `/dev/videoN`,
    /// `video:<path>`, `image:<path>`, `stub://camera...`, `stub://video...`, or a bare
    /// path classified by extension.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SessionError::source_unavailable(raw, "empty source"));
        }
        if raw == "camera" {
            return Ok(SourceDescriptor::camera_index(0));
        }
        if let Some(rest) = raw.strip_prefix("camera:") {
            return Ok(match rest.parse::<u32>() {
                Ok(index) => SourceDescriptor::camera_index(index),
                Err(_) => SourceDescriptor::Camera(rest.to_string()),
            });
        }
        if let Some(rest) = raw.strip_prefix("video:") {
            return Ok(SourceDescriptor::Video(PathBuf::from(rest)));
        }
        if let Some(rest) = raw.strip_prefix("image:") {
            return Ok(SourceDescriptor::Image(PathBuf::from(rest)));
        }
        if raw.starts_with("/dev/video") || raw.starts_with("stub://camera") {
            return Ok(SourceDescriptor::Camera(raw.to_string()));
        }
        if raw.starts_with("stub://video") {
            return Ok(SourceDescriptor::Video(PathBuf::from(raw)));
        }
        if raw.contains("://") {
            return Err(SessionError::source_unavailable(
                raw,
                "only local files and camera devices are supported",
            ));
        }
        let path = PathBuf::from(raw);
        if has_image_extension(&path) {
            Ok(SourceDescriptor::Image(path))
        } else {
            Ok(SourceDescriptor::Video(path))
        }
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Capture settings shared by all source kinds.
#[derive(Clone, Debug)]
pub struct SourceOptions {
    /// Preferred camera frame width.
    pub width: u32,
    /// Preferred camera frame height.
    pub height: u32,
    /// Preferred camera frame rate.
    pub target_fps: u32,
    /// Pause between a failed camera read and the reconnect attempt.
    pub reconnect_delay: Duration,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            target_fps: 30,
            reconnect_delay: Duration::from_millis(500),
        }
    }
}

/// Result of pulling from a source.
#[derive(Debug)]
pub enum SourceRead {
    Frame(Frame),
    /// A camera read failed and the device is being reopened.
    Reconnecting(String),
    /// File or image exhausted. Reported once.
    EndOfStream,
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub reconnects: u64,
    pub descriptor: String,
}

/// Any supported source behind one interface.
pub struct FrameSource {
    descriptor: SourceDescriptor,
    backend: SourceBackend,
    resolution: Option<(u32, u32)>,
}

enum SourceBackend {
    Camera(CameraSource),
    Video(VideoSource),
    Image(StillImageSource),
}

impl FrameSource {
    /// Open a source. Failures are reported as `SourceUnavailable`.
    pub fn open(
        descriptor: &SourceDescriptor,
        options: &SourceOptions,
    ) -> Result<Self, SessionError> {
        let unavailable = |err: anyhow::Error| {
            SessionError::source_unavailable(descriptor, format!("{:#}", err))
        };
        let backend = match descriptor {
            SourceDescriptor::Camera(device) => {
                let mut source = CameraSource::new(CameraConfig {
                    device: device.clone(),
                    width: options.width,
                    height: options.height,
                    target_fps: options.target_fps,
                    reconnect_delay: options.reconnect_delay,
                })
                .map_err(unavailable)?;
                source.connect().map_err(unavailable)?;
                SourceBackend::Camera(source)
            }
            SourceDescriptor::Video(path) => {
                descriptor.check_available()?;
                let mut source = VideoSource::new(VideoConfig {
                    path: path.to_string_lossy().into_owned(),
                })
                .map_err(unavailable)?;
                source.connect().map_err(unavailable)?;
                SourceBackend::Video(source)
            }
            SourceDescriptor::Image(path) => {
                descriptor.check_available()?;
                SourceBackend::Image(StillImageSource::open(path).map_err(unavailable)?)
            }
        };
        log::info!("FrameSource: opened {}", descriptor);
        Ok(Self {
            descriptor: descriptor.clone(),
            backend,
            resolution: None,
        })
    }

    pub fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    /// Pull the next frame.
    pub fn next(&mut self) -> Result<SourceRead> {
        let read = match &mut self.backend {
            SourceBackend::Camera(source) => source.next(),
            SourceBackend::Video(source) => source.next(),
            SourceBackend::Image(source) => source.next(),
        }?;
        if let SourceRead::Frame(frame) = &read {
            self.resolution = Some((frame.width(), frame.height()));
        }
        Ok(read)
    }

    /// Size of the most recent frame, once one has been read.
    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.resolution
    }

    /// Release the underlying device or file.
    pub fn close(&mut self) {
        match &mut self.backend {
            SourceBackend::Camera(source) => source.close(),
            SourceBackend::Video(source) => source.close(),
            SourceBackend::Image(source) => source.close(),
        }
        log::debug!("FrameSource: closed {}", self.descriptor);
    }

    pub fn stats(&self) -> SourceStats {
        let (frames_captured, reconnects) = match &self.backend {
            SourceBackend::Camera(source) => (source.frames_captured(), source.reconnects()),
            SourceBackend::Video(source) => (source.frames_captured(), 0),
            SourceBackend::Image(source) => (source.frames_captured(), 0),
        };
        SourceStats {
            frames_captured,
            reconnects,
            descriptor: self.descriptor.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camera_forms() {
        assert_eq!(
            "camera".parse::<SourceDescriptor>().unwrap(),
            SourceDescriptor::Camera("/dev/video0".into())
        );
        assert_eq!(
            "camera:2".parse::<SourceDescriptor>().unwrap(),
            SourceDescriptor::Camera("/dev/video2".into())
        );
        assert!("stub://camera?fail_every=3"
            .parse::<SourceDescriptor>()
            .unwrap()
            .is_camera());
    }

    #[test]
    fn classifies_files_by_extension() {
        assert!("shots/fire.JPG".parse::<SourceDescriptor>().unwrap().is_image());
        assert_eq!(
            "clips/warehouse.mp4".parse::<SourceDescriptor>().unwrap(),
            SourceDescriptor::Video(PathBuf::from("clips/warehouse.mp4"))
        );
        assert!("rtsp://10.0.0.2/stream".parse::<SourceDescriptor>().is_err());
    }

    #[test]
    fn missing_files_are_unavailable() {
        let descriptor = SourceDescriptor::Video(PathBuf::from("/nonexistent/clip.mp4"));
        let err = FrameSource::open(&descriptor, &SourceOptions::default())
            .err()
            .expect("open must fail");
        assert_eq!(err.kind(), "source_unavailable");
    }

    #[test]
    fn missing_camera_device_is_unavailable() {
        let err = SourceDescriptor::camera_index(97).check_available().unwrap_err();
        assert_eq!(err.kind(), "source_unavailable");
        assert!(SourceDescriptor::Camera("stub://camera".into())
            .check_available()
            .is_ok());
    }

    #[test]
    fn synthetic_video_ends_once() -> Result<()> {
        let descriptor: SourceDescriptor = "stub://video?frames=2".parse()?;
        let mut source = FrameSource::open(&descriptor, &SourceOptions::default())?;
        assert_eq!(source.resolution(), None);
        assert!(matches!(source.next()?, SourceRead::Frame(_)));
        assert_eq!(source.resolution(), Some((64, 48)));
        assert!(matches!(source.next()?, SourceRead::Frame(_)));
        assert!(matches!(source.next()?, SourceRead::EndOfStream));
        assert!(source.next().is_err());
        assert_eq!(source.stats().frames_captured, 2);
        source.close();
        Ok(())
    }
}
