//! Camera frame source.
//!
//! Cameras never end on their own. When a read fails the source waits for the
//! configured reconnect delay, reopens the device and reports
//! `SourceRead::Reconnecting`. The caller decides whether to keep pulling.

use anyhow::{anyhow, Result};
use std::time::Duration;

#[cfg(feature = "ingest-v4l2")]
use super::camera_v4l2::DeviceCamera;
use super::synthetic::{generate_frame, StubUrl};
use super::SourceRead;
use crate::frame::Frame;

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0") or `stub://camera`.
    pub device: String,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Preferred frame rate.
    pub target_fps: u32,
    /// Pause before reopening the device after a failed read.
    pub reconnect_delay: Duration,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            target_fps: 30,
            reconnect_delay: Duration::from_millis(500),
        }
    }
}

/// Camera frame source with reconnect-on-failure.
pub struct CameraSource {
    config: CameraConfig,
    backend: CameraBackend,
    frame_count: u64,
    reconnects: u64,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    Device(DeviceCamera),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        let backend = if let Some(url) = StubUrl::parse(&config.device) {
            if url.name != "camera" {
                return Err(anyhow!("unknown synthetic camera {}", config.device));
            }
            CameraBackend::Synthetic(SyntheticCamera::new(&config, &url))
        } else {
            #[cfg(feature = "ingest-v4l2")]
            {
                CameraBackend::Device(DeviceCamera::new(&config))
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                return Err(anyhow!(
                    "camera capture requires the ingest-v4l2 feature"
                ));
            }
        };
        Ok(Self {
            config,
            backend,
            frame_count: 0,
            reconnects: 0,
        })
    }

    /// Open the device.
    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.connect(&self.config.device),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.connect(),
        }
    }

    /// Capture the next frame, reconnecting on failure.
    pub fn next(&mut self) -> Result<SourceRead> {
        let read = match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.read(self.frame_count),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.read(self.frame_count),
        };
        match read {
            Ok(frame) => {
                self.frame_count += 1;
                Ok(SourceRead::Frame(frame))
            }
            Err(err) => {
                self.reconnects += 1;
                log::warn!(
                    "CameraSource: read from {} failed ({:#}), reconnecting (attempt {})",
                    self.config.device,
                    err,
                    self.reconnects
                );
                if !self.config.reconnect_delay.is_zero() {
                    std::thread::sleep(self.config.reconnect_delay);
                }
                self.close();
                if let Err(reconnect_err) = self.connect() {
                    log::warn!(
                        "CameraSource: reconnect to {} failed: {:#}",
                        self.config.device,
                        reconnect_err
                    );
                }
                Ok(SourceRead::Reconnecting(format!("{:#}", err)))
            }
        }
    }

    pub fn close(&mut self) {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.close(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.close(),
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }
}

// ----------------------------------------------------------------------------
// Synthetic camera (stub://camera) for tests
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    width: u32,
    height: u32,
    /// Every Nth read attempt fails, simulating a dropped device.
    fail_every: Option<u64>,
    attempts: u64,
    connected: bool,
}

impl SyntheticCamera {
    fn new(config: &CameraConfig, url: &StubUrl) -> Self {
        Self {
            width: url.param_u32("width").unwrap_or(config.width),
            height: url.param_u32("height").unwrap_or(config.height),
            fail_every: url.param_u64("fail_every").filter(|n| *n > 0),
            attempts: 0,
            connected: false,
        }
    }

    fn connect(&mut self, device: &str) -> Result<()> {
        self.connected = true;
        log::info!("CameraSource: connected to {} (synthetic)", device);
        Ok(())
    }

    fn read(&mut self, index: u64) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("synthetic camera not connected"));
        }
        self.attempts += 1;
        if let Some(every) = self.fail_every {
            if self.attempts % every == 0 {
                return Err(anyhow!("synthetic camera dropped frame {}", self.attempts));
            }
        }
        Ok(Frame::new(index, generate_frame(index, self.width, self.height)))
    }

    fn close(&mut self) {
        self.connected = false;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
