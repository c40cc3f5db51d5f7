//! V4L2 capture backend for `CameraSource`.
//!
//! Frames are requested as packed RGB24 (`RGB3`). When the driver refuses the
//! requested format the negotiated one is kept and logged.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::camera::CameraConfig;
use crate::frame::Frame;

pub(crate) struct DeviceCamera {
    config: CameraConfig,
    state: Option<DeviceState>,
    active_width: u32,
    active_height: u32,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl DeviceCamera {
    pub(crate) fn new(config: &CameraConfig) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config: config.clone(),
            state: None,
        }
    }

    pub(crate) fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("open camera {}", self.config.device))?;
        let mut format = device.format().context("read camera format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "CameraSource: failed to set format on {}: {}",
                    self.config.device,
                    err
                );
                device.format().context("read camera format after set failure")?
            }
        };
        if format.fourcc != v4l::FourCC::new(b"RGB3") {
            return Err(anyhow!(
                "camera {} does not deliver RGB24 frames (got {})",
                self.config.device,
                format.fourcc
            ));
        }

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "CameraSource: failed to set fps on {}: {}",
                    self.config.device,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;

        let state = DeviceStateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create camera buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);

        log::info!(
            "CameraSource: connected to {} ({}x{})",
            self.config.device,
            self.active_width,
            self.active_height
        );
        Ok(())
    }

    pub(crate) fn read(&mut self, index: u64) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("camera not connected")?;
        let buf = state
            .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
            .context("capture camera frame")?;

        let expected = (self.active_width as usize) * (self.active_height as usize) * 3;
        let pixels = buf
            .get(..expected)
            .ok_or_else(|| anyhow!("short camera buffer: {} < {}", buf.len(), expected))?
            .to_vec();
        Frame::from_rgb(index, self.active_width, self.active_height, pixels)
    }

    pub(crate) fn close(&mut self) {
        self.state = None;
    }
}
