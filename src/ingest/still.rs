//! Still image source. Yields one frame, then ends.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::SourceRead;
use crate::frame::Frame;

/// Single decoded image presented as a one-frame stream.
pub struct StillImageSource {
    path: PathBuf,
    frame: Option<Frame>,
    delivered: u64,
    ended: bool,
}

impl StillImageSource {
    /// Decode the image up front so an unreadable file fails at open time.
    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("cannot read image {}", path.display()))?
            .to_rgb8();
        log::info!(
            "StillImageSource: loaded {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        Ok(Self {
            path: path.to_path_buf(),
            frame: Some(Frame::new(0, image)),
            delivered: 0,
            ended: false,
        })
    }

    pub fn next(&mut self) -> Result<SourceRead> {
        if let Some(frame) = self.frame.take() {
            self.delivered += 1;
            return Ok(SourceRead::Frame(frame));
        }
        if self.ended {
            return Err(anyhow!(
                "image {} already reported end of stream",
                self.path.display()
            ));
        }
        self.ended = true;
        Ok(SourceRead::EndOfStream)
    }

    pub fn close(&mut self) {
        self.frame = None;
        self.ended = true;
    }

    pub fn frames_captured(&self) -> u64 {
        self.delivered
    }
}
