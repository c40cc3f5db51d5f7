//! Local video file source.
//!
//! A read failure and a clean end of file are treated the same way: the
//! source reports `SourceRead::EndOfStream` once and refuses further reads.

use anyhow::{anyhow, Result};

use super::synthetic::{generate_frame, StubUrl};
#[cfg(feature = "ingest-file-ffmpeg")]
use super::video_ffmpeg::FfmpegVideo;
use super::SourceRead;
use crate::frame::Frame;

const DEFAULT_SYNTHETIC_FRAMES: u64 = 30;

/// Configuration for a local video source.
#[derive(Clone, Debug, Default)]
pub struct VideoConfig {
    /// Local file path or `stub://video`.
    pub path: String,
}

/// Local video file source.
pub struct VideoSource {
    config: VideoConfig,
    backend: VideoBackend,
    frame_count: u64,
    ended: bool,
}

enum VideoBackend {
    Synthetic(SyntheticVideo),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegVideo),
}

impl VideoSource {
    pub fn new(config: VideoConfig) -> Result<Self> {
        if config.path.trim().is_empty() {
            return Err(anyhow!("video path is empty"));
        }
        let backend = if let Some(url) = StubUrl::parse(&config.path) {
            if url.name != "video" {
                return Err(anyhow!("unknown synthetic video {}", config.path));
            }
            VideoBackend::Synthetic(SyntheticVideo::new(&url))
        } else {
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                VideoBackend::Ffmpeg(FfmpegVideo::new(&config.path)?)
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                return Err(anyhow!(
                    "video decoding requires the ingest-file-ffmpeg feature"
                ));
            }
        };
        Ok(Self {
            config,
            backend,
            frame_count: 0,
            ended: false,
        })
    }

    pub fn connect(&mut self) -> Result<()> {
        log::info!("VideoSource: opened {}", self.config.path);
        Ok(())
    }

    /// Decode the next frame.
    pub fn next(&mut self) -> Result<SourceRead> {
        if self.ended {
            return Err(anyhow!(
                "video {} already reported end of stream",
                self.config.path
            ));
        }
        let read = match &mut self.backend {
            VideoBackend::Synthetic(video) => video.read(self.frame_count),
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::Ffmpeg(video) => video.read(self.frame_count),
        };
        match read {
            Ok(Some(frame)) => {
                self.frame_count += 1;
                Ok(SourceRead::Frame(frame))
            }
            Ok(None) => {
                self.ended = true;
                log::info!(
                    "VideoSource: {} ended after {} frames",
                    self.config.path,
                    self.frame_count
                );
                Ok(SourceRead::EndOfStream)
            }
            Err(err) => {
                self.ended = true;
                log::warn!(
                    "VideoSource: read from {} failed, ending stream: {:#}",
                    self.config.path,
                    err
                );
                Ok(SourceRead::EndOfStream)
            }
        }
    }

    pub fn close(&mut self) {
        self.ended = true;
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://video) for tests
// ----------------------------------------------------------------------------

struct SyntheticVideo {
    frames: u64,
    /// Frame index at which a decode error is simulated.
    fail_at: Option<u64>,
    width: u32,
    height: u32,
}

impl SyntheticVideo {
    fn new(url: &StubUrl) -> Self {
        Self {
            frames: url.param_u64("frames").unwrap_or(DEFAULT_SYNTHETIC_FRAMES),
            fail_at: url.param_u64("fail_at"),
            width: url.param_u32("width").unwrap_or(64),
            height: url.param_u32("height").unwrap_or(48),
        }
    }

    fn read(&mut self, index: u64) -> Result<Option<Frame>> {
        if self.fail_at == Some(index) {
            return Err(anyhow!("synthetic decode error at frame {}", index));
        }
        if index >= self.frames {
            return Ok(None);
        }
        Ok(Some(Frame::new(
            index,
            generate_frame(index, self.width, self.height),
        )))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn open(path: &str) -> Result<VideoSource> {
        let mut source = VideoSource::new(VideoConfig {
            path: path.to_string(),
        })?;
        source.connect()?;
        Ok(source)
    }

    #[test]
    fn video_source_reports_end_of_stream_once() -> Result<()> {
        let mut source = open("stub://video?frames=3")?;
        for expected in 0..3 {
            let SourceRead::Frame(frame) = source.next()? else {
                panic!("expected frame {}", expected);
            };
            assert_eq!(frame.index, expected);
        }
        assert!(matches!(source.next()?, SourceRead::EndOfStream));
        assert!(source.next().is_err());
        Ok(())
    }

    #[test]
    fn read_failure_is_terminal_end_of_stream() -> Result<()> {
        let mut source = open("stub://video?frames=10&fail_at=1")?;
        assert!(matches!(source.next()?, SourceRead::Frame(_)));
        assert!(matches!(source.next()?, SourceRead::EndOfStream));
        assert!(source.next().is_err());
        assert_eq!(source.frames_captured(), 1);
        Ok(())
    }

    #[test]
    fn empty_path_is_rejected() {
        assert!(VideoSource::new(VideoConfig::default()).is_err());
    }

    #[test]
    fn unknown_synthetic_name_is_rejected() {
        let config = VideoConfig {
            path: "stub://bogus?frames=3".to_string(),
        };
        assert!(VideoSource::new(config).is_err());
    }
}
