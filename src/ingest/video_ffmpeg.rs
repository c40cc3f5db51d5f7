//! FFmpeg decode backend for `VideoSource`.
//!
//! Packets from the best video stream are decoded and scaled to RGB24. After the
//! demuxer runs dry the decoder is flushed, so trailing buffered frames are not lost.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;

use crate::frame::Frame;

pub(crate) struct FfmpegVideo {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    flushed: bool,
}

impl FfmpegVideo {
    pub(crate) fn new(path: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open video '{}' with ffmpeg", path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::debug!(
            "VideoSource: {} is {}x{}",
            path,
            decoder.width(),
            decoder.height()
        );

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
            flushed: false,
        })
    }

    /// Decode the next frame, or `None` once the file is exhausted.
    pub(crate) fn read(&mut self, index: u64) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();

        if self.decoder.receive_frame(&mut decoded).is_ok() {
            return self.convert(&decoded, index).map(Some);
        }

        if !self.flushed {
            let mut got_frame = false;
            for (stream, packet) in self.input.packets() {
                if stream.index() != self.stream_index {
                    continue;
                }
                self.decoder
                    .send_packet(&packet)
                    .context("send packet to ffmpeg decoder")?;
                if self.decoder.receive_frame(&mut decoded).is_ok() {
                    got_frame = true;
                    break;
                }
            }
            if got_frame {
                return self.convert(&decoded, index).map(Some);
            }
            self.decoder.send_eof().context("flush ffmpeg decoder")?;
            self.flushed = true;
        }

        if self.decoder.receive_frame(&mut decoded).is_ok() {
            return self.convert(&decoded, index).map(Some);
        }
        Ok(None)
    }

    fn convert(&mut self, decoded: &ffmpeg::frame::Video, index: u64) -> Result<Frame> {
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
        Frame::from_rgb(index, width, height, pixels)
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let len = row_bytes * height as usize;
        return Ok((data[..len].to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
