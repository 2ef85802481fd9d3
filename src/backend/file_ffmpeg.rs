//! File/stream source for the generic backend, decoded with FFmpeg.
//!
//! Frames are scaled to the layout's capture size and converted to RGB24 in one pass.
//! Decode failures and end of stream are missed frames, not errors.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;

use crate::frame::FrameView;

pub(crate) struct FfmpegSource {
    path: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    decoded: ffmpeg::frame::Video,
    scaled: ffmpeg::frame::Video,
    rgb: Vec<u8>,
    width: u32,
    height: u32,
    eof_sent: bool,
    exhausted: bool,
}

impl FfmpegSource {
    pub(crate) fn open(path: &str, width: u32, height: u32) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(path)
            .with_context(|| format!("failed to open '{}' with ffmpeg", path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("'{}' has no video track", path))?;
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
            width,
            height,
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!(
            "FfmpegSource: opened {} ({}x{} scaled to {}x{})",
            path,
            decoder.width(),
            decoder.height(),
            width,
            height
        );

        Ok(Self {
            path: path.to_string(),
            input,
            stream_index,
            decoder,
            scaler,
            decoded: ffmpeg::frame::Video::empty(),
            scaled: ffmpeg::frame::Video::empty(),
            rgb: Vec::new(),
            width,
            height,
            eof_sent: false,
            exhausted: false,
        })
    }

    pub(crate) fn next_frame(&mut self) -> Option<FrameView<'_>> {
        if self.exhausted {
            return None;
        }
        match self.decode_next() {
            Ok(true) => FrameView::packed(&self.rgb, self.width, self.height).ok(),
            Ok(false) => {
                log::info!("FfmpegSource: {} ended", self.path);
                self.exhausted = true;
                None
            }
            Err(err) => {
                log::debug!("FfmpegSource: {}: no frame: {:#}", self.path, err);
                None
            }
        }
    }

    /// Decode until one frame lands in `rgb`. `Ok(false)` means the input is drained.
    fn decode_next(&mut self) -> Result<bool> {
        if self.decoder.receive_frame(&mut self.decoded).is_ok() {
            self.convert()?;
            return Ok(true);
        }

        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .context("send packet to ffmpeg decoder")?;
            if self.decoder.receive_frame(&mut self.decoded).is_ok() {
                self.scaler
                    .run(&self.decoded, &mut self.scaled)
                    .context("scale frame to RGB")?;
                copy_rows(&self.scaled, &mut self.rgb)?;
                return Ok(true);
            }
        }

        if !self.eof_sent {
            self.eof_sent = true;
            self.decoder.send_eof().context("flush ffmpeg decoder")?;
        }
        if self.decoder.receive_frame(&mut self.decoded).is_ok() {
            self.convert()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn convert(&mut self) -> Result<()> {
        self.scaler
            .run(&self.decoded, &mut self.scaled)
            .context("scale frame to RGB")?;
        copy_rows(&self.scaled, &mut self.rgb)
    }
}

/// Copy a (possibly padded) RGB24 ffmpeg frame into a tightly packed buffer.
fn copy_rows(frame: &ffmpeg::frame::Video, out: &mut Vec<u8>) -> Result<()> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let row_bytes = width * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    out.clear();
    out.reserve(row_bytes * height);
    for row in 0..height {
        let start = row * stride;
        out.extend_from_slice(
            data.get(start..start + row_bytes)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }
    Ok(())
}
