//! V4L2 capture for the generic backend.
//!
//! Opens a device node, asks for the layout's capture size in RGB, accepts any
//! negotiated size that still covers it, and normalizes every buffer to RGB24 into a
//! reusable buffer. Capture errors are transient: they are logged and reported as a
//! missed frame.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::path::Path;

use super::generic::check_negotiated_size;
use super::normalize::{normalize_into, PixelFormat};
use crate::frame::FrameView;
use crate::layout::FrameLayout;

const STREAM_BUFFERS: u32 = 4;

pub(crate) struct V4l2Source {
    device: String,
    state: V4l2State,
    format: PixelFormat,
    active_width: u32,
    active_height: u32,
    rgb: Vec<u8>,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub(crate) fn open(path: &Path, layout: &FrameLayout, framerate: u32) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let (width, height) = (layout.capture_width, layout.capture_height);

        let name = path.display().to_string();
        let mut device =
            v4l::Device::with_path(path).with_context(|| format!("open v4l2 device {}", name))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = width;
        format.height = height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("V4l2Source: failed to set format on {}: {}", name, err);
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr)
            .ok_or_else(|| anyhow!("{} delivers unsupported pixel format {}", name, format.fourcc))?;

        check_negotiated_size(layout, format.width, format.height)
            .with_context(|| format!("negotiate capture size on {}", name))?;
        if format.width != width || format.height != height {
            log::warn!(
                "V4l2Source: {} negotiated {}x{} instead of {}x{}",
                name,
                format.width,
                format.height,
                width,
                height
            );
        }

        if framerate > 0 {
            let params = v4l::video::capture::Parameters::with_fps(framerate);
            if let Err(err) = device.set_params(&params) {
                log::warn!("V4l2Source: failed to set fps on {}: {}", name, err);
            }
        }

        let state = V4l2StateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "V4l2Source: connected to {} ({}x{} {:?})",
            name,
            format.width,
            format.height,
            pixel_format
        );

        Ok(Self {
            device: name,
            state,
            format: pixel_format,
            active_width: format.width,
            active_height: format.height,
            rgb: Vec::new(),
        })
    }

    pub(crate) fn next_frame(&mut self) -> Option<FrameView<'_>> {
        use v4l::io::traits::CaptureStream;

        let (width, height, format) = (self.active_width, self.active_height, self.format);
        let rgb = &mut self.rgb;
        let captured = self.state.with_mut(|fields| -> Result<()> {
            let (buf, meta) = fields.stream.next().context("capture v4l2 frame")?;
            let used = match meta.bytesused as usize {
                0 => buf.len(),
                n => n.min(buf.len()),
            };
            normalize_into(&buf[..used], width, height, format, rgb)
        });

        if let Err(err) = captured {
            log::debug!("V4l2Source: {}: no frame: {:#}", self.device, err);
            return None;
        }
        FrameView::packed(&self.rgb, width, height).ok()
    }
}
