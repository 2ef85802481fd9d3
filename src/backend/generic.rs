//! Generic capture backend.
//!
//! Covers everything that is not the fixed-format driver:
//! - physical devices through V4L2 device nodes (feature: ingest-v4l2)
//! - files and streams through FFmpeg (feature: ingest-file-ffmpeg)
//! - `stub://` sources (always available, used by tests)
//!
//! Device nodes are numbered by the kernel and the numbers shift when a camera is
//! unplugged and plugged back in, so a logical index is remapped to the Nth node that
//! currently exists before opening.

use anyhow::Result;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::synthetic::{SyntheticSource, STUB_SCHEME};
use super::DeviceCount;
use crate::error::LayoutError;
use crate::frame::FrameView;
use crate::layout::FrameLayout;

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegSource;
#[cfg(feature = "ingest-v4l2")]
use super::v4l2::V4l2Source;

pub const DEFAULT_DEVICE_DIR: &str = "/dev";
const DEVICE_NODE_PREFIX: &str = "video";
const PLATFORM_HAS_DEVICE_NODES: bool = cfg!(target_os = "linux");

/// Generic capture backend configuration.
#[derive(Clone, Debug)]
pub struct GenericCaptureBackend {
    device_dir: PathBuf,
    synthetic_devices: bool,
}

impl Default for GenericCaptureBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GenericCaptureBackend {
    /// System devices under `/dev`.
    pub fn new() -> Self {
        Self {
            device_dir: PathBuf::from(DEFAULT_DEVICE_DIR),
            synthetic_devices: false,
        }
    }

    /// Enumerate and remap against `device_dir`, but open synthetic sources instead of
    /// real devices.
    pub fn synthetic(device_dir: impl Into<PathBuf>) -> Self {
        Self {
            device_dir: device_dir.into(),
            synthetic_devices: true,
        }
    }

    pub fn device_dir(&self) -> &Path {
        &self.device_dir
    }

    pub fn enumerate(&self) -> DeviceCount {
        self.enumerate_on(PLATFORM_HAS_DEVICE_NODES)
    }

    fn enumerate_on(&self, platform_has_device_nodes: bool) -> DeviceCount {
        if self.uses_device_nodes(platform_has_device_nodes) {
            DeviceCount::Connected(list_device_nodes(&self.device_dir).len())
        } else {
            log::warn!("Getting number of connected cameras not implemented on this platform");
            DeviceCount::Unsupported
        }
    }

    fn uses_device_nodes(&self, platform_has_device_nodes: bool) -> bool {
        self.synthetic_devices || platform_has_device_nodes
    }

    /// Open a physical device, or `source_override` when given.
    pub fn open(
        &self,
        device_index: i32,
        source_override: Option<&str>,
        layout: &FrameLayout,
        framerate: u32,
    ) -> Result<GenericCaptureHandle> {
        let (width, height) = (layout.capture_width, layout.capture_height);

        if let Some(source) = source_override {
            log::info!("Using '{}' as video input.", source);
            return Ok(GenericCaptureHandle {
                source: Some(open_stream(source, width, height)?),
                device_index,
            });
        }

        let requested = usize::try_from(device_index).unwrap_or(0);
        let effective = if self.uses_device_nodes(PLATFORM_HAS_DEVICE_NODES) {
            remap_device_index(&self.device_dir, requested)
        } else {
            requested
        };
        let node = self
            .device_dir
            .join(format!("{}{}", DEVICE_NODE_PREFIX, effective));

        let source = if self.synthetic_devices {
            let label = format!("{}{}", STUB_SCHEME, node.display());
            GenericSource::Synthetic(SyntheticSource::open(&label, width, height)?)
        } else {
            open_device(&node, layout, framerate)?
        };

        Ok(GenericCaptureHandle {
            source: Some(source),
            device_index: effective as i32,
        })
    }
}

/// Device nodes in `dir`, in the order a shell glob would list them.
///
/// An unreadable directory counts as no devices.
pub fn list_device_nodes(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut nodes: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(DEVICE_NODE_PREFIX))
        })
        .map(|entry| entry.path())
        .collect();
    nodes.sort();
    nodes
}

/// Map a logical camera index onto the numeric suffix of the Nth present node.
///
/// Falls back to `requested` (with a warning) when there are not enough nodes or the
/// node name carries no number.
pub fn remap_device_index(dir: &Path, requested: usize) -> usize {
    let nodes = list_device_nodes(dir);
    let Some(node) = nodes.get(requested) else {
        log::warn!(
            "only {} device node(s) in {}, keeping camera index {}",
            nodes.len(),
            dir.display(),
            requested
        );
        return requested;
    };
    match node_number(node) {
        Some(number) => {
            if number != requested {
                log::info!("camera {} remapped to {}", requested, node.display());
            }
            number
        }
        None => {
            log::warn!(
                "Could not determine camera ID from path '{}'",
                node.display()
            );
            requested
        }
    }
}

/// Fail when a device accepted the capture request but settled on a smaller size. A
/// larger negotiated size still covers the crop and is accepted.
pub fn check_negotiated_size(layout: &FrameLayout, width: u32, height: u32) -> Result<()> {
    if width < layout.capture_width || height < layout.capture_height {
        return Err(LayoutError::NegotiatedTooSmall {
            requested_width: layout.capture_width,
            requested_height: layout.capture_height,
            width,
            height,
        }
        .into());
    }
    Ok(())
}

fn node_number(node: &Path) -> Option<usize> {
    static DEVICE_NODE_RE: OnceLock<Regex> = OnceLock::new();
    let re = DEVICE_NODE_RE.get_or_init(|| Regex::new(r"^video(\d+)").unwrap());
    let name = node.file_name()?.to_str()?;
    re.captures(name)?.get(1)?.as_str().parse().ok()
}

fn open_stream(source: &str, width: u32, height: u32) -> Result<GenericSource> {
    if source.starts_with(STUB_SCHEME) {
        return Ok(GenericSource::Synthetic(SyntheticSource::open(
            source, width, height,
        )?));
    }
    #[cfg(feature = "ingest-file-ffmpeg")]
    {
        Ok(GenericSource::Ffmpeg(FfmpegSource::open(source, width, height)?))
    }
    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    {
        anyhow::bail!("file/stream input requires the ingest-file-ffmpeg feature")
    }
}

#[allow(unused_variables)]
fn open_device(node: &Path, layout: &FrameLayout, framerate: u32) -> Result<GenericSource> {
    #[cfg(feature = "ingest-v4l2")]
    {
        Ok(GenericSource::V4l2(V4l2Source::open(node, layout, framerate)?))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        anyhow::bail!(
            "capturing from {} requires the ingest-v4l2 feature",
            node.display()
        )
    }
}

enum GenericSource {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-v4l2")]
    V4l2(V4l2Source),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegSource),
}

impl GenericSource {
    fn next_frame(&mut self) -> Option<FrameView<'_>> {
        match self {
            GenericSource::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            GenericSource::V4l2(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            GenericSource::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn driver_name(&self) -> &'static str {
        match self {
            GenericSource::Synthetic(_) => "synthetic",
            #[cfg(feature = "ingest-v4l2")]
            GenericSource::V4l2(_) => "v4l2",
            #[cfg(feature = "ingest-file-ffmpeg")]
            GenericSource::Ffmpeg(_) => "ffmpeg",
        }
    }
}

/// An open generic capture source.
pub struct GenericCaptureHandle {
    source: Option<GenericSource>,
    device_index: i32,
}

impl GenericCaptureHandle {
    /// Next frame from the capture library. Read or decode failures are a missed frame.
    pub fn retrieve_raw(&mut self) -> Option<FrameView<'_>> {
        self.source.as_mut()?.next_frame()
    }

    /// Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(source) = self.source.take() {
            log::info!("{}: closed camera {}", source.driver_name(), self.device_index);
        }
    }

    pub fn driver_name(&self) -> &'static str {
        self.source
            .as_ref()
            .map(GenericSource::driver_name)
            .unwrap_or("closed")
    }

    /// Index actually opened after remapping; the requested index for stream sources.
    pub fn device_index(&self) -> i32 {
        self.device_index
    }
}

impl Drop for GenericCaptureHandle {
    fn drop(&mut self) {
        self.close();
    }
}
