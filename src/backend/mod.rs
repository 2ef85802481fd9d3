//! Camera backends.
//!
//! Two capture mechanisms sit behind one capability contract (enumerate, open,
//! retrieve raw frames, configure, close):
//! - `FixedFormat`: a high-speed USB driver that captures RGB at a few fixed modes
//! - `GenericCapture`: V4L2 devices, files/streams, and `stub://` sources
//!
//! Both variants are runtime values, so one process can drive either (or both).
//!
//! Raw frames are views into backend-owned buffers that are overwritten on the next
//! retrieval. Nothing downstream may assume it owns them.

pub mod fixed;
pub mod fixed_stub;
pub mod generic;
mod synthetic;

#[cfg(feature = "ingest-file-ffmpeg")]
mod file_ffmpeg;
#[cfg(any(feature = "ingest-v4l2", test))]
mod normalize;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

use anyhow::Result;
use std::sync::Arc;

pub use fixed::{
    exposure_to_native, DriverLease, DriverParameter, FixedFormatBackend, FixedFormatDevice,
    FixedFormatDriver, FixedFormatHandle, MAX_EXPOSURE,
};
pub use fixed_stub::{StubDriver, StubDriverStats};
pub use generic::{GenericCaptureBackend, GenericCaptureHandle};

use crate::frame::FrameView;
use crate::layout::{FrameLayout, LayoutPolicy};

/// Which capture mechanism a backend or handle uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    FixedFormat,
    GenericCapture,
}

/// Result of device enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceCount {
    Connected(usize),
    /// The platform offers no way to enumerate devices. Not the same as zero.
    Unsupported,
}

/// A capture backend, not yet bound to a device.
#[derive(Clone)]
pub enum Backend {
    FixedFormat(FixedFormatBackend),
    GenericCapture(GenericCaptureBackend),
}

impl Backend {
    pub fn fixed_format(driver: Arc<dyn FixedFormatDriver>) -> Self {
        Backend::FixedFormat(FixedFormatBackend::new(driver))
    }

    /// Generic capture from the system's device nodes.
    pub fn generic() -> Self {
        Backend::GenericCapture(GenericCaptureBackend::new())
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::FixedFormat(_) => BackendKind::FixedFormat,
            Backend::GenericCapture(_) => BackendKind::GenericCapture,
        }
    }

    /// How this backend turns a requested size into a capture size and crop.
    pub fn layout_policy(&self) -> LayoutPolicy<'_> {
        match self {
            Backend::FixedFormat(backend) => LayoutPolicy::FixedModes(backend.supported_modes()),
            Backend::GenericCapture(_) => LayoutPolicy::Fallback,
        }
    }

    pub fn enumerate(&self) -> DeviceCount {
        match self {
            Backend::FixedFormat(backend) => DeviceCount::Connected(backend.enumerate()),
            Backend::GenericCapture(backend) => backend.enumerate(),
        }
    }

    /// Open a device configured for `layout`. `source_override` only applies to the
    /// generic backend; the fixed-format driver has no notion of file input.
    pub fn open(
        &self,
        device_index: i32,
        source_override: Option<&str>,
        layout: &FrameLayout,
        framerate: u32,
    ) -> Result<BackendHandle> {
        match self {
            Backend::FixedFormat(backend) => {
                if let Some(source) = source_override {
                    log::warn!("{} ignores source override '{}'", backend.name(), source);
                }
                Ok(BackendHandle::FixedFormat(
                    backend.open(device_index, layout, framerate)?,
                ))
            }
            Backend::GenericCapture(backend) => Ok(BackendHandle::GenericCapture(
                backend.open(device_index, source_override, layout, framerate)?,
            )),
        }
    }
}

/// An open device.
pub enum BackendHandle {
    FixedFormat(FixedFormatHandle),
    GenericCapture(GenericCaptureHandle),
}

impl BackendHandle {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendHandle::FixedFormat(_) => BackendKind::FixedFormat,
            BackendHandle::GenericCapture(_) => BackendKind::GenericCapture,
        }
    }

    /// Next raw capture-sized frame, or `None` for a transient miss.
    pub fn retrieve_raw(&mut self) -> Option<FrameView<'_>> {
        match self {
            BackendHandle::FixedFormat(handle) => handle.retrieve_raw(),
            BackendHandle::GenericCapture(handle) => handle.retrieve_raw(),
        }
    }

    /// Only the fixed-format driver exposes these controls; elsewhere this is a no-op.
    pub fn configure_exposure_and_mirror(&mut self, exposure: f32, mirror: bool) {
        match self {
            BackendHandle::FixedFormat(handle) => {
                handle.configure_exposure_and_mirror(exposure, mirror)
            }
            BackendHandle::GenericCapture(handle) => log::debug!(
                "{}: exposure/mirror controls not supported, ignoring",
                handle.driver_name()
            ),
        }
    }

    /// Release backend resources. Idempotent.
    pub fn close(&mut self) {
        match self {
            BackendHandle::FixedFormat(handle) => handle.close(),
            BackendHandle::GenericCapture(handle) => handle.close(),
        }
    }

    pub fn driver_name(&self) -> &'static str {
        match self {
            BackendHandle::FixedFormat(handle) => handle.driver_name(),
            BackendHandle::GenericCapture(handle) => handle.driver_name(),
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            BackendHandle::FixedFormat(handle) => handle.camera_name(),
            BackendHandle::GenericCapture(_) => "Unknown camera",
        }
    }

    pub fn device_index(&self) -> i32 {
        match self {
            BackendHandle::FixedFormat(handle) => handle.device_index() as i32,
            BackendHandle::GenericCapture(handle) => handle.device_index(),
        }
    }
}
