//! Camera session: one open device plus the correction state applied to its frames.
//!
//! A `CameraSession` only exists while its device is open. `open` hands one back,
//! `close` consumes it, so a closed session cannot be queried:
//!
//! ```compile_fail
//! use tracker_camera::{Backend, CameraConfig, CameraSession, OpenParams};
//!
//! let config = CameraConfig {
//!     source_override: Some("stub://cam".to_string()),
//!     ..CameraConfig::default()
//! };
//! let mut session = CameraSession::open(Backend::generic(), OpenParams::default(), &config)?;
//! session.close();
//! session.query_frame();
//! # Ok::<(), tracker_camera::OpenError>(())
//! ```
//!
//! Frames are borrowed from the session and overwritten by the next query, so one
//! cannot be held across calls:
//!
//! ```compile_fail
//! use tracker_camera::{Backend, CameraConfig, CameraSession, OpenParams};
//!
//! let config = CameraConfig {
//!     source_override: Some("stub://cam".to_string()),
//!     ..CameraConfig::default()
//! };
//! let mut session = CameraSession::open(Backend::generic(), OpenParams::default(), &config)?;
//! let first = session.query_frame();
//! let second = session.query_frame();
//! assert_ne!(first, second);
//! # Ok::<(), tracker_camera::OpenError>(())
//! ```

use std::path::Path;

use crate::backend::{Backend, BackendHandle, BackendKind};
use crate::config::CameraConfig;
use crate::correction::{
    crop_into, deinterlace_into, load_calibration, undistort_into, CalibrationMap,
};
use crate::error::{LayoutError, OpenError};
use crate::frame::Frame;
use crate::layout::{resolve_layout, FrameLayout};

/// Frames per second requested when the caller passes -1.
pub const DEFAULT_FRAMERATE: u32 = 60;

/// What the caller asks for. Negative values mean "use the default".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenParams {
    pub device_index: i32,
    pub width: i32,
    pub height: i32,
    pub framerate: i32,
}

impl Default for OpenParams {
    fn default() -> Self {
        Self {
            device_index: -1,
            width: -1,
            height: -1,
            framerate: -1,
        }
    }
}

/// Descriptive data about the open camera.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraInfo {
    pub display_name: &'static str,
    pub driver_name: &'static str,
    pub frame_width: u32,
    pub frame_height: u32,
}

pub struct CameraSession {
    handle: BackendHandle,
    layout: FrameLayout,
    frame: Frame,
    scratch: Frame,
    calibration: Option<CalibrationMap>,
    deinterlace: bool,
    frames_captured: u64,
}

impl CameraSession {
    /// Resolve the frame layout, open the device and load any configured calibration.
    ///
    /// Either every step succeeds or nothing stays open: a failed backend open releases
    /// whatever it acquired before this returns.
    pub fn open(
        backend: Backend,
        params: OpenParams,
        config: &CameraConfig,
    ) -> Result<Self, OpenError> {
        let framerate = match params.framerate {
            0 => return Err(OpenError::InvalidFramerate(0)),
            rate if rate < 0 => DEFAULT_FRAMERATE,
            rate => rate as u32,
        };

        let width = requested_or_override(params.width, config.width_override);
        let height = requested_or_override(params.height, config.height_override);
        let layout = resolve_layout(width, height, &backend.layout_policy())?;

        let handle = backend
            .open(
                params.device_index,
                config.source_override.as_deref(),
                &layout,
                framerate,
            )
            .map_err(|reason| open_failure(params.device_index, reason))?;

        let mut session = Self {
            handle,
            layout,
            frame: Frame::new(layout.crop_width, layout.crop_height),
            scratch: Frame::new(layout.crop_width, layout.crop_height),
            calibration: None,
            deinterlace: config.deinterlace,
            frames_captured: 0,
        };
        if let Some((intrinsics, distortion)) = config.calibration_paths() {
            session.load_calibration(intrinsics, distortion);
        }

        log::info!(
            "camera {} open via {}: capture {}x{}, output {}x{} at +{}+{}, {} fps",
            session.handle.device_index(),
            session.handle.driver_name(),
            layout.capture_width,
            layout.capture_height,
            layout.crop_width,
            layout.crop_height,
            layout.crop_x,
            layout.crop_y,
            framerate
        );
        Ok(session)
    }

    /// Next corrected frame, or `None` when the backend had nothing new.
    ///
    /// The frame is cropped, then deinterlaced (when enabled), then undistorted (when
    /// calibrated). It is valid until the next call.
    pub fn query_frame(&mut self) -> Option<&Frame> {
        let raw = self.handle.retrieve_raw()?;
        if !crop_into(&raw, &self.layout, &mut self.frame) {
            return None;
        }

        if self.deinterlace {
            deinterlace_into(&self.frame, &mut self.scratch);
            std::mem::swap(&mut self.frame, &mut self.scratch);
        }
        if let Some(map) = &self.calibration {
            undistort_into(&self.frame, Some(map), &mut self.scratch);
            std::mem::swap(&mut self.frame, &mut self.scratch);
        }

        self.frames_captured += 1;
        Some(&self.frame)
    }

    pub fn set_deinterlace(&mut self, enabled: bool) {
        self.deinterlace = enabled;
    }

    pub fn deinterlace(&self) -> bool {
        self.deinterlace
    }

    /// Build an undistortion map from coefficient files.
    ///
    /// Any previous map is dropped first, so on failure frames pass through
    /// uncorrected. Returns whether undistortion is now active.
    pub fn load_calibration(&mut self, intrinsics: &Path, distortion: &Path) -> bool {
        self.calibration = None;
        match load_calibration(
            intrinsics,
            distortion,
            self.layout.crop_width,
            self.layout.crop_height,
        ) {
            Ok(map) => {
                log::info!(
                    "undistortion enabled from {} and {}",
                    intrinsics.display(),
                    distortion.display()
                );
                self.calibration = Some(map);
                true
            }
            Err(err) => {
                log::warn!("Could not load camera calibration, undistortion disabled: {}", err);
                false
            }
        }
    }

    /// Install a precomputed map. Rejected (and any previous map kept) when its size is
    /// not the output size.
    pub fn set_calibration_map(&mut self, map: CalibrationMap) -> bool {
        if map.width() != self.layout.crop_width || map.height() != self.layout.crop_height {
            log::warn!(
                "calibration map is {}x{}, session output is {}x{}",
                map.width(),
                map.height(),
                self.layout.crop_width,
                self.layout.crop_height
            );
            return false;
        }
        self.calibration = Some(map);
        true
    }

    pub fn clear_calibration(&mut self) {
        self.calibration = None;
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    /// Set exposure (normalized 0..1, clamped) and horizontal mirroring. Backends
    /// without these controls ignore the call.
    pub fn configure_exposure_and_mirror(&mut self, exposure: f32, mirror: bool) {
        self.handle.configure_exposure_and_mirror(exposure, mirror);
    }

    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    pub fn camera_info(&self) -> CameraInfo {
        CameraInfo {
            display_name: self.handle.display_name(),
            driver_name: self.handle.driver_name(),
            frame_width: self.layout.crop_width,
            frame_height: self.layout.crop_height,
        }
    }

    /// Effective device index (after any remapping).
    pub fn device_index(&self) -> i32 {
        self.handle.device_index()
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.handle.kind()
    }

    /// Release everything the session holds.
    pub fn close(mut self) {
        self.release();
    }

    // Reverse acquisition order; the backend handle (and its driver lease) goes last.
    fn release(&mut self) {
        self.calibration = None;
        self.scratch = Frame::new(0, 0);
        self.frame = Frame::new(0, 0);
        self.handle.close();
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.release();
    }
}

// A backend that could not honour the layout reports a `LayoutError`; anything else
// means the device itself is unusable.
fn open_failure(index: i32, reason: anyhow::Error) -> OpenError {
    match reason.downcast::<LayoutError>() {
        Ok(layout) => OpenError::LayoutNegotiationFailed(layout),
        Err(reason) => OpenError::DeviceUnavailable { index, reason },
    }
}

fn requested_or_override(requested: i32, configured: Option<u32>) -> i32 {
    match configured {
        Some(value) if requested < 0 => i32::try_from(value).unwrap_or(i32::MAX),
        _ => requested,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GenericCaptureBackend;

    fn stub_config() -> CameraConfig {
        CameraConfig {
            source_override: Some("stub://cam".to_string()),
            ..CameraConfig::default()
        }
    }

    fn stub_backend() -> Backend {
        Backend::GenericCapture(GenericCaptureBackend::synthetic("/nonexistent"))
    }

    #[test]
    fn overrides_only_fill_unspecified_sizes() {
        assert_eq!(requested_or_override(-1, Some(320)), 320);
        assert_eq!(requested_or_override(800, Some(320)), 800);
        assert_eq!(requested_or_override(-1, None), -1);
    }

    #[test]
    fn layout_failures_from_backend_keep_their_kind() {
        let negotiated = anyhow::Error::from(LayoutError::NegotiatedTooSmall {
            requested_width: 640,
            requested_height: 480,
            width: 320,
            height: 240,
        })
        .context("negotiate capture size on /dev/video0");
        assert!(matches!(
            open_failure(0, negotiated),
            OpenError::LayoutNegotiationFailed(LayoutError::NegotiatedTooSmall { width: 320, .. })
        ));
        assert!(matches!(
            open_failure(2, anyhow::anyhow!("no such device")),
            OpenError::DeviceUnavailable { index: 2, .. }
        ));
    }

    #[test]
    fn oversized_request_fails_without_allocating() {
        let params = OpenParams {
            width: i32::MAX,
            height: i32::MAX,
            ..OpenParams::default()
        };
        let err = CameraSession::open(stub_backend(), params, &stub_config())
            .err()
            .expect("oversized request must fail");
        assert!(matches!(
            err,
            OpenError::LayoutNegotiationFailed(LayoutError::TooLarge { .. })
        ));
    }

    #[test]
    fn zero_framerate_is_rejected() {
        let params = OpenParams {
            framerate: 0,
            ..OpenParams::default()
        };
        let err = CameraSession::open(stub_backend(), params, &stub_config())
            .err()
            .expect("framerate 0 must fail");
        assert!(matches!(err, OpenError::InvalidFramerate(0)));
    }

    #[test]
    fn config_size_applies_when_unspecified() -> anyhow::Result<()> {
        let config = CameraConfig {
            width_override: Some(160),
            height_override: Some(120),
            ..stub_config()
        };
        let session = CameraSession::open(stub_backend(), OpenParams::default(), &config)?;
        let info = session.camera_info();
        assert_eq!((info.frame_width, info.frame_height), (160, 120));
        assert_eq!(info.display_name, "Unknown camera");
        session.close();
        Ok(())
    }

    #[test]
    fn frames_counter_tracks_delivered_frames() -> anyhow::Result<()> {
        let config = CameraConfig {
            source_override: Some("stub://cam?drop_every=2".to_string()),
            ..CameraConfig::default()
        };
        let mut session = CameraSession::open(stub_backend(), OpenParams::default(), &config)?;
        for _ in 0..4 {
            session.query_frame();
        }
        assert_eq!(session.frames_captured(), 2);
        Ok(())
    }

    #[test]
    fn mismatched_calibration_map_is_rejected() -> anyhow::Result<()> {
        let mut session =
            CameraSession::open(stub_backend(), OpenParams::default(), &stub_config())?;
        assert!(!session.set_calibration_map(CalibrationMap::identity(32, 32)));
        assert!(!session.is_calibrated());
        assert!(session.set_calibration_map(CalibrationMap::identity(640, 480)));
        assert!(session.is_calibrated());
        session.clear_calibration();
        assert!(!session.is_calibrated());
        Ok(())
    }
}
