//! Frame layout negotiation.
//!
//! A layout pairs the resolution the backend captures at with the crop rectangle
//! handed to the correction pipeline. Resolution is pure: the same request against
//! the same policy always yields the same layout.

use crate::error::LayoutError;

/// Width used when the caller leaves it unspecified and nothing overrides it.
pub const DEFAULT_WIDTH: u32 = 640;
/// Height used when the caller leaves it unspecified and nothing overrides it.
pub const DEFAULT_HEIGHT: u32 = 480;

/// Smallest crop a fixed-mode backend will negotiate.
pub const MIN_CROP_WIDTH: u32 = 32;
pub const MIN_CROP_HEIGHT: u32 = 32;

/// Largest width or height any backend is asked to capture. Keeps RGB24 buffers
/// allocatable (8192x8192x3 is 192 MiB).
pub const MAX_DIMENSION: u32 = 8192;

/// Capture resolution and crop rectangle for one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameLayout {
    pub capture_width: u32,
    pub capture_height: u32,
    pub crop_x: u32,
    pub crop_y: u32,
    pub crop_width: u32,
    pub crop_height: u32,
}

impl FrameLayout {
    /// Whether the crop rectangle lies inside the capture rectangle.
    pub fn crop_within_capture(&self) -> bool {
        let right = self.crop_x as u64 + self.crop_width as u64;
        let bottom = self.crop_y as u64 + self.crop_height as u64;
        right <= self.capture_width as u64 && bottom <= self.capture_height as u64
    }
}

/// A capture resolution supported natively by a fixed-format driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureMode {
    pub width: u32,
    pub height: u32,
}

impl CaptureMode {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn contains(&self, width: u32, height: u32) -> bool {
        self.width >= width && self.height >= height
    }

    fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// How a backend turns a requested size into a layout.
#[derive(Clone, Copy, Debug)]
pub enum LayoutPolicy<'a> {
    /// Capture at exactly the requested size, no crop.
    Fallback,
    /// Capture at one of a fixed set of modes and center-crop down to the request.
    FixedModes(&'a [CaptureMode]),
}

/// Resolve a requested size into a layout. Negative values mean "unspecified".
pub fn resolve_layout(
    requested_width: i32,
    requested_height: i32,
    policy: &LayoutPolicy<'_>,
) -> Result<FrameLayout, LayoutError> {
    let width = unspecified_or(requested_width, DEFAULT_WIDTH);
    let height = unspecified_or(requested_height, DEFAULT_HEIGHT);
    if width == 0 || height == 0 {
        return Err(LayoutError::ZeroSized { width, height });
    }

    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(LayoutError::TooLarge { width, height });
    }

    match policy {
        LayoutPolicy::Fallback => Ok(fallback_layout(width, height)),
        LayoutPolicy::FixedModes(modes) => fixed_mode_layout(width, height, modes),
    }
}

fn unspecified_or(requested: i32, default: u32) -> u32 {
    u32::try_from(requested).unwrap_or(default)
}

fn fallback_layout(width: u32, height: u32) -> FrameLayout {
    FrameLayout {
        capture_width: width,
        capture_height: height,
        crop_x: 0,
        crop_y: 0,
        crop_width: width,
        crop_height: height,
    }
}

fn fixed_mode_layout(
    width: u32,
    height: u32,
    modes: &[CaptureMode],
) -> Result<FrameLayout, LayoutError> {
    if modes.is_empty() {
        return Err(LayoutError::NoModes);
    }
    if width < MIN_CROP_WIDTH || height < MIN_CROP_HEIGHT {
        return Err(LayoutError::TooSmall {
            width,
            height,
            min_width: MIN_CROP_WIDTH,
            min_height: MIN_CROP_HEIGHT,
        });
    }

    let mode = modes
        .iter()
        .filter(|mode| mode.contains(width, height))
        .min_by_key(|mode| mode.area())
        .ok_or(LayoutError::TooLarge { width, height })?;

    Ok(FrameLayout {
        capture_width: mode.width,
        capture_height: mode.height,
        crop_x: (mode.width - width) / 2,
        crop_y: (mode.height - height) / 2,
        crop_width: width,
        crop_height: height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EYE_MODES: [CaptureMode; 2] = [CaptureMode::new(640, 480), CaptureMode::new(320, 240)];

    #[test]
    fn unspecified_request_resolves_to_default_full_frame() {
        let layout = resolve_layout(-1, -1, &LayoutPolicy::Fallback).unwrap();
        assert_eq!(
            layout,
            FrameLayout {
                capture_width: 640,
                capture_height: 480,
                crop_x: 0,
                crop_y: 0,
                crop_width: 640,
                crop_height: 480,
            }
        );
    }

    #[test]
    fn fallback_crop_origin_is_zero_for_any_size() {
        for (w, h) in [(-1, 300), (800, -1), (1, 1), (1920, 1080)] {
            let layout = resolve_layout(w, h, &LayoutPolicy::Fallback).unwrap();
            assert_eq!((layout.crop_x, layout.crop_y), (0, 0));
            assert!(layout.crop_within_capture());
            assert_eq!(layout.crop_width, layout.capture_width);
            assert_eq!(layout.crop_height, layout.capture_height);
        }
    }

    #[test]
    fn crop_stays_inside_capture_for_request_grid() {
        let sizes = [-1, 32, 100, 239, 240, 320, 479, 480, 640];
        for &w in &sizes {
            for &h in &sizes {
                for policy in [LayoutPolicy::Fallback, LayoutPolicy::FixedModes(&EYE_MODES)] {
                    if let Ok(layout) = resolve_layout(w, h, &policy) {
                        assert!(layout.crop_within_capture(), "{:?} for {}x{}", layout, w, h);
                    }
                }
            }
        }
    }

    #[test]
    fn fixed_modes_pick_smallest_containing_mode_and_center_crop() {
        let layout = resolve_layout(300, 200, &LayoutPolicy::FixedModes(&EYE_MODES)).unwrap();
        assert_eq!((layout.capture_width, layout.capture_height), (320, 240));
        assert_eq!((layout.crop_x, layout.crop_y), (10, 20));
        assert_eq!((layout.crop_width, layout.crop_height), (300, 200));

        let layout = resolve_layout(400, 240, &LayoutPolicy::FixedModes(&EYE_MODES)).unwrap();
        assert_eq!((layout.capture_width, layout.capture_height), (640, 480));
        assert_eq!((layout.crop_x, layout.crop_y), (120, 120));
    }

    #[test]
    fn fixed_modes_reject_unsatisfiable_requests() {
        let policy = LayoutPolicy::FixedModes(&EYE_MODES);
        assert!(matches!(
            resolve_layout(1280, 720, &policy),
            Err(LayoutError::TooLarge { .. })
        ));
        assert!(matches!(
            resolve_layout(16, 240, &policy),
            Err(LayoutError::TooSmall { .. })
        ));
        assert!(matches!(
            resolve_layout(-1, -1, &LayoutPolicy::FixedModes(&[])),
            Err(LayoutError::NoModes)
        ));
    }

    #[test]
    fn zero_request_is_rejected() {
        assert!(matches!(
            resolve_layout(0, 480, &LayoutPolicy::Fallback),
            Err(LayoutError::ZeroSized { .. })
        ));
    }

    #[test]
    fn oversized_request_is_rejected_before_allocation() {
        for policy in [LayoutPolicy::Fallback, LayoutPolicy::FixedModes(&EYE_MODES)] {
            assert!(matches!(
                resolve_layout(i32::MAX, i32::MAX, &policy),
                Err(LayoutError::TooLarge { .. })
            ));
            assert!(matches!(
                resolve_layout(MAX_DIMENSION as i32 + 1, 480, &policy),
                Err(LayoutError::TooLarge { .. })
            ));
        }
        let layout = resolve_layout(MAX_DIMENSION as i32, 1, &LayoutPolicy::Fallback).unwrap();
        assert_eq!(layout.capture_width, MAX_DIMENSION);
    }
}
