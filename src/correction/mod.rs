//! Frame correction pipeline.
//!
//! Raw backend frames pass through three stages, always in this order and always at
//! crop size:
//! 1. `crop_into`: copy the layout's crop rectangle out of the (possibly driver-owned)
//!    raw buffer into a session-owned frame
//! 2. `deinterlace_into`: keep the odd field and line-double it back to full height
//! 3. `undistort_into`: bilinear remap through a `CalibrationMap`
//!
//! No stage retains a reference to its input beyond the call.

pub mod calibration;
mod deinterlace;
mod undistort;

pub use calibration::{
    load_calibration, CalibrationMap, CameraIntrinsics, DistortionCoefficients,
};
pub use deinterlace::deinterlace_into;
pub use undistort::undistort_into;

use crate::frame::{Frame, FrameView};
use crate::layout::FrameLayout;

/// Copy the crop rectangle of `raw` into `out`.
///
/// Returns `false` when the raw frame does not cover the crop rectangle (for example a
/// backend that silently negotiated a smaller resolution). Callers treat that as a
/// missed frame.
pub fn crop_into(raw: &FrameView<'_>, layout: &FrameLayout, out: &mut Frame) -> bool {
    match raw.sub_rect(
        layout.crop_x,
        layout.crop_y,
        layout.crop_width,
        layout.crop_height,
    ) {
        Ok(cropped) => {
            cropped.copy_into(out);
            true
        }
        Err(err) => {
            log::warn!("dropping raw {}x{} frame: {}", raw.cols(), raw.rows(), err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(capture: (u32, u32), crop: (u32, u32, u32, u32)) -> FrameLayout {
        FrameLayout {
            capture_width: capture.0,
            capture_height: capture.1,
            crop_x: crop.0,
            crop_y: crop.1,
            crop_width: crop.2,
            crop_height: crop.3,
        }
    }

    #[test]
    fn crop_copies_rectangle() {
        let mut raw = Frame::new(4, 4);
        for y in 0..4 {
            for x in 0..4 {
                let i = ((y * 4 + x) * 3) as usize;
                raw.as_bytes_mut()[i] = (10 * y + x) as u8;
            }
        }
        let mut out = Frame::new(0, 0);
        assert!(crop_into(&raw.view(), &layout((4, 4), (1, 2, 2, 2)), &mut out));
        assert_eq!((out.width(), out.height()), (2, 2));
        assert_eq!(out.pixel(0, 0)[0], 21);
        assert_eq!(out.pixel(1, 1)[0], 32);
    }

    #[test]
    fn crop_rejects_undersized_raw_frame() {
        let raw = Frame::new(320, 240);
        let mut out = Frame::new(0, 0);
        assert!(!crop_into(&raw.view(), &layout((640, 480), (0, 0, 640, 480)), &mut out));
    }
}
