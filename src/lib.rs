//! Tracker Camera
//!
//! Camera capture for a real-time head/object tracker: open a camera, pull frames,
//! and hand out RGB24 images that are already cropped, optionally deinterlaced and
//! lens-undistorted.
//!
//! # Architecture
//!
//! Frames flow through four stages on every query:
//!
//! 1. **Layout**: the requested size is resolved once at open into a capture size and
//!    a crop rectangle, according to what the backend can actually capture.
//! 2. **Capture**: the backend writes a raw capture-sized frame into a buffer it owns.
//! 3. **Correction**: crop, deinterlace and undistort, in that order, at crop size.
//! 4. **Delivery**: the caller borrows the corrected frame until the next query.
//!
//! # Module Structure
//!
//! - `layout`: requested size to `FrameLayout`
//! - `backend`: fixed-format driver and generic capture (V4L2, files, `stub://`)
//! - `correction`: crop, deinterlace, undistortion and calibration loading
//! - `session`: `CameraSession`, the open/query/close lifecycle
//! - `config`: file and environment overrides
//! - `frame`: owned frames and strided views

pub mod backend;
pub mod config;
pub mod correction;
pub mod error;
pub mod frame;
pub mod layout;
pub mod session;

pub use backend::{
    Backend, BackendHandle, BackendKind, DeviceCount, FixedFormatDriver, GenericCaptureBackend,
    StubDriver,
};
pub use config::CameraConfig;
pub use correction::{CalibrationMap, CameraIntrinsics, DistortionCoefficients};
pub use error::{CalibrationError, LayoutError, OpenError};
pub use frame::{Frame, FrameView};
pub use layout::{resolve_layout, CaptureMode, FrameLayout, LayoutPolicy};
pub use session::{CameraInfo, CameraSession, OpenParams, DEFAULT_FRAMERATE};
