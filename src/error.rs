//! Error types surfaced by the crate.
//!
//! Only conditions that stop a session from opening are errors. Transient frame
//! misses, missing calibration and ambiguous device remaps are logged and absorbed.

use std::path::PathBuf;

/// Why `CameraSession::open` failed. No resources are held when this is returned.
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    /// Device index out of range, or the driver refused to open it.
    #[error("camera device {index} unavailable: {reason:#}")]
    DeviceUnavailable { index: i32, reason: anyhow::Error },
    /// The backend cannot capture anything matching the requested size.
    #[error("frame layout negotiation failed: {0}")]
    LayoutNegotiationFailed(#[from] LayoutError),
    /// Framerate must be positive, or -1 for the default.
    #[error("invalid framerate {0}")]
    InvalidFramerate(i32),
}

/// No layout satisfies the request under the backend's capability model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("requested size {width}x{height} exceeds what the backend can capture")]
    TooLarge { width: u32, height: u32 },
    #[error("requested size {width}x{height} is below the minimum crop {min_width}x{min_height}")]
    TooSmall {
        width: u32,
        height: u32,
        min_width: u32,
        min_height: u32,
    },
    #[error("backend reports no capture modes")]
    NoModes,
    #[error("requested size {width}x{height} has a zero dimension")]
    ZeroSized { width: u32, height: u32 },
    #[error("device negotiated {width}x{height}, smaller than the {requested_width}x{requested_height} capture")]
    NegotiatedTooSmall {
        requested_width: u32,
        requested_height: u32,
        width: u32,
        height: u32,
    },
}

/// Lens calibration input could not be turned into a remap table.
#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error("failed to read calibration file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid calibration file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("calibration matrix in {path} has unexpected shape: {detail}")]
    Shape { path: PathBuf, detail: String },
    #[error("camera intrinsics are not usable (zero or non-finite focal length)")]
    InvalidIntrinsics,
    #[error("remap tables hold {actual} entries, expected {expected}")]
    TableSize { expected: usize, actual: usize },
}
