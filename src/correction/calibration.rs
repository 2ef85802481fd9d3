//! Lens calibration input and remap tables.
//!
//! Coefficients come from two files written by an external calibration tool: the 3x3
//! camera matrix and the distortion vector. Both are JSON matrices in the same
//! row-major layout OpenCV uses when it serializes a `Mat`:
//!
//! ```json
//! { "rows": 3, "cols": 3, "data": [fx, 0, cx, 0, fy, cy, 0, 0, 1] }
//! ```
//!
//! The distortion vector holds 4 (k1 k2 p1 p2), 5 (+k3) or 8 (+k4 k5 k6, rational
//! model) values in any 1xN or Nx1 shape.

use serde::Deserialize;
use std::path::Path;

use crate::error::CalibrationError;

/// Pinhole camera matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub skew: f64,
}

impl CameraIntrinsics {
    /// Returns `true` when focal lengths are finite and non-zero.
    pub fn is_valid(&self) -> bool {
        [self.fx, self.fy, self.cx, self.cy, self.skew]
            .iter()
            .all(|v| v.is_finite())
            && self.fx.abs() > 1e-12
            && self.fy.abs() > 1e-12
    }
}

/// Radial-tangential distortion, optionally with the rational denominator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DistortionCoefficients {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
    pub k4: f64,
    pub k5: f64,
    pub k6: f64,
}

impl DistortionCoefficients {
    /// Apply distortion to normalized coordinates.
    pub fn distort_normalized(&self, x: f64, y: f64) -> (f64, f64) {
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = (1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6)
            / (1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6);
        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        (x * radial + x_tan, y * radial + y_tan)
    }
}

/// Per-pixel source coordinates for undistortion. Both tables always exist together.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationMap {
    width: u32,
    height: u32,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
}

impl CalibrationMap {
    /// Tables that sample every output pixel from the same source pixel.
    pub fn identity(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        let mut map_x = Vec::with_capacity(len);
        let mut map_y = Vec::with_capacity(len);
        for y in 0..height {
            for x in 0..width {
                map_x.push(x as f32);
                map_y.push(y as f32);
            }
        }
        Self {
            width,
            height,
            map_x,
            map_y,
        }
    }

    /// Wrap precomputed tables (row-major, `width * height` entries each).
    pub fn from_tables(
        width: u32,
        height: u32,
        map_x: Vec<f32>,
        map_y: Vec<f32>,
    ) -> Result<Self, CalibrationError> {
        let expected = width as usize * height as usize;
        for actual in [map_x.len(), map_y.len()] {
            if actual != expected {
                return Err(CalibrationError::TableSize { expected, actual });
            }
        }
        Ok(Self {
            width,
            height,
            map_x,
            map_y,
        })
    }

    /// Build undistortion tables for a `width x height` output.
    ///
    /// Rectification is the identity and the output reuses the input camera matrix, so
    /// each output pixel is projected to normalized coordinates, distorted, and projected
    /// back to find where to sample the raw frame.
    pub fn undistort(
        intrinsics: &CameraIntrinsics,
        distortion: &DistortionCoefficients,
        width: u32,
        height: u32,
    ) -> Result<Self, CalibrationError> {
        if !intrinsics.is_valid() {
            return Err(CalibrationError::InvalidIntrinsics);
        }
        let len = width as usize * height as usize;
        let mut map_x = Vec::with_capacity(len);
        let mut map_y = Vec::with_capacity(len);
        let k = intrinsics;

        for v in 0..height {
            let y = (v as f64 - k.cy) / k.fy;
            for u in 0..width {
                let x = (u as f64 - k.cx - k.skew * y) / k.fx;
                let (xd, yd) = distortion.distort_normalized(x, y);
                map_x.push((k.fx * xd + k.skew * yd + k.cx) as f32);
                map_y.push((k.fy * yd + k.cy) as f32);
            }
        }

        Ok(Self {
            width,
            height,
            map_x,
            map_y,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(map_x, map_y)`, row-major.
    pub fn tables(&self) -> (&[f32], &[f32]) {
        (&self.map_x, &self.map_y)
    }
}

#[derive(Debug, Deserialize)]
struct MatrixFile {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

/// Load both coefficient files and build a `width x height` undistortion map.
pub fn load_calibration(
    intrinsics_path: &Path,
    distortion_path: &Path,
    width: u32,
    height: u32,
) -> Result<CalibrationMap, CalibrationError> {
    let intrinsics = read_intrinsics(intrinsics_path)?;
    let distortion = read_distortion(distortion_path)?;
    CalibrationMap::undistort(&intrinsics, &distortion, width, height)
}

fn read_matrix(path: &Path) -> Result<MatrixFile, CalibrationError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CalibrationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let matrix: MatrixFile =
        serde_json::from_str(&raw).map_err(|source| CalibrationError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    if matrix.rows.checked_mul(matrix.cols) != Some(matrix.data.len()) {
        return Err(CalibrationError::Shape {
            path: path.to_path_buf(),
            detail: format!(
                "{}x{} header but {} values",
                matrix.rows,
                matrix.cols,
                matrix.data.len()
            ),
        });
    }
    Ok(matrix)
}

fn read_intrinsics(path: &Path) -> Result<CameraIntrinsics, CalibrationError> {
    let m = read_matrix(path)?;
    if m.rows != 3 || m.cols != 3 {
        return Err(CalibrationError::Shape {
            path: path.to_path_buf(),
            detail: format!("camera matrix must be 3x3, got {}x{}", m.rows, m.cols),
        });
    }
    let d = &m.data;
    Ok(CameraIntrinsics {
        fx: d[0],
        skew: d[1],
        cx: d[2],
        fy: d[4],
        cy: d[5],
    })
}

fn read_distortion(path: &Path) -> Result<DistortionCoefficients, CalibrationError> {
    let m = read_matrix(path)?;
    if m.rows != 1 && m.cols != 1 {
        return Err(CalibrationError::Shape {
            path: path.to_path_buf(),
            detail: format!("distortion must be a vector, got {}x{}", m.rows, m.cols),
        });
    }
    let d = &m.data;
    let mut coeffs = DistortionCoefficients::default();
    match d.len() {
        4 | 5 | 8 => {
            coeffs.k1 = d[0];
            coeffs.k2 = d[1];
            coeffs.p1 = d[2];
            coeffs.p2 = d[3];
            if d.len() >= 5 {
                coeffs.k3 = d[4];
            }
            if d.len() == 8 {
                coeffs.k4 = d[5];
                coeffs.k5 = d[6];
                coeffs.k6 = d[7];
            }
        }
        n => {
            return Err(CalibrationError::Shape {
                path: path.to_path_buf(),
                detail: format!("expected 4, 5 or 8 distortion coefficients, got {}", n),
            })
        }
    }
    Ok(coeffs)
}
