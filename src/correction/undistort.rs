use super::calibration::CalibrationMap;
use crate::frame::{Frame, CHANNELS};

/// Remap `src` through `map` into `dst` with bilinear interpolation.
///
/// Without a map (or with one whose size does not match `src`) this is an identity
/// copy. Neighbour samples that fall outside `src` read as black, so locations mapped
/// entirely outside the source come out as zero.
pub fn undistort_into(src: &Frame, map: Option<&CalibrationMap>, dst: &mut Frame) {
    let Some(map) = map else {
        dst.copy_from(src);
        return;
    };
    if map.width() != src.width() || map.height() != src.height() {
        log::warn!(
            "calibration map is {}x{} but frame is {}x{}; passing frame through",
            map.width(),
            map.height(),
            src.width(),
            src.height()
        );
        dst.copy_from(src);
        return;
    }

    dst.ensure_size(map.width(), map.height());
    let width = map.width() as usize;
    let (map_x, map_y) = map.tables();
    let out = dst.as_bytes_mut();

    for (i, (&sx, &sy)) in map_x.iter().zip(map_y).enumerate() {
        let pixel = sample_bilinear(src, sx, sy);
        let y = i / width;
        let x = i % width;
        let o = (y * width + x) * CHANNELS;
        out[o..o + CHANNELS].copy_from_slice(&pixel);
    }
}

fn sample_bilinear(src: &Frame, x: f32, y: f32) -> [u8; 3] {
    if !x.is_finite() || !y.is_finite() {
        return [0; 3];
    }
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let x0 = x0 as i64;
    let y0 = y0 as i64;

    let taps = [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x0 + 1, y0, fx * (1.0 - fy)),
        (x0, y0 + 1, (1.0 - fx) * fy),
        (x0 + 1, y0 + 1, fx * fy),
    ];

    let mut acc = [0f32; 3];
    for (tx, ty, weight) in taps {
        if weight == 0.0 {
            continue;
        }
        let Some(px) = pixel_or_border(src, tx, ty) else {
            continue;
        };
        for c in 0..CHANNELS {
            acc[c] += weight * px[c] as f32;
        }
    }
    acc.map(|v| v.round().clamp(0.0, 255.0) as u8)
}

fn pixel_or_border(src: &Frame, x: i64, y: i64) -> Option<[u8; 3]> {
    if x < 0 || y < 0 || x >= src.width() as i64 || y >= src.height() as i64 {
        return None;
    }
    Some(src.pixel(x as u32, y as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Frame {
        let mut frame = Frame::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let i = ((y * width + x) * 3) as usize;
                let bytes = frame.as_bytes_mut();
                bytes[i] = (x * 10) as u8;
                bytes[i + 1] = (y * 10) as u8;
                bytes[i + 2] = ((x + y) * 7) as u8;
            }
        }
        frame
    }

    #[test]
    fn no_map_is_identity() {
        let src = gradient(6, 5);
        let mut dst = Frame::new(0, 0);
        undistort_into(&src, None, &mut dst);
        assert_eq!(dst, src);
    }

    #[test]
    fn identity_map_is_pixel_exact() {
        let src = gradient(9, 7);
        let map = CalibrationMap::identity(9, 7);
        let mut dst = Frame::new(0, 0);
        undistort_into(&src, Some(&map), &mut dst);
        assert_eq!(dst, src);
    }

    #[test]
    fn half_pixel_shift_interpolates() {
        let src = gradient(4, 1);
        let map_x = vec![0.5, 1.5, 2.5, 3.5];
        let map_y = vec![0.0; 4];
        let map = CalibrationMap::from_tables(4, 1, map_x, map_y).unwrap();
        let mut dst = Frame::new(0, 0);
        undistort_into(&src, Some(&map), &mut dst);

        assert_eq!(dst.pixel(0, 0)[0], 5);
        assert_eq!(dst.pixel(1, 0)[0], 15);
        assert_eq!(dst.pixel(2, 0)[0], 25);
        // Right neighbour of the last column is outside the source and reads as black.
        assert_eq!(dst.pixel(3, 0)[0], 15);
    }

    #[test]
    fn outside_samples_are_black() {
        let src = gradient(3, 3);
        let map = CalibrationMap::from_tables(3, 3, vec![-5.0; 9], vec![100.0; 9]).unwrap();
        let mut dst = Frame::new(0, 0);
        undistort_into(&src, Some(&map), &mut dst);
        assert!(dst.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn mismatched_map_passes_through() {
        let src = gradient(4, 4);
        let map = CalibrationMap::identity(8, 8);
        let mut dst = Frame::new(0, 0);
        undistort_into(&src, Some(&map), &mut dst);
        assert_eq!(dst, src);
    }
}
