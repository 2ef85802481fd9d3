use anyhow::{anyhow, Result};

/// Native pixel layouts a capture device may hand back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Bgr24,
    Yuyv,
    Nv12,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(Self::Rgb24),
            b"BGR3" => Some(Self::Bgr24),
            b"YUYV" => Some(Self::Yuyv),
            b"NV12" => Some(Self::Nv12),
            _ => None,
        }
    }
}

/// Convert one captured frame into tightly packed RGB24, reusing `out`.
pub(crate) fn normalize_into(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
    out: &mut Vec<u8>,
) -> Result<()> {
    let w = width as usize;
    let h = height as usize;
    let plane = w
        .checked_mul(h)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    out.resize(plane * 3, 0);

    match format {
        PixelFormat::Rgb24 => {
            let src = expect_len(pixels, plane * 3, "RGB")?;
            out.copy_from_slice(src);
        }
        PixelFormat::Bgr24 => {
            let src = expect_len(pixels, plane * 3, "BGR")?;
            for (dst, bgr) in out.chunks_exact_mut(3).zip(src.chunks_exact(3)) {
                dst[0] = bgr[2];
                dst[1] = bgr[1];
                dst[2] = bgr[0];
            }
        }
        PixelFormat::Yuyv => {
            if w % 2 != 0 {
                return Err(anyhow!("YUYV frame width {} is odd", w));
            }
            let src = expect_len(pixels, plane * 2, "YUYV")?;
            for (dst, yuyv) in out.chunks_exact_mut(6).zip(src.chunks_exact(4)) {
                let u = yuyv[1] as f32 - 128.0;
                let v = yuyv[3] as f32 - 128.0;
                write_rgb(&mut dst[0..3], yuyv[0] as f32, u, v);
                write_rgb(&mut dst[3..6], yuyv[2] as f32, u, v);
            }
        }
        PixelFormat::Nv12 => {
            let src = expect_len(pixels, plane + plane / 2, "NV12")?;
            for j in 0..h {
                for i in 0..w {
                    let y = src[j * w + i] as f32;
                    let uv_index = plane + (j / 2) * w + (i / 2) * 2;
                    let u = src[uv_index] as f32 - 128.0;
                    let v = src[uv_index + 1] as f32 - 128.0;
                    let offset = (j * w + i) * 3;
                    write_rgb(&mut out[offset..offset + 3], y, u, v);
                }
            }
        }
    }
    Ok(())
}

/// Drivers may pad buffers past the payload; only a short buffer is an error.
fn expect_len<'a>(pixels: &'a [u8], expected: usize, name: &str) -> Result<&'a [u8]> {
    pixels.get(..expected).ok_or_else(|| {
        anyhow!(
            "{} frame length mismatch: expected {}, got {}",
            name,
            expected,
            pixels.len()
        )
    })
}

fn write_rgb(dst: &mut [u8], y: f32, u: f32, v: f32) {
    dst[0] = clamp_to_u8(y + 1.402_f32 * v);
    dst[1] = clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v);
    dst[2] = clamp_to_u8(y + 1.772_f32 * u);
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
