//! Synthetic capture (stub:// sources and the stub fixed-format driver).
//!
//! Frames carry a deterministic pattern so tests can check what the pipeline did:
//! red = row index, green = column index, blue = frame number (all mod 256).

use anyhow::{anyhow, Result};

use crate::frame::{FrameView, CHANNELS};

pub(crate) const STUB_SCHEME: &str = "stub://";

/// Fill `rgb` (tightly packed `width x height`) with the test pattern.
pub(crate) fn fill_pattern(rgb: &mut [u8], width: u32, height: u32, frame: u64, mirror: bool) {
    let w = width as usize;
    for y in 0..height as usize {
        for x in 0..w {
            let column = if mirror { w - 1 - x } else { x };
            let i = (y * w + x) * CHANNELS;
            rgb[i] = y as u8;
            rgb[i + 1] = column as u8;
            rgb[i + 2] = frame as u8;
        }
    }
}

/// Generic-backend synthetic source.
///
/// `stub://name?drop_every=N` makes every Nth poll a transient miss, which is how a
/// capture library behaves when the camera has not delivered a new frame yet.
pub(crate) struct SyntheticSource {
    label: String,
    width: u32,
    height: u32,
    drop_every: Option<u64>,
    polls: u64,
    frame_count: u64,
    rgb: Vec<u8>,
}

impl SyntheticSource {
    pub(crate) fn open(label: &str, width: u32, height: u32) -> Result<Self> {
        let drop_every = parse_drop_every(label)?;
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            label,
            width,
            height
        );
        Ok(Self {
            label: label.to_string(),
            width,
            height,
            drop_every,
            polls: 0,
            frame_count: 0,
            rgb: vec![0u8; width as usize * height as usize * CHANNELS],
        })
    }

    pub(crate) fn next_frame(&mut self) -> Option<FrameView<'_>> {
        self.polls += 1;
        if let Some(n) = self.drop_every {
            if self.polls % n == 0 {
                log::debug!("SyntheticSource: {} has no new frame", self.label);
                return None;
            }
        }
        fill_pattern(&mut self.rgb, self.width, self.height, self.frame_count, false);
        self.frame_count += 1;
        FrameView::packed(&self.rgb, self.width, self.height).ok()
    }
}

fn parse_drop_every(label: &str) -> Result<Option<u64>> {
    let Some((_, query)) = label.split_once('?') else {
        return Ok(None);
    };
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("drop_every=") {
            let n: u64 = value
                .parse()
                .map_err(|_| anyhow!("drop_every must be a positive integer in {}", label))?;
            if n == 0 {
                return Err(anyhow!("drop_every must be a positive integer in {}", label));
            }
            return Ok(Some(n));
        }
    }
    Ok(None)
}
