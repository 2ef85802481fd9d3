//! Frame buffers.
//!
//! - `Frame`: owned, tightly packed RGB24 image. Sessions reuse these buffer-for-buffer.
//! - `FrameView`: read-only strided view over someone else's bytes. Backends hand these
//!   out for their internal (driver-owned) buffers; the deinterlacer uses one to address
//!   a single field of a frame without copying.
//!
//! A view never changes the dimensions of the buffer it borrows. Anything that needs a
//! different size gets a new (or reused) `Frame`.

use anyhow::{anyhow, Result};

/// Bytes per pixel for every frame this crate produces (RGB, 8 bits per channel).
pub const CHANNELS: usize = 3;

/// Owned RGB24 frame.
///
/// Deliberately not `Clone`: copies of frame buffers should be explicit (`copy_from`).
#[derive(Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    /// Allocate a black frame.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![0u8; byte_len(width, height)],
            width,
            height,
        }
    }

    /// Wrap existing pixel data. The length must match `width * height * 3`.
    pub fn from_pixels(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = byte_len(width, height);
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row. Frames are tightly packed, so this is `width * 3`.
    pub fn row_stride(&self) -> usize {
        self.width as usize * CHANNELS
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.data
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.row_stride();
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let stride = self.row_stride();
        let start = y as usize * stride;
        &mut self.data[start..start + stride]
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width as usize + x as usize) * CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Resize the buffer in place, reusing its allocation when it is already large enough.
    /// Contents are unspecified afterwards.
    pub fn ensure_size(&mut self, width: u32, height: u32) {
        if self.width == width && self.height == height {
            return;
        }
        self.data.resize(byte_len(width, height), 0);
        self.width = width;
        self.height = height;
    }

    /// Copy another frame's pixels, adopting its size.
    pub fn copy_from(&mut self, other: &Frame) {
        self.ensure_size(other.width, other.height);
        self.data.copy_from_slice(&other.data);
    }

    /// Full-frame view.
    pub fn view(&self) -> FrameView<'_> {
        FrameView {
            data: &self.data,
            offset: 0,
            row_stride: self.row_stride(),
            rows: self.height,
            cols: self.width,
        }
    }
}

/// Read-only strided view over RGB24 bytes.
///
/// Row `y` starts at `offset + y * row_stride` and holds `cols * 3` bytes.
#[derive(Clone, Copy, Debug)]
pub struct FrameView<'a> {
    data: &'a [u8],
    offset: usize,
    row_stride: usize,
    rows: u32,
    cols: u32,
}

impl<'a> FrameView<'a> {
    /// Build a view, checking that every addressed row lies inside `data`.
    pub fn new(
        data: &'a [u8],
        offset: usize,
        row_stride: usize,
        rows: u32,
        cols: u32,
    ) -> Result<Self> {
        let row_bytes = cols as usize * CHANNELS;
        if row_stride < row_bytes {
            return Err(anyhow!(
                "row stride {} shorter than row ({} bytes)",
                row_stride,
                row_bytes
            ));
        }
        if rows > 0 {
            let last_end = offset
                .checked_add((rows as usize - 1) * row_stride)
                .and_then(|start| start.checked_add(row_bytes))
                .ok_or_else(|| anyhow!("frame view dimensions overflow"))?;
            if last_end > data.len() {
                return Err(anyhow!(
                    "frame view needs {} bytes, buffer has {}",
                    last_end,
                    data.len()
                ));
            }
        }
        Ok(Self {
            data,
            offset,
            row_stride,
            rows,
            cols,
        })
    }

    /// View of tightly packed RGB24 data.
    pub fn packed(data: &'a [u8], width: u32, height: u32) -> Result<Self> {
        Self::new(data, 0, width as usize * CHANNELS, height, width)
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    pub fn row(&self, y: u32) -> &'a [u8] {
        let start = self.offset + y as usize * self.row_stride;
        &self.data[start..start + self.cols as usize * CHANNELS]
    }

    /// View of every second row starting at `first` (0 = even field, 1 = odd field).
    ///
    /// Only addressing changes: the offset moves by `first` rows and the stride doubles.
    pub fn field(&self, first: u32) -> Result<FrameView<'a>> {
        if first > 1 {
            return Err(anyhow!("field index must be 0 or 1, got {}", first));
        }
        let rows = self.rows.saturating_sub(first).div_ceil(2);
        FrameView::new(
            self.data,
            self.offset + first as usize * self.row_stride,
            self.row_stride * 2,
            rows,
            self.cols,
        )
    }

    /// Sub-rectangle of this view.
    pub fn sub_rect(&self, x: u32, y: u32, width: u32, height: u32) -> Result<FrameView<'a>> {
        let fits_x = x.checked_add(width).is_some_and(|end| end <= self.cols);
        let fits_y = y.checked_add(height).is_some_and(|end| end <= self.rows);
        if !fits_x || !fits_y {
            return Err(anyhow!(
                "rect {}x{}+{}+{} outside {}x{} view",
                width,
                height,
                x,
                y,
                self.cols,
                self.rows
            ));
        }
        FrameView::new(
            self.data,
            self.offset + y as usize * self.row_stride + x as usize * CHANNELS,
            self.row_stride,
            height,
            width,
        )
    }

    /// Copy the viewed pixels into `out`, resizing it to the view.
    pub fn copy_into(&self, out: &mut Frame) {
        out.ensure_size(self.cols, self.rows);
        for y in 0..self.rows {
            out.row_mut(y).copy_from_slice(self.row(y));
        }
    }
}

fn byte_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * CHANNELS
}
