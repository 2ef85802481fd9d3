use crate::frame::Frame;

/// Keep the odd scanlines of `src` and stretch them back to full height into `dst`.
///
/// The odd field is addressed through a strided view (offset one row, doubled stride),
/// so nothing is copied until the nearest-neighbor resize writes `dst`. Frames with
/// fewer than two rows have no odd field and are copied unchanged.
pub fn deinterlace_into(src: &Frame, dst: &mut Frame) {
    let height = src.height();
    if height < 2 {
        dst.copy_from(src);
        return;
    }

    let odd = match src.view().field(1) {
        Ok(view) => view,
        Err(err) => {
            log::warn!("deinterlace skipped: {}", err);
            dst.copy_from(src);
            return;
        }
    };

    dst.ensure_size(src.width(), height);
    let field_rows = odd.rows() as u64;
    for y in 0..height {
        let source_row = ((y as u64 * field_rows) / height as u64).min(field_rows - 1);
        dst.row_mut(y).copy_from_slice(odd.row(source_row as u32));
    }
}
