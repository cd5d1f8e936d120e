use image::GrayImage;

use crate::error::{MaskError, Result};
use crate::rasterize::LabelMask;
use crate::scheme::RemapTable;

/// Replace every class index in `mask` with its output value from `table`.
///
/// `table` is expected to have passed [`RemapTable::validate_for`]; an index it cannot map is
/// still reported as [`MaskError::UnmappedIndex`] rather than silently kept.
pub fn remap(mask: &LabelMask, table: &RemapTable) -> Result<GrayImage> {
    let mut out = GrayImage::new(mask.width(), mask.height());
    for (dst, &index) in out.iter_mut().zip(mask.as_raw()) {
        *dst = table
            .lookup(index)
            .ok_or(MaskError::UnmappedIndex(index))?;
    }
    Ok(out)
}
