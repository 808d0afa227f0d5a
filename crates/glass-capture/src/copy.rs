//! Stride-aware pixel row copy.
//!
//! Producers and GPU mappings each pick their own row pitch, so a frame is
//! copied as `rows` runs of `row_bytes`, reading at `row * src_pitch` and
//! writing at `row * dst_pitch`. When both pitches agree the whole span is
//! moved in one pass.

use crate::error::CaptureError;
use crate::CaptureResult;

/// Copy `rows` rows of `row_bytes` bytes between buffers with different pitches.
///
/// With unequal pitches, bytes of `dst` outside the written row ranges are
/// left untouched.
pub fn copy_rows(
    src: &[u8],
    src_pitch: usize,
    dst: &mut [u8],
    dst_pitch: usize,
    row_bytes: usize,
    rows: usize,
) -> CaptureResult<()> {
    if rows == 0 || row_bytes == 0 {
        return Ok(());
    }
    if row_bytes > src_pitch || row_bytes > dst_pitch {
        return Err(CaptureError::InvalidFrame(format!(
            "row of {row_bytes} bytes exceeds pitch (src {src_pitch}, dst {dst_pitch})"
        )));
    }

    let src_len = span_len(src_pitch, row_bytes, rows)?;
    let dst_len = span_len(dst_pitch, row_bytes, rows)?;
    if src.len() < src_len || dst.len() < dst_len {
        return Err(CaptureError::InvalidFrame(format!(
            "buffers too small: src {} < {src_len} or dst {} < {dst_len}",
            src.len(),
            dst.len()
        )));
    }

    if src_pitch == dst_pitch {
        dst[..src_len].copy_from_slice(&src[..src_len]);
        return Ok(());
    }

    for row in 0..rows {
        let src_offset = row * src_pitch;
        let dst_offset = row * dst_pitch;
        dst[dst_offset..dst_offset + row_bytes]
            .copy_from_slice(&src[src_offset..src_offset + row_bytes]);
    }

    Ok(())
}

fn span_len(pitch: usize, row_bytes: usize, rows: usize) -> CaptureResult<usize> {
    pitch
        .checked_mul(rows - 1)
        .and_then(|len| len.checked_add(row_bytes))
        .ok_or_else(|| CaptureError::InvalidFrame("frame span overflows".to_string()))
}
