//! Borrowed view of a frame handed over by a capture backend.

use std::slice;

/// Bytes per BGRA/BGRx pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// A validated BGRA frame borrowed from its producer.
///
/// The view is only valid for the duration of the delivery call; the
/// session copies out of it and never keeps it.
#[derive(Debug, Clone, Copy)]
pub struct FrameRef<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    pitch: u32,
}

impl<'a> FrameRef<'a> {
    /// Wrap a buffer, rejecting degenerate geometry.
    ///
    /// Returns `None` for a zero dimension or pitch, a pitch narrower than a
    /// row of pixels, or a buffer too short for `height` rows.
    pub fn new(data: &'a [u8], width: u32, height: u32, pitch: u32) -> Option<Self> {
        let len = required_len(width, height, pitch)?;
        if data.len() < len {
            return None;
        }
        Some(Self {
            data: &data[..len],
            width,
            height,
            pitch,
        })
    }

    /// Wrap a raw producer buffer.
    ///
    /// # Safety
    ///
    /// When non-null, `data` must be readable for `pitch * (height - 1) +
    /// width * 4` bytes for the lifetime `'a`.
    pub unsafe fn from_raw(data: *const u8, width: u32, height: u32, pitch: u32) -> Option<Self> {
        if data.is_null() {
            return None;
        }
        let len = required_len(width, height, pitch)?;
        Self::new(slice::from_raw_parts(data, len), width, height, pitch)
    }

    /// Pixel bytes, starting at the first row.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes between the starts of consecutive rows.
    pub fn pitch(&self) -> usize {
        self.pitch as usize
    }

    /// Meaningful bytes per row (`width * 4`).
    pub fn row_bytes(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }
}

/// Bytes spanned by `height` rows where the last row carries no padding.
fn required_len(width: u32, height: u32, pitch: u32) -> Option<usize> {
    if width == 0 || height == 0 || pitch == 0 {
        return None;
    }
    let row_bytes = (width as usize).checked_mul(BYTES_PER_PIXEL)?;
    let pitch = pitch as usize;
    if pitch < row_bytes {
        return None;
    }
    pitch
        .checked_mul(height as usize - 1)?
        .checked_add(row_bytes)
}
