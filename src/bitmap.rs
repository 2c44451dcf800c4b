//! Conversion of raster pages into the canonical 1-bit bitmap.
//!
//! Whatever the source depth and polarity, the bitmap handed to the JBIG
//! encoder is always packed the same way:
//!
//! - Bit 7 (MSB) = leftmost pixel of each group of 8
//! - 1 = mark (black), 0 = no mark (white)
//! - row stride = `ceil(width / 8)` bytes, unused trailing bits are zero
//!
//! ```text
//! Byte value 0xF0 = 11110000 = ████░░░░
//! Byte value 0x0F = 00001111 = ░░░░████
//! ```

use log::warn;

use crate::{
    error::PageError,
    raster::{PageDescriptor, RasterSource},
};

/// 8-bit samples at or above this value are ink on a `K` channel.
pub const THRESHOLD: u8 = 128;

/// Packed monochrome page image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
}

impl Bitmap {
    /// Allocate an all-white bitmap.
    pub fn new(width: u32, height: u32) -> Result<Self, PageError> {
        let stride = stride_for(width);
        let size = stride
            .checked_mul(height as usize)
            .ok_or_else(|| PageError::allocation("page bitmap"))?;

        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|err| PageError::reserve("page bitmap", err))?;
        data.resize(size, 0);

        Ok(Bitmap {
            width,
            height,
            stride,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        &mut self.data[start..start + self.stride]
    }

    /// Zero the bits past `width` in the last byte of a row.
    fn clear_padding(&mut self, y: u32) {
        let used = (self.width % 8) as u8;
        if used == 0 {
            return;
        }
        if let Some(last) = self.row_mut(y).last_mut() {
            *last &= 0xFFu8 << (8 - used);
        }
    }
}

/// Row stride of a packed 1-bit image.
pub fn stride_for(width: u32) -> usize {
    (width as usize + 7) / 8
}

/// Something worth a warning that still produced a usable bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeWarning {
    /// Neither 1 nor 8 bits per pixel. Rows were copied as if they were
    /// already 1-bit.
    UnsupportedDepth { bits_per_pixel: u32 },

    /// The source ended at `line`. That row and the ones below it are blank.
    Truncated { line: u32 },
}

/// Result of normalizing one page.
#[derive(Debug)]
pub struct Normalized {
    pub bitmap: Bitmap,
    pub warnings: Vec<NormalizeWarning>,
}

/// Read every line of `page` from `source` and pack it into a [`Bitmap`].
///
/// Only allocation failures are errors. A short read or an unsupported bit
/// depth still yields a bitmap, flagged in [`Normalized::warnings`].
pub fn normalize<S: RasterSource + ?Sized>(
    page: &PageDescriptor,
    source: &mut S,
) -> Result<Normalized, PageError> {
    let mut bitmap = Bitmap::new(page.width, page.height)?;
    let mut warnings = Vec::new();

    let source_stride = page.bytes_per_line as usize;
    let mut line = Vec::new();
    line.try_reserve_exact(source_stride)
        .map_err(|err| PageError::reserve("raster line", err))?;
    line.resize(source_stride, 0);

    if page.bits_per_pixel != 1 && page.bits_per_pixel != 8 {
        warn!(
            "unsupported bpp={}, treating as 1-bit",
            page.bits_per_pixel
        );
        warnings.push(NormalizeWarning::UnsupportedDepth {
            bits_per_pixel: page.bits_per_pixel,
        });
    }

    for y in 0..page.height {
        if let Err(err) = source.read_line(&mut line) {
            warn!("short read at line {}: {}", y, err);
            warnings.push(NormalizeWarning::Truncated { line: y });
            break;
        }

        let dst = bitmap.row_mut(y);
        match page.bits_per_pixel {
            8 => threshold_row(&line, dst, page.width, page.color_space.is_luminance()),
            // 1-bit rows already use 1 = black; other depths get the same copy
            _ => {
                let n = dst.len().min(line.len());
                dst[..n].copy_from_slice(&line[..n]);
            }
        }
        bitmap.clear_padding(y);
    }

    Ok(Normalized { bitmap, warnings })
}

/// Pack one row of 8-bit samples, MSB first.
fn threshold_row(src: &[u8], dst: &mut [u8], width: u32, luminance: bool) {
    let pixels = (width as usize).min(src.len()).min(dst.len() * 8);

    for (x, &value) in src[..pixels].iter().enumerate() {
        let black = if luminance {
            value < THRESHOLD
        } else {
            value >= THRESHOLD
        };
        if black {
            dst[x / 8] |= 0x80 >> (x % 8);
        }
    }
}
