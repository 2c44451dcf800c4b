//! CUPS raster input.
//!
//! The converter only needs two things from its input: the next page header
//! and one pixel line at a time. [`RasterSource`] is that seam, and
//! [`CupsRaster`] implements it for CUPS raster streams (versions 1, 2 and 3).

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use log::{debug, warn};
use std::io::{self, Read};

use crate::error::{Error, ShortRead};

/// Size in bytes of a CUPS page header (`cups_page_header2_t`).
pub const HEADER_SIZE: usize = 1796;

// Field offsets inside the page header.
const HW_RESOLUTION: usize = 276;
const MEDIA_POSITION: usize = 324;
const CUPS_WIDTH: usize = 372;
const CUPS_HEIGHT: usize = 376;
const CUPS_BITS_PER_PIXEL: usize = 388;
const CUPS_BYTES_PER_LINE: usize = 392;
const CUPS_COLOR_SPACE: usize = 400;
const CUPS_PAGE_SIZE_NAME: usize = 1732;
const NAME_LEN: usize = 64;

/// Color space of a raster page.
///
/// Only the polarity matters here: luminance channels (`W`, `SW`) use
/// 0 for black, every other space is treated like `K` where 0 is white.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    W,
    K,
    Sw,
    Other(u32),
}

impl ColorSpace {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::W,
            3 => Self::K,
            18 => Self::Sw,
            n => Self::Other(n),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::W => 0,
            Self::K => 3,
            Self::Sw => 18,
            Self::Other(n) => *n,
        }
    }

    /// `true` when a zero sample is black and 255 is white.
    pub fn is_luminance(&self) -> bool {
        matches!(self, Self::W | Self::Sw)
    }
}

/// Geometry and media settings of one raster page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDescriptor {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    pub color_space: ColorSpace,
    pub bytes_per_line: u32,
    /// `cupsPageSizeName`, `None` when the header leaves it blank.
    pub page_size_name: Option<String>,
    /// Horizontal resolution in dots per inch.
    pub resolution: u32,
    pub media_position: u32,
}

impl PageDescriptor {
    /// A page without lines or without bytes per line carries no image.
    pub fn is_empty(&self) -> bool {
        self.height == 0 || self.bytes_per_line == 0
    }
}

/// Sequential reader of raster pages.
pub trait RasterSource {
    /// Read the next page header, `None` once the stream is exhausted.
    fn next_page(&mut self) -> Option<PageDescriptor>;

    /// Fill `buf` with the next pixel line of the current page.
    ///
    /// `buf` is expected to be exactly `bytes_per_line` long.
    fn read_line(&mut self, buf: &mut [u8]) -> Result<(), ShortRead>;
}

impl<T: RasterSource + ?Sized> RasterSource for &mut T {
    fn next_page(&mut self) -> Option<PageDescriptor> {
        (**self).next_page()
    }

    fn read_line(&mut self, buf: &mut [u8]) -> Result<(), ShortRead> {
        (**self).read_line(buf)
    }
}

/// Raster stream version, selected by the sync word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    /// Uncompressed.
    V1,
    /// Run-length compressed lines.
    V2,
    /// Uncompressed, `cupsBytesPerLine` aligned.
    V3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Big,
    Little,
}

/// Decoding state of the page currently being read.
struct PageState {
    bytes_per_line: usize,
    pixel_size: usize,
    lines_left: u32,
    // v2 only: last decoded line and how many more times it is used.
    line: Vec<u8>,
    repeats: u32,
    pixel: Vec<u8>,
    // Byte value of a blank pixel in this page's colour space.
    blank: u8,
}

impl PageState {
    fn new(page: &PageDescriptor) -> Self {
        let bytes_per_line = page.bytes_per_line as usize;
        PageState {
            bytes_per_line,
            pixel_size: ((page.bits_per_pixel as usize + 7) / 8).max(1),
            lines_left: if bytes_per_line == 0 { 0 } else { page.height },
            line: Vec::new(),
            repeats: 0,
            pixel: Vec::new(),
            blank: if page.color_space.is_luminance() { 0xFF } else { 0x00 },
        }
    }
}

/// [`RasterSource`] over a CUPS raster byte stream.
pub struct CupsRaster<R> {
    reader: R,
    version: Version,
    endian: Endian,
    page: Option<PageState>,
}

impl<R: Read> CupsRaster<R> {
    /// Start reading a raster stream by checking its sync word.
    pub fn open(mut reader: R) -> Result<Self, Error> {
        let mut sync = [0u8; 4];
        let n = read_full(&mut reader, &mut sync)
            .map_err(|err| Error::RasterOpen(format!("cannot read sync word: {}", err)))?;
        if n < sync.len() {
            return Err(Error::RasterOpen("stream too short for sync word".to_string()));
        }

        let (version, endian) = match &sync {
            b"RaSt" => (Version::V1, Endian::Big),
            b"tSaR" => (Version::V1, Endian::Little),
            b"RaS2" => (Version::V2, Endian::Big),
            b"2SaR" => (Version::V2, Endian::Little),
            b"RaS3" => (Version::V3, Endian::Big),
            b"3SaR" => (Version::V3, Endian::Little),
            other => {
                return Err(Error::RasterOpen(format!(
                    "unknown sync word {:02X?}",
                    other
                )))
            }
        };
        debug!("raster stream {:?}, {:?} endian", version, endian);

        Ok(CupsRaster {
            reader,
            version,
            endian,
            page: None,
        })
    }

    pub fn version(&self) -> Version {
        self.version
    }

    fn parse_header(&self, buf: &[u8]) -> PageDescriptor {
        let field = |offset: usize| match self.endian {
            Endian::Big => BigEndian::read_u32(&buf[offset..offset + 4]),
            Endian::Little => LittleEndian::read_u32(&buf[offset..offset + 4]),
        };

        let name = &buf[CUPS_PAGE_SIZE_NAME..CUPS_PAGE_SIZE_NAME + NAME_LEN];
        let end = name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        let page_size_name = String::from_utf8_lossy(&name[..end]).trim().to_string();

        PageDescriptor {
            width: field(CUPS_WIDTH),
            height: field(CUPS_HEIGHT),
            bits_per_pixel: field(CUPS_BITS_PER_PIXEL),
            color_space: ColorSpace::from_code(field(CUPS_COLOR_SPACE)),
            bytes_per_line: field(CUPS_BYTES_PER_LINE),
            page_size_name: if page_size_name.is_empty() {
                None
            } else {
                Some(page_size_name)
            },
            resolution: field(HW_RESOLUTION),
            media_position: field(MEDIA_POSITION),
        }
    }

    /// Consume whatever is left of the current page.
    fn skip_page(&mut self) -> io::Result<()> {
        let page = match self.page.as_mut() {
            Some(page) if page.lines_left > 0 => page,
            _ => return Ok(()),
        };
        debug!("skipping {} unread line(s)", page.lines_left);

        match self.version {
            Version::V1 | Version::V3 => {
                let remaining = page.lines_left as u64 * page.bytes_per_line as u64;
                page.lines_left = 0;
                io::copy(&mut (&mut self.reader).take(remaining), &mut io::sink())?;
            }
            Version::V2 => {
                while page.lines_left > 0 {
                    page.lines_left -= 1;
                    decode_line(&mut self.reader, page)?;
                }
            }
        }
        Ok(())
    }
}

impl<R: Read> RasterSource for CupsRaster<R> {
    fn next_page(&mut self) -> Option<PageDescriptor> {
        if let Err(err) = self.skip_page() {
            warn!("raster stream ended inside a page: {}", err);
            return None;
        }
        self.page = None;

        let mut buf = [0u8; HEADER_SIZE];
        match read_full(&mut self.reader, &mut buf) {
            Ok(0) => None,
            Ok(n) if n < HEADER_SIZE => {
                warn!("truncated page header ({} of {} bytes)", n, HEADER_SIZE);
                None
            }
            Ok(_) => {
                let page = self.parse_header(&buf);
                self.page = Some(PageState::new(&page));
                Some(page)
            }
            Err(err) => {
                warn!("cannot read page header: {}", err);
                None
            }
        }
    }

    fn read_line(&mut self, buf: &mut [u8]) -> Result<(), ShortRead> {
        let expected = buf.len();
        let page = match self.page.as_mut() {
            Some(page) if page.lines_left > 0 => page,
            _ => return Err(ShortRead { expected, actual: 0 }),
        };
        page.lines_left -= 1;

        match self.version {
            Version::V1 | Version::V3 => {
                let actual = read_full(&mut self.reader, buf).unwrap_or(0);
                if actual < expected {
                    page.lines_left = 0;
                    return Err(ShortRead { expected, actual });
                }
            }
            Version::V2 => {
                if let Err(err) = decode_line(&mut self.reader, page) {
                    debug!("compressed line decode failed: {}", err);
                    page.lines_left = 0;
                    return Err(ShortRead {
                        expected,
                        actual: 0,
                    });
                }
                let actual = expected.min(page.line.len());
                buf[..actual].copy_from_slice(&page.line[..actual]);
                if actual < expected {
                    return Err(ShortRead { expected, actual });
                }
            }
        }
        Ok(())
    }
}

/// Decode the next v2 line into `page.line`, honouring line repeats.
fn decode_line<R: Read>(reader: &mut R, page: &mut PageState) -> io::Result<()> {
    if page.repeats > 0 {
        page.repeats -= 1;
        return Ok(());
    }

    let bpl = page.bytes_per_line;
    if page.line.len() != bpl {
        page.line.clear();
        page.line.try_reserve_exact(bpl).map_err(|_| {
            io::Error::new(io::ErrorKind::OutOfMemory, "raster line buffer")
        })?;
        page.line.resize(bpl, 0);
        page.pixel = vec![0; page.pixel_size];
    }

    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte)?;
    page.repeats = byte[0] as u32;

    let mut filled = 0;
    while filled < bpl {
        reader.read_exact(&mut byte)?;
        let control = byte[0] as usize;

        if control < 128 {
            // One pixel, repeated control + 1 times.
            reader.read_exact(&mut page.pixel)?;
            let count = ((control + 1) * page.pixel_size).min(bpl - filled);
            for i in 0..count {
                page.line[filled + i] = page.pixel[i % page.pixel_size];
            }
            filled += count;
        } else if control == 128 {
            // Rest of the line is blank.
            page.line[filled..].fill(page.blank);
            filled = bpl;
        } else {
            // 257 - control literal pixels.
            let count = ((257 - control) * page.pixel_size).min(bpl - filled);
            reader.read_exact(&mut page.line[filled..filled + count])?;
            filled += count;
        }
    }
    Ok(())
}

/// Like `read_exact`, but reports how much was read when the stream ends early.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}
