//! PJL envelope of the Ricoh GDI print stream.
//!
//! A job looks like this, every PJL line ending in CR LF:
//!
//! ```text
//! ESC%-12345X@PJL                  job header, once
//! @PJL SET TIMESTAMP=...
//! ...
//! @PJL SET PAGESTATUS=START        page header, per page
//! ...
//! @PJL SET IMAGELEN=<n>
//! <n bytes of JBIG data>
//! @PJL SET DOTCOUNT=1132782        page trailer, per page
//! @PJL SET PAGESTATUS=END
//! @PJL EOJ                         job trailer, once
//! ESC%-12345X
//! ```

use chrono::{Local, NaiveDateTime};
use std::{
    fmt,
    io::{self, Write},
};

use crate::raster::PageDescriptor;

/// Universal Exit Language sequence.
pub const UEL: &[u8] = b"\x1b%-12345X";

/// Line terminator of every PJL command.
pub const EOL: &[u8] = b"\r\n";

/// Value sent in every page trailer. The firmware expects this exact number.
pub const DOT_COUNT: u32 = 1132782;

/// User name used when the job does not carry one.
pub const DEFAULT_USER: &str = "unknown";

pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Job level values of the envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    timestamp: String,
    user: String,
}

impl JobInfo {
    /// Job stamped with the current local time.
    pub fn new(user: Option<&str>) -> Self {
        JobInfo {
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            user: user.unwrap_or(DEFAULT_USER).to_string(),
        }
    }

    /// Replace the timestamp, for reproducible output.
    pub fn with_timestamp(self, time: NaiveDateTime) -> Self {
        JobInfo {
            timestamp: time.format(TIMESTAMP_FORMAT).to_string(),
            ..self
        }
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn user(&self) -> &str {
        &self.user
    }
}

/// Paper sizes known to the printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paper {
    A4,
    Letter,
    Legal,
    A5,
    A6,
    B5,
    B6,
    Monarch,
}

impl Paper {
    /// Map a CUPS page size name, case-insensitively. Unknown or missing
    /// names fall back to A4.
    pub fn from_cups_name(name: Option<&str>) -> Self {
        let name = match name {
            Some(name) => name,
            None => return Self::A4,
        };

        [
            Self::A4,
            Self::Letter,
            Self::Legal,
            Self::A5,
            Self::A6,
            Self::B5,
            Self::B6,
            Self::Monarch,
        ]
        .iter()
        .copied()
        .find(|paper| paper.cups_name().eq_ignore_ascii_case(name))
        .unwrap_or(Self::A4)
    }

    fn cups_name(&self) -> &'static str {
        match self {
            Self::A4 => "A4",
            Self::Letter => "Letter",
            Self::Legal => "Legal",
            Self::A5 => "A5",
            Self::A6 => "A6",
            Self::B5 => "B5",
            Self::B6 => "B6",
            Self::Monarch => "Monarch",
        }
    }

    pub fn pjl_name(&self) -> &'static str {
        match self {
            Self::A4 => "A4",
            Self::Letter => "LETTER",
            Self::Legal => "LEGAL",
            Self::A5 => "A5",
            Self::A6 => "A6",
            Self::B5 => "B5",
            Self::B6 => "B6",
            Self::Monarch => "MONARCH",
        }
    }
}

/// Paper input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSource {
    Tray1,
    ManualFeed,
}

impl MediaSource {
    /// `MediaPosition` 1 is the manual feed slot, anything else the tray.
    pub fn from_position(position: u32) -> Self {
        match position {
            1 => Self::ManualFeed,
            _ => Self::Tray1,
        }
    }

    pub fn pjl_name(&self) -> &'static str {
        match self {
            Self::Tray1 => "TRAY1",
            Self::ManualFeed => "MANUALFEED",
        }
    }
}

/// Page level values of the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSetup {
    pub media_source: MediaSource,
    pub paper: Paper,
    pub width: u32,
    pub height: u32,
    pub resolution: u32,
}

impl PageSetup {
    pub fn from_page(page: &PageDescriptor) -> Self {
        PageSetup {
            media_source: MediaSource::from_position(page.media_position),
            paper: Paper::from_cups_name(page.page_size_name.as_deref()),
            width: page.width,
            height: page.height,
            resolution: page.resolution,
        }
    }
}

/// Writes the PJL frames around the compressed pages.
pub struct PjlWriter<W> {
    inner: W,
}

impl<W: Write> PjlWriter<W> {
    pub fn new(inner: W) -> Self {
        PjlWriter { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn line(&mut self, args: fmt::Arguments) -> io::Result<()> {
        self.inner.write_fmt(args)?;
        self.inner.write_all(EOL)
    }

    /// Job header, written right before the first page.
    pub fn job_header(&mut self, job: &JobInfo) -> io::Result<()> {
        self.inner.write_all(UEL)?;
        self.line(format_args!("@PJL"))?;
        self.line(format_args!("@PJL SET TIMESTAMP={}", job.timestamp))?;
        self.line(format_args!("@PJL SET FILENAME=Document"))?;
        self.line(format_args!("@PJL SET COMPRESS=JBIG"))?;
        self.line(format_args!("@PJL SET USERNAME={}", job.user))?;
        self.line(format_args!("@PJL SET COVER=OFF"))?;
        self.line(format_args!("@PJL SET HOLD=OFF"))
    }

    /// One page: header, raw JBIG data, trailer.
    pub fn page(&mut self, setup: &PageSetup, payload: &[u8]) -> io::Result<()> {
        self.line(format_args!("@PJL SET PAGESTATUS=START"))?;
        self.line(format_args!("@PJL SET COPIES=1"))?;
        self.line(format_args!(
            "@PJL SET MEDIASOURCE={}",
            setup.media_source.pjl_name()
        ))?;
        self.line(format_args!("@PJL SET MEDIATYPE=PLAINRECYCLE"))?;
        self.line(format_args!("@PJL SET PAPER={}", setup.paper.pjl_name()))?;
        self.line(format_args!("@PJL SET PAPERWIDTH={}", setup.width))?;
        self.line(format_args!("@PJL SET PAPERLENGTH={}", setup.height))?;
        self.line(format_args!("@PJL SET RESOLUTION={}", setup.resolution))?;
        self.line(format_args!("@PJL SET IMAGELEN={}", payload.len()))?;

        self.inner.write_all(payload)?;

        self.line(format_args!("@PJL SET DOTCOUNT={}", DOT_COUNT))?;
        self.line(format_args!("@PJL SET PAGESTATUS=END"))
    }

    /// Job trailer. The final UEL has no line terminator.
    pub fn job_trailer(&mut self) -> io::Result<()> {
        self.line(format_args!("@PJL EOJ"))?;
        self.inner.write_all(UEL)?;
        self.inner.flush()
    }
}
