//! Ricoh GDI raster filter
//!
//! This crate converts CUPS raster pages into the print stream understood by
//! Ricoh SP100/SP200 family GDI printers: a PJL envelope around one JBIG1
//! compressed bitmap per page.
//!
//! # Example
//!
//! ```rust,no_run
//! use ricoh_gdi::{CupsRaster, Job, JobInfo, PbmToJbg};
//!
//! let input = std::fs::File::open("page.ras").unwrap();
//! let raster = CupsRaster::open(std::io::BufReader::new(input)).unwrap();
//! let mut job = Job::new(JobInfo::new(Some("alice")));
//! job.run(raster, PbmToJbg::new(), std::io::stdout().lock()).unwrap();
//! ```

mod bitmap;
mod compress;
mod error;
mod job;
mod pjl;
mod raster;

pub use crate::{
    bitmap::{normalize, stride_for, Bitmap, NormalizeWarning, Normalized, THRESHOLD},
    compress::{
        compress, BitmapCompressor, JbigParams, OutputBuffer, PbmToJbg, GROWTH_SLACK,
        INITIAL_CAPACITY, JBG_HITOLO, JBG_SEQ, JBG_TPBON,
    },
    error::{EncodeError, Error, PageError, ShortRead},
    job::{Job, JobState, PageOutcome},
    pjl::{
        JobInfo, MediaSource, PageSetup, Paper, PjlWriter, DEFAULT_USER, DOT_COUNT, EOL,
        TIMESTAMP_FORMAT, UEL,
    },
    raster::{ColorSpace, CupsRaster, PageDescriptor, RasterSource, Version, HEADER_SIZE},
};
