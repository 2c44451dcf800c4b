//! Error types for the raster to GDI conversion.
//!
//! Errors come in two tiers. [`Error`] aborts the whole job, [`PageError`]
//! abandons only the page being converted and the job moves on to the next one.

use std::{collections::TryReserveError, io, path::PathBuf, process::ExitStatus};
use thiserror::Error;

/// Fatal error type.
///
/// Any of these ends the job immediately and the filter exits with a failure
/// status.
#[derive(Error, Debug)]
pub enum Error {
    /// The input file named on the command line could not be opened.
    #[error("Cannot open input file {}", path.display())]
    OpenInput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The input is not a CUPS raster stream.
    ///
    /// Raised when the sync word at the start of the stream is missing or
    /// unknown.
    #[error("Cannot open raster stream: {0}")]
    RasterOpen(String),

    /// Writing the print stream failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Recoverable error for a single page.
///
/// The page is abandoned without writing anything for it, then the job
/// continues with the next page.
#[derive(Error, Debug)]
pub enum PageError {
    /// A page buffer could not be allocated.
    #[error("Memory allocation failed for {what}")]
    Allocation {
        what: &'static str,
        #[source]
        source: Option<TryReserveError>,
    },

    /// The compressed output buffer could not grow to hold another chunk.
    #[error("Compressed buffer growth failed at {len} bytes (requested {requested})")]
    BufferGrowth { len: usize, requested: usize },

    /// The bitmap codec failed.
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl PageError {
    pub(crate) fn allocation(what: &'static str) -> Self {
        Self::Allocation { what, source: None }
    }

    pub(crate) fn reserve(what: &'static str, source: TryReserveError) -> Self {
        Self::Allocation {
            what,
            source: Some(source),
        }
    }
}

/// Failures reported by a [`BitmapCompressor`](crate::BitmapCompressor).
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Cannot start encoder {program}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Encoder I/O error")]
    Io(#[from] io::Error),

    /// The encoder process finished with a failure status.
    #[error("Encoder exited with {0}")]
    Exit(ExitStatus),
}

/// A pixel line could not be read in full.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("short read: expected {expected} bytes, got {actual}")]
pub struct ShortRead {
    pub expected: usize,
    pub actual: usize,
}
