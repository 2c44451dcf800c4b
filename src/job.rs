//! Page loop of the filter.

use log::{debug, error, info, warn};
use std::io::Write;

use crate::{
    bitmap,
    compress::{self, BitmapCompressor},
    error::{Error, PageError},
    pjl::{JobInfo, PageSetup, PjlWriter},
    raster::{PageDescriptor, RasterSource},
};

/// Where the job currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Reading pages from the raster source.
    AwaitingPage,
    /// The source is exhausted and the trailer, if any, is written.
    JobComplete,
}

/// What happened to one page.
#[derive(Debug)]
pub enum PageOutcome {
    Emitted,
    /// No lines or no bytes per line, nothing to print.
    Empty,
    Abandoned(PageError),
}

/// One print job: every page of one raster stream.
///
/// # Example
///
/// ```rust,no_run
/// use ricoh_gdi::{CupsRaster, Job, JobInfo, PbmToJbg};
///
/// let raster = CupsRaster::open(std::io::stdin().lock()).unwrap();
/// let mut job = Job::new(JobInfo::new(Some("alice")));
/// let pages = job.run(raster, PbmToJbg::new(), std::io::stdout().lock()).unwrap();
/// std::process::exit(if pages > 0 { 0 } else { 1 });
/// ```
#[derive(Debug)]
pub struct Job {
    info: JobInfo,
    pages: usize,
    skipped: usize,
    state: JobState,
}

impl Job {
    pub fn new(info: JobInfo) -> Self {
        Job {
            info,
            pages: 0,
            skipped: 0,
            state: JobState::AwaitingPage,
        }
    }

    /// Pages written so far.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Pages left out, either empty or abandoned.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Convert every page of `source` and write the print stream to `output`.
    ///
    /// Returns the number of pages written. Pages that fail are logged and
    /// left out; only a failure to write `output` stops the job.
    pub fn run<S, C, W>(
        &mut self,
        mut source: S,
        mut compressor: C,
        output: W,
    ) -> Result<usize, Error>
    where
        S: RasterSource,
        C: BitmapCompressor,
        W: Write,
    {
        let mut pjl = PjlWriter::new(output);

        self.state = JobState::AwaitingPage;
        while let Some(page) = source.next_page() {
            match self.process_page(&page, &mut source, &mut compressor, &mut pjl)? {
                PageOutcome::Emitted => self.pages += 1,
                PageOutcome::Empty => {
                    warn!("empty page, skipping");
                    self.skipped += 1;
                }
                PageOutcome::Abandoned(err) => {
                    error!("failed to convert page {}: {}", self.pages + 1, err);
                    self.skipped += 1;
                }
            }
        }

        if self.pages > 0 {
            pjl.job_trailer()?;
            info!(
                "job complete, {} page(s), {} skipped",
                self.pages, self.skipped
            );
        } else {
            warn!("no pages processed");
        }
        self.state = JobState::JobComplete;

        Ok(self.pages)
    }

    fn process_page<S, C, W>(
        &self,
        page: &PageDescriptor,
        source: &mut S,
        compressor: &mut C,
        pjl: &mut PjlWriter<W>,
    ) -> Result<PageOutcome, Error>
    where
        S: RasterSource,
        C: BitmapCompressor,
        W: Write,
    {
        if page.is_empty() {
            return Ok(PageOutcome::Empty);
        }

        let number = self.pages + 1;
        info!(
            "page {}: {}x{}, {} bpp, {} bpl, colorspace={}",
            number,
            page.width,
            page.height,
            page.bits_per_pixel,
            page.bytes_per_line,
            page.color_space.code()
        );

        let normalized = match bitmap::normalize(page, source) {
            Ok(normalized) => normalized,
            Err(err) => return Ok(PageOutcome::Abandoned(err)),
        };
        if !normalized.warnings.is_empty() {
            debug!("page {}: {:?}", number, normalized.warnings);
        }

        let raw_size = normalized.bitmap.as_bytes().len();
        let payload = match compress::compress(compressor, normalized.bitmap) {
            Ok(payload) => payload,
            Err(err) => return Ok(PageOutcome::Abandoned(err)),
        };
        info!(
            "page {}: JBIG compressed {} -> {} bytes",
            number,
            raw_size,
            payload.len()
        );

        if self.pages == 0 {
            debug!("writing job header");
            pjl.job_header(&self.info)?;
        }
        pjl.page(&PageSetup::from_page(page), payload.as_bytes())?;

        Ok(PageOutcome::Emitted)
    }
}
