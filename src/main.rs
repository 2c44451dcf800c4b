//! `rastertericoh` CUPS filter.
//!
//! ```text
//! rastertericoh job-id user title copies options [filename]
//! ```
//!
//! Reads CUPS raster from `filename` or standard input and writes the Ricoh
//! GDI print stream to standard output. Messages go to standard error with
//! the level prefixes the CUPS scheduler understands.

use clap::Parser;
use log::{error, info, Level};
use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::PathBuf,
    process::ExitCode,
};

use ricoh_gdi::{CupsRaster, Error, Job, JobInfo, PbmToJbg};

/// CUPS raster to Ricoh GDI (PJL + JBIG) filter
#[derive(Parser, Debug)]
#[command(name = "rastertericoh")]
#[command(version, about, long_about = None)]
// Titles and option strings such as "--help" are job data, not flags.
#[command(disable_help_flag = true, disable_version_flag = true)]
struct Cli {
    /// Job ID
    #[arg(allow_hyphen_values = true)]
    job: Option<String>,

    /// Name of the user who submitted the job
    #[arg(allow_hyphen_values = true)]
    user: Option<String>,

    /// Job title
    #[arg(allow_hyphen_values = true)]
    title: Option<String>,

    /// Number of copies
    #[arg(allow_hyphen_values = true)]
    copies: Option<String>,

    /// Job options
    #[arg(allow_hyphen_values = true)]
    options: Option<String>,

    /// Raster file to read instead of standard input
    #[arg(allow_hyphen_values = true)]
    filename: Option<PathBuf>,
}

fn main() -> ExitCode {
    init_logger();

    let cli = Cli::parse();
    info!("starting, argc={}", std::env::args().count());

    match run(&cli) {
        Ok(pages) if pages > 0 => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<usize, Error> {
    let input: Box<dyn Read> = match &cli.filename {
        Some(path) => Box::new(File::open(path).map_err(|source| Error::OpenInput {
            path: path.clone(),
            source,
        })?),
        None => Box::new(io::stdin().lock()),
    };
    let raster = CupsRaster::open(BufReader::new(input))?;

    let mut job = Job::new(JobInfo::new(cli.user.as_deref()));
    let mut output = BufWriter::new(io::stdout().lock());
    let pages = job.run(raster, PbmToJbg::new(), &mut output)?;
    output.flush()?;

    Ok(pages)
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{}: rastertericoh: {}",
                cups_prefix(record.level()),
                record.args()
            )
        })
        .init();
}

/// Message prefix CUPS uses to file a line in its error log.
fn cups_prefix(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARNING",
        Level::Info => "INFO",
        Level::Debug => "DEBUG",
        Level::Trace => "DEBUG2",
    }
}
