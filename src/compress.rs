//! JBIG compression of canonical bitmaps.
//!
//! The JBIG arithmetic coder itself lives outside this crate behind the
//! [`BitmapCompressor`] trait. This module owns the parameter set the printer
//! firmware insists on and collects the encoder's output into one buffer.

use log::{debug, error};
use std::{
    io::{self, Read, Write},
    path::PathBuf,
    process::{Command, Stdio},
    thread,
};

use crate::{
    bitmap::Bitmap,
    error::{EncodeError, PageError},
};

/// ORDER bit: higher resolution layers first.
pub const JBG_HITOLO: u8 = 0x08;
/// ORDER bit: sequential (all stripes of a layer, then the next layer).
pub const JBG_SEQ: u8 = 0x04;
/// OPTIONS bit: typical prediction in the lowest resolution layer.
pub const JBG_TPBON: u8 = 0x08;

/// Encoder settings for a JBIG1 bi-level image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JbigParams {
    /// Lines per stripe (`L0`).
    pub stripe_height: u32,
    /// ORDER byte of the BIH.
    pub order: u8,
    /// OPTIONS byte of the BIH.
    pub options: u8,
    /// Largest adaptive template offset (`MX`), 0 disables AT moves.
    pub max_at_offset: u32,
}

impl JbigParams {
    /// The only parameter set the SP100/SP200 firmware decodes.
    pub const RICOH: JbigParams = JbigParams {
        stripe_height: 72,
        order: JBG_HITOLO | JBG_SEQ,
        options: JBG_TPBON,
        max_at_offset: 0,
    };
}

/// A JBIG encoder.
///
/// `encode` must hand every byte it produces to `emit`, in order. It may call
/// `emit` any number of times with chunks of any size.
pub trait BitmapCompressor {
    fn encode(
        &mut self,
        bitmap: &Bitmap,
        params: &JbigParams,
        emit: &mut dyn FnMut(&[u8]),
    ) -> Result<(), EncodeError>;
}

impl<T: BitmapCompressor + ?Sized> BitmapCompressor for &mut T {
    fn encode(
        &mut self,
        bitmap: &Bitmap,
        params: &JbigParams,
        emit: &mut dyn FnMut(&[u8]),
    ) -> Result<(), EncodeError> {
        (**self).encode(bitmap, params, emit)
    }
}

/// Initial capacity of an [`OutputBuffer`].
pub const INITIAL_CAPACITY: usize = 65536;

/// Extra room added when doubling is not enough for an incoming chunk.
pub const GROWTH_SLACK: usize = 65536;

/// Growable byte buffer for encoder output.
///
/// Capacity doubles when full. If doubling still cannot hold the next chunk,
/// it grows to exactly what is needed plus [`GROWTH_SLACK`]. A failed growth
/// leaves the bytes already stored untouched.
#[derive(Debug)]
pub struct OutputBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl OutputBuffer {
    pub fn new() -> Result<Self, PageError> {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Result<Self, PageError> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|err| PageError::reserve("compressed buffer", err))?;
        Ok(OutputBuffer { data, capacity })
    }

    /// Append a chunk, growing the buffer if needed.
    pub fn append(&mut self, chunk: &[u8]) -> Result<(), PageError> {
        let len = self.data.len();
        let needed = len.checked_add(chunk.len()).ok_or(PageError::BufferGrowth {
            len,
            requested: usize::MAX,
        })?;

        if needed > self.capacity {
            let mut capacity = self.capacity.saturating_mul(2);
            if capacity < needed {
                capacity = needed.saturating_add(GROWTH_SLACK);
            }
            self.data
                .try_reserve_exact(capacity - len)
                .map_err(|_| PageError::BufferGrowth {
                    len,
                    requested: capacity,
                })?;
            debug!("compressed buffer grown {} -> {}", self.capacity, capacity);
            self.capacity = capacity;
        }

        self.data.extend_from_slice(chunk);
        Ok(())
    }

    /// Logical length, the number of bytes stored.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

/// Compress `bitmap` with the printer's fixed parameters.
///
/// The bitmap is released once the encoder is done with it. If the output
/// buffer cannot grow, the page is given up and nothing is returned.
pub fn compress<C: BitmapCompressor + ?Sized>(
    compressor: &mut C,
    bitmap: Bitmap,
) -> Result<OutputBuffer, PageError> {
    let mut buffer = OutputBuffer::new()?;
    let mut failure = None;

    compressor.encode(&bitmap, &JbigParams::RICOH, &mut |chunk| {
        if failure.is_some() {
            return;
        }
        if let Err(err) = buffer.append(chunk) {
            error!("JBIG buffer realloc failed: {}", err);
            failure = Some(err);
        }
    })?;
    drop(bitmap);

    match failure {
        Some(err) => Err(err),
        None => Ok(buffer),
    }
}

/// [`BitmapCompressor`] running the JBIG-KIT `pbmtojbg` tool.
///
/// The bitmap is fed to the tool as a binary PBM image on its standard input
/// and the BIE it writes to standard output is forwarded to `emit`.
#[derive(Debug, Clone)]
pub struct PbmToJbg {
    program: PathBuf,
}

impl PbmToJbg {
    pub const PROGRAM: &'static str = "pbmtojbg";

    /// Use `pbmtojbg` from `PATH`.
    pub fn new() -> Self {
        Self::with_program(Self::PROGRAM)
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        PbmToJbg {
            program: program.into(),
        }
    }

    /// Command line flags for `params`.
    ///
    /// `-q` single layer, `-s` stripe lines, `-o` ORDER byte, `-p` OPTIONS
    /// byte, `-m` max AT offset.
    pub fn args(params: &JbigParams) -> Vec<String> {
        vec![
            "-q".to_string(),
            "-s".to_string(),
            params.stripe_height.to_string(),
            "-o".to_string(),
            params.order.to_string(),
            "-p".to_string(),
            params.options.to_string(),
            "-m".to_string(),
            params.max_at_offset.to_string(),
        ]
    }
}

impl Default for PbmToJbg {
    fn default() -> Self {
        Self::new()
    }
}

impl BitmapCompressor for PbmToJbg {
    fn encode(
        &mut self,
        bitmap: &Bitmap,
        params: &JbigParams,
        emit: &mut dyn FnMut(&[u8]),
    ) -> Result<(), EncodeError> {
        let mut child = Command::new(&self.program)
            .args(Self::args(params))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| EncodeError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let (mut stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                child.kill().ok();
                child.wait().ok();
                return Err(EncodeError::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "encoder pipes unavailable",
                )));
            }
        };
        let pbm_header = format!("P4\n{} {}\n", bitmap.width(), bitmap.height());

        // The encoder may start writing before it has read the whole image,
        // so its input is fed from a second thread.
        let result = thread::scope(|scope| {
            let writer = scope.spawn(move || -> io::Result<()> {
                stdin.write_all(pbm_header.as_bytes())?;
                stdin.write_all(bitmap.as_bytes())?;
                Ok(())
            });

            let read_result = read_output(stdout, emit);
            if read_result.is_err() {
                // Unblocks the writer thread.
                child.kill().ok();
            }

            let write_result = writer.join().unwrap_or_else(|_| {
                Err(io::Error::new(
                    io::ErrorKind::Other,
                    "encoder input thread panicked",
                ))
            });
            read_result.and(write_result)
        });

        let status = child.wait()?;
        if !status.success() {
            return Err(EncodeError::Exit(status));
        }
        result?;
        Ok(())
    }
}

/// Forward everything `output` yields to `emit`. `output` is closed on return.
fn read_output<R: Read>(mut output: R, emit: &mut dyn FnMut(&[u8])) -> io::Result<()> {
    let mut chunk = vec![0u8; 16 * 1024];
    loop {
        match output.read(&mut chunk) {
            Ok(0) => return Ok(()),
            Ok(n) => emit(&chunk[..n]),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}
