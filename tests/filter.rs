use chrono::NaiveDate;
use pretty_assertions::assert_eq;

use ricoh_gdi::{
    Bitmap, BitmapCompressor, CupsRaster, EncodeError, Error, JbigParams, Job, JobInfo,
    RasterSource, HEADER_SIZE,
};

const HW_RESOLUTION: usize = 276;
const MEDIA_POSITION: usize = 324;
const CUPS_WIDTH: usize = 372;
const CUPS_HEIGHT: usize = 376;
const CUPS_BITS_PER_PIXEL: usize = 388;
const CUPS_BYTES_PER_LINE: usize = 392;
const CUPS_COLOR_SPACE: usize = 400;
const CUPS_PAGE_SIZE_NAME: usize = 1732;

struct RasterPage<'a> {
    width: u32,
    height: u32,
    bits_per_pixel: u32,
    bytes_per_line: u32,
    color_space: u32,
    page_size_name: &'a str,
    media_position: u32,
    data: Vec<u8>,
}

impl Default for RasterPage<'_> {
    fn default() -> Self {
        RasterPage {
            width: 8,
            height: 8,
            bits_per_pixel: 1,
            bytes_per_line: 1,
            color_space: 3,
            page_size_name: "A4",
            media_position: 0,
            data: vec![0u8; 8],
        }
    }
}

/// Big-endian CUPS raster v3 stream.
fn raster(pages: &[RasterPage]) -> Vec<u8> {
    let mut stream = b"RaS3".to_vec();
    for page in pages {
        let mut header = vec![0u8; HEADER_SIZE];
        let mut put = |offset: usize, value: u32| {
            header[offset..offset + 4].copy_from_slice(&value.to_be_bytes())
        };
        put(HW_RESOLUTION, 600);
        put(HW_RESOLUTION + 4, 600);
        put(MEDIA_POSITION, page.media_position);
        put(CUPS_WIDTH, page.width);
        put(CUPS_HEIGHT, page.height);
        put(CUPS_BITS_PER_PIXEL, page.bits_per_pixel);
        put(CUPS_BYTES_PER_LINE, page.bytes_per_line);
        put(CUPS_COLOR_SPACE, page.color_space);
        let name = page.page_size_name.as_bytes();
        header[CUPS_PAGE_SIZE_NAME..CUPS_PAGE_SIZE_NAME + name.len()].copy_from_slice(name);

        stream.extend(header);
        stream.extend(&page.data);
    }
    stream
}

/// Records every bitmap and emits a fake BIE in two chunks.
#[derive(Default)]
struct Recorder {
    bitmaps: Vec<Vec<u8>>,
}

impl BitmapCompressor for Recorder {
    fn encode(
        &mut self,
        bitmap: &Bitmap,
        params: &JbigParams,
        emit: &mut dyn FnMut(&[u8]),
    ) -> Result<(), EncodeError> {
        assert_eq!(*params, JbigParams::RICOH);
        self.bitmaps.push(bitmap.as_bytes().to_vec());

        let mut bih = Vec::new();
        bih.extend_from_slice(&bitmap.width().to_be_bytes());
        bih.extend_from_slice(&bitmap.height().to_be_bytes());
        emit(&bih);
        emit(bitmap.as_bytes());
        Ok(())
    }
}

fn job() -> Job {
    let time = NaiveDate::from_ymd_opt(2026, 1, 2)
        .unwrap()
        .and_hms_opt(3, 4, 5)
        .unwrap();
    Job::new(JobInfo::new(Some("tester")).with_timestamp(time))
}

fn convert(stream: &[u8]) -> (usize, Vec<u8>, Recorder) {
    let source = CupsRaster::open(stream).unwrap();
    let mut recorder = Recorder::default();
    let mut out = Vec::new();
    let pages = job().run(source, &mut recorder, &mut out).unwrap();
    (pages, out, recorder)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Payloads announced by IMAGELEN, checked against the bytes that follow.
fn payloads(out: &[u8]) -> Vec<Vec<u8>> {
    let mut found = Vec::new();
    let mut rest = out;
    while let Some(at) = find(rest, b"@PJL SET IMAGELEN=") {
        let after = &rest[at + 18..];
        let eol = find(after, b"\r\n").unwrap();
        let len: usize = std::str::from_utf8(&after[..eol]).unwrap().parse().unwrap();
        let payload = &after[eol + 2..eol + 2 + len];
        let trailer = &after[eol + 2 + len..];
        assert!(trailer.starts_with(b"@PJL SET DOTCOUNT=1132782\r\n@PJL SET PAGESTATUS=END\r\n"));
        found.push(payload.to_vec());
        rest = trailer;
    }
    found
}

#[test]
fn single_blank_page() {
    let (pages, out, recorder) = convert(&raster(&[RasterPage::default()]));

    assert_eq!(pages, 1);
    assert_eq!(recorder.bitmaps, vec![vec![0u8; 8]]);

    let payloads = payloads(&out);
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].len(), 16);
    assert!(find(&out, b"@PJL SET IMAGELEN=16\r\n").is_some());

    let mut expected = b"\x1b%-12345X@PJL\r\n\
        @PJL SET TIMESTAMP=2026/01/02 03:04:05\r\n\
        @PJL SET FILENAME=Document\r\n\
        @PJL SET COMPRESS=JBIG\r\n\
        @PJL SET USERNAME=tester\r\n\
        @PJL SET COVER=OFF\r\n\
        @PJL SET HOLD=OFF\r\n\
        @PJL SET PAGESTATUS=START\r\n\
        @PJL SET COPIES=1\r\n\
        @PJL SET MEDIASOURCE=TRAY1\r\n\
        @PJL SET MEDIATYPE=PLAINRECYCLE\r\n\
        @PJL SET PAPER=A4\r\n\
        @PJL SET PAPERWIDTH=8\r\n\
        @PJL SET PAPERLENGTH=8\r\n\
        @PJL SET RESOLUTION=600\r\n\
        @PJL SET IMAGELEN=16\r\n"
        .to_vec();
    expected.extend_from_slice(&[0, 0, 0, 8, 0, 0, 0, 8]);
    expected.extend_from_slice(&[0u8; 8]);
    expected.extend_from_slice(
        b"@PJL SET DOTCOUNT=1132782\r\n\
        @PJL SET PAGESTATUS=END\r\n\
        @PJL EOJ\r\n\
        \x1b%-12345X",
    );
    assert_eq!(out, expected);
}

#[test]
fn zero_pages_writes_nothing() {
    let (pages, out, _) = convert(&raster(&[]));

    assert_eq!(pages, 0);
    assert!(out.is_empty());
}

#[test]
fn zero_height_page_is_skipped() {
    let (pages, out, recorder) = convert(&raster(&[RasterPage {
        height: 0,
        data: vec![],
        ..Default::default()
    }]));

    assert_eq!(pages, 0);
    assert!(out.is_empty());
    assert!(recorder.bitmaps.is_empty());
}

#[test]
fn manual_feed_media_position() {
    let (pages, out, _) = convert(&raster(&[
        RasterPage {
            media_position: 1,
            ..Default::default()
        },
        RasterPage {
            media_position: 2,
            page_size_name: "letter",
            ..Default::default()
        },
    ]));

    assert_eq!(pages, 2);
    let manual = find(&out, b"@PJL SET MEDIASOURCE=MANUALFEED\r\n").unwrap();
    let tray = find(&out, b"@PJL SET MEDIASOURCE=TRAY1\r\n").unwrap();
    assert!(manual < tray);
    assert!(find(&out, b"@PJL SET PAPER=LETTER\r\n").unwrap() > tray);
}

#[test]
fn grayscale_pages_are_thresholded() {
    let (pages, _, recorder) = convert(&raster(&[
        RasterPage {
            width: 8,
            height: 1,
            bits_per_pixel: 8,
            bytes_per_line: 8,
            color_space: 3,
            data: vec![0, 127, 128, 255, 0, 0, 0, 200],
            ..Default::default()
        },
        RasterPage {
            width: 8,
            height: 1,
            bits_per_pixel: 8,
            bytes_per_line: 8,
            color_space: 0,
            data: vec![0, 127, 128, 255, 0, 0, 0, 200],
            ..Default::default()
        },
    ]));

    assert_eq!(pages, 2);
    assert_eq!(recorder.bitmaps, vec![vec![0b0011_0001], vec![0b1100_1110]]);
}

#[test]
fn imagelen_matches_every_payload() {
    let mut data = vec![0u8; 300 * 40];
    data.iter_mut().enumerate().for_each(|(i, b)| *b = (i * 7) as u8);
    let (pages, out, recorder) = convert(&raster(&[
        RasterPage {
            width: 2400,
            height: 40,
            bytes_per_line: 300,
            data,
            ..Default::default()
        },
        RasterPage::default(),
    ]));

    assert_eq!(pages, 2);
    let payloads = payloads(&out);
    assert_eq!(payloads.len(), 2);
    for (payload, bitmap) in payloads.iter().zip(&recorder.bitmaps) {
        assert_eq!(&payload[8..], &bitmap[..]);
    }
}

#[test]
fn pjl_lines_end_with_crlf() {
    let (_, out, _) = convert(&raster(&[RasterPage::default(), RasterPage::default()]));

    // Blank payloads contain no "@PJL", so every occurrence starts a PJL line.
    let mut rest = &out[..];
    let mut lines = 0;
    while let Some(at) = find(rest, b"@PJL") {
        let eol = find(&rest[at..], b"\r\n").unwrap();
        let line = &rest[at..at + eol];
        assert!(!line.contains(&b'\n') && !line.contains(&b'\r'));
        lines += 1;
        rest = &rest[at + eol + 2..];
    }
    assert_eq!(lines, 7 + 2 * 11 + 1);
    assert_eq!(rest, b"\x1b%-12345X");
}

#[test]
fn output_is_deterministic() {
    let stream = raster(&[
        RasterPage::default(),
        RasterPage {
            media_position: 1,
            data: vec![0xAA; 8],
            ..Default::default()
        },
    ]);

    let (_, first, _) = convert(&stream);
    let (_, second, _) = convert(&stream);
    assert_eq!(first, second);
}

// Truncated pages are printed with a blank remainder. Whether the printer
// shows an artifact for them has not been verified.
#[test]
fn truncated_page_is_still_emitted() {
    let (pages, out, recorder) = convert(&raster(&[RasterPage {
        data: vec![0xFF; 3],
        ..Default::default()
    }]));

    assert_eq!(pages, 1);
    assert_eq!(
        recorder.bitmaps,
        vec![vec![0xFF, 0xFF, 0xFF, 0, 0, 0, 0, 0]]
    );
    assert!(out.ends_with(b"@PJL EOJ\r\n\x1b%-12345X"));
}

#[test]
fn raster_source_reports_end_of_stream() {
    let stream = raster(&[RasterPage::default()]);
    let mut source = CupsRaster::open(&stream[..]).unwrap();

    assert!(source.next_page().is_some());
    assert!(source.next_page().is_none());
}

#[test]
fn garbage_input_is_fatal() {
    let result = CupsRaster::open(&b"%PDF-1.7\n"[..]);
    assert!(matches!(result, Err(Error::RasterOpen(_))));
}
