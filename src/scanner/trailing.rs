//! Data appended after a format's logical end.

use crate::config::ScanLimits;
use crate::models::TrailingDataReport;
use crate::signatures::{matches_at, rfind, FileKind, SignatureScan, EMBEDDED_KINDS, JPEG_EOI, PNG_IEND};

/// Inspect bytes past the end-of-data marker. `None` for formats without one.
pub fn inspect_trailing(buffer: &[u8], kind: FileKind, limits: &ScanLimits) -> Option<TrailingDataReport> {
    match kind {
        FileKind::Jpeg => Some(jpeg_trailing(buffer, limits)),
        FileKind::Png => Some(png_trailing(buffer, limits)),
        FileKind::Gif
        | FileKind::Bmp
        | FileKind::Webp
        | FileKind::Pdf
        | FileKind::Zip
        | FileKind::Rar
        | FileKind::SevenZ
        | FileKind::Exe
        | FileKind::Elf
        | FileKind::Unknown => None,
    }
}

fn clean(trailing_byte_count: usize) -> TrailingDataReport {
    TrailingDataReport {
        suspicious: false,
        trailing_byte_count,
        message: "no significant trailing data".to_string(),
    }
}

fn flagged(trailing_byte_count: usize, message: &str) -> TrailingDataReport {
    TrailingDataReport {
        suspicious: true,
        trailing_byte_count,
        message: message.to_string(),
    }
}

/// After the last EOI: any catalog signature in the first MiB is suspicious,
/// and so is a large signature-free trailer.
fn jpeg_trailing(buffer: &[u8], limits: &ScanLimits) -> TrailingDataReport {
    let Some(eoi) = rfind(buffer, JPEG_EOI) else {
        return clean(0);
    };
    let data_start = eoi + JPEG_EOI.len();
    let trailing = buffer.len() - data_start;
    if trailing == 0 {
        return clean(0);
    }

    let scan_end = data_start + trailing.min(limits.jpeg_trailing_scan_bytes);
    if let Some(hit) = SignatureScan::new(buffer, &EMBEDDED_KINDS, data_start, scan_end).next() {
        log::trace!("{} signature {} bytes past JPEG EOI", hit.format, hit.byte_offset - data_start);
        let message = match hit.format {
            FileKind::Exe | FileKind::Elf => "executable embedded after JPEG end-of-image",
            FileKind::Pdf => "PDF found after JPEG end-of-image (possible hidden file)",
            _ => "suspicious data appended after JPEG end-of-image (possible embedded archive)",
        };
        return flagged(trailing, message);
    }

    if trailing > limits.jpeg_trailing_threshold {
        return flagged(trailing, "significant extra data after JPEG end-of-image");
    }
    clean(trailing)
}

/// After the last IEND chunk (12 bytes from its start).
fn png_trailing(buffer: &[u8], limits: &ScanLimits) -> TrailingDataReport {
    let last_iend = buffer.len().checked_sub(12).and_then(|last| {
        (8..=last)
            .rev()
            .find(|&start| matches_at(buffer, start + 4, PNG_IEND))
    });
    let Some(iend) = last_iend else {
        return clean(0);
    };

    let trailing = buffer.len() - iend - 12;
    if trailing > limits.png_trailing_threshold {
        return flagged(trailing, "suspicious data after PNG end chunk");
    }
    clean(trailing)
}
