//! Structural validation per image format.
//!
//! Only JPEG, PNG and GIF have a grammar enforced here. Every other type is
//! valid by default. The first failing check decides the reason.

use crate::config::ScanLimits;
use crate::models::StructuralVerdict;
use crate::signatures::{
    lookup, matches_at, rfind, FileKind, GIF87A, GIF89A, GIF_TRAILER, JPEG_EOI, PNG_FULL_SIGNATURE,
    PNG_IEND, PNG_IHDR,
};

/// Minimum count of FF xx marker pairs a JPEG must contain.
const MIN_JPEG_MARKERS: usize = 3;

/// Check `buffer` against the mandatory markers of `kind`.
pub fn validate_structure(buffer: &[u8], kind: FileKind, limits: &ScanLimits) -> StructuralVerdict {
    match kind {
        FileKind::Jpeg => validate_jpeg(buffer),
        FileKind::Png => validate_png(buffer, limits.png_iend_window),
        FileKind::Gif => validate_gif(buffer),
        FileKind::Bmp
        | FileKind::Webp
        | FileKind::Pdf
        | FileKind::Zip
        | FileKind::Rar
        | FileKind::SevenZ
        | FileKind::Exe
        | FileKind::Elf
        | FileKind::Unknown => StructuralVerdict::valid(),
    }
}

/// SOI signature, at least one EOI anywhere, and enough marker bytes.
///
/// EOI is not required at the end; data past it is the trailing inspector's job.
pub fn validate_jpeg(buffer: &[u8]) -> StructuralVerdict {
    if !lookup(buffer, 0, FileKind::Jpeg) {
        return StructuralVerdict::invalid("invalid JPEG signature");
    }
    if rfind(buffer, JPEG_EOI).is_none() {
        return StructuralVerdict::invalid("JPEG has no end-of-image (EOI) marker");
    }

    let markers = buffer
        .windows(2)
        .filter(|pair| pair[0] == 0xFF && pair[1] != 0x00 && pair[1] != 0xFF)
        .take(MIN_JPEG_MARKERS)
        .count();
    if markers < MIN_JPEG_MARKERS {
        return StructuralVerdict::invalid("corrupted JPEG structure (too few markers)");
    }

    StructuralVerdict::valid()
}

/// Full signature, IHDR as the first chunk, IEND near the end.
///
/// IEND is looked up by chunk start: candidates run backward from
/// `len - 12` (a terminal 12-byte chunk) while still inside `iend_window`.
pub fn validate_png(buffer: &[u8], iend_window: usize) -> StructuralVerdict {
    if !matches_at(buffer, 0, PNG_FULL_SIGNATURE) {
        return StructuralVerdict::invalid("invalid PNG signature");
    }
    if !matches_at(buffer, 12, PNG_IHDR) {
        return StructuralVerdict::invalid("PNG is missing a valid IHDR chunk");
    }

    let has_iend = match buffer.len().checked_sub(12) {
        Some(last) => {
            let floor = (buffer.len() + 1).saturating_sub(iend_window);
            (floor..=last)
                .rev()
                .any(|start| matches_at(buffer, start + 4, PNG_IEND))
        }
        None => false,
    };
    if !has_iend {
        return StructuralVerdict::invalid("PNG is missing its IEND chunk (corrupted)");
    }

    StructuralVerdict::valid()
}

/// GIF87a/GIF89a header and the 0x3B trailer as the final byte.
pub fn validate_gif(buffer: &[u8]) -> StructuralVerdict {
    if !matches_at(buffer, 0, GIF87A) && !matches_at(buffer, 0, GIF89A) {
        return StructuralVerdict::invalid("invalid GIF signature");
    }
    if buffer.last() != Some(&GIF_TRAILER) {
        return StructuralVerdict::invalid("GIF is missing its trailer (corrupted)");
    }
    StructuralVerdict::valid()
}
