//! Signature catalog: magic bytes per format and exact-match lookup.
//!
//! The catalog is a fixed table. Matching is always exact at a given offset;
//! adding a format means adding a row, never changing how rows match.

use crate::models::{DetectionHit, RiskLevel};
use serde::{Deserialize, Serialize};

/// Formats the pipeline can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    #[serde(rename = "JPEG")]
    Jpeg,
    #[serde(rename = "PNG")]
    Png,
    #[serde(rename = "GIF")]
    Gif,
    #[serde(rename = "BMP")]
    Bmp,
    #[serde(rename = "WEBP")]
    Webp,
    #[serde(rename = "PDF")]
    Pdf,
    #[serde(rename = "ZIP")]
    Zip,
    #[serde(rename = "RAR")]
    Rar,
    #[serde(rename = "7Z")]
    SevenZ,
    #[serde(rename = "EXE")]
    Exe,
    #[serde(rename = "ELF")]
    Elf,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

/// Container formats tried at offset 0, in priority order.
pub const CONTAINER_PRIORITY: [FileKind; 11] = [
    FileKind::Jpeg,
    FileKind::Png,
    FileKind::Gif,
    FileKind::Bmp,
    FileKind::Webp,
    FileKind::Pdf,
    FileKind::Zip,
    FileKind::Rar,
    FileKind::SevenZ,
    FileKind::Exe,
    FileKind::Elf,
];

/// Formats the embedded-content scanner and JPEG trailer check look for.
pub const EMBEDDED_KINDS: [FileKind; 6] = [
    FileKind::Zip,
    FileKind::Rar,
    FileKind::SevenZ,
    FileKind::Exe,
    FileKind::Elf,
    FileKind::Pdf,
];

/// Formats searched for in a reconstructed LSB stream.
pub const LSB_KINDS: [FileKind; 5] = [
    FileKind::Zip,
    FileKind::Rar,
    FileKind::SevenZ,
    FileKind::Exe,
    FileKind::Pdf,
];

pub const PNG_FULL_SIGNATURE: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
pub const PNG_IHDR: &[u8] = b"IHDR";
pub const PNG_IEND: &[u8] = b"IEND";
pub const GIF87A: &[u8] = b"GIF87a";
pub const GIF89A: &[u8] = b"GIF89a";
pub const GIF_TRAILER: u8 = 0x3B;
pub const JPEG_EOI: &[u8] = &[0xFF, 0xD9];

impl FileKind {
    /// Magic bytes identifying this format at offset 0.
    pub fn signature(self) -> Option<&'static [u8]> {
        match self {
            FileKind::Jpeg => Some(&[0xFF, 0xD8, 0xFF]),
            FileKind::Png => Some(&[0x89, 0x50, 0x4E, 0x47]),
            FileKind::Gif => Some(&[0x47, 0x49, 0x46, 0x38]),
            FileKind::Bmp => Some(&[0x42, 0x4D]),
            // RIFF container header
            FileKind::Webp => Some(&[0x52, 0x49, 0x46, 0x46]),
            FileKind::Pdf => Some(&[0x25, 0x50, 0x44, 0x46]),
            FileKind::Zip => Some(&[0x50, 0x4B, 0x03, 0x04]),
            FileKind::Rar => Some(&[0x52, 0x61, 0x72, 0x21]),
            FileKind::SevenZ => Some(&[0x37, 0x7A, 0xBC, 0xAF]),
            FileKind::Exe => Some(&[0x4D, 0x5A]),
            FileKind::Elf => Some(&[0x7F, 0x45, 0x4C, 0x46]),
            FileKind::Unknown => None,
        }
    }

    /// Short label used in reports ("JPEG", "7Z").
    pub fn label(self) -> &'static str {
        match self {
            FileKind::Jpeg => "JPEG",
            FileKind::Png => "PNG",
            FileKind::Gif => "GIF",
            FileKind::Bmp => "BMP",
            FileKind::Webp => "WEBP",
            FileKind::Pdf => "PDF",
            FileKind::Zip => "ZIP",
            FileKind::Rar => "RAR",
            FileKind::SevenZ => "7Z",
            FileKind::Exe => "EXE",
            FileKind::Elf => "ELF",
            FileKind::Unknown => "UNKNOWN",
        }
    }

    /// Raster formats a pixel decoder can open.
    pub fn is_raster(self) -> bool {
        matches!(
            self,
            FileKind::Jpeg | FileKind::Png | FileKind::Gif | FileKind::Bmp | FileKind::Webp
        )
    }

    /// Archives are expected to look random.
    pub fn is_compressed_archive(self) -> bool {
        matches!(self, FileKind::Zip | FileKind::Rar)
    }

    /// Risk assigned when this format shows up inside another file.
    pub fn embedded_risk(self) -> RiskLevel {
        match self {
            FileKind::Exe | FileKind::Elf => RiskLevel::Critical,
            FileKind::Zip | FileKind::Rar | FileKind::SevenZ => RiskLevel::High,
            FileKind::Pdf => RiskLevel::Medium,
            FileKind::Jpeg
            | FileKind::Png
            | FileKind::Gif
            | FileKind::Bmp
            | FileKind::Webp
            | FileKind::Unknown => RiskLevel::Low,
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Exact byte match of `pattern` starting at `offset`. Out-of-range is a miss.
#[inline]
pub fn matches_at(buffer: &[u8], offset: usize, pattern: &[u8]) -> bool {
    match offset.checked_add(pattern.len()) {
        Some(end) if end <= buffer.len() => &buffer[offset..end] == pattern,
        _ => false,
    }
}

/// Catalog lookup: does `kind`'s signature start at `offset`?
#[inline]
pub fn lookup(buffer: &[u8], offset: usize, kind: FileKind) -> bool {
    kind.signature()
        .map(|sig| matches_at(buffer, offset, sig))
        .unwrap_or(false)
}

/// Real type by content, first match in [`CONTAINER_PRIORITY`].
pub fn detect_file_kind(buffer: &[u8]) -> FileKind {
    CONTAINER_PRIORITY
        .iter()
        .copied()
        .find(|&kind| lookup(buffer, 0, kind))
        .unwrap_or(FileKind::Unknown)
}

/// Offset of the last occurrence of `pattern`, scanning backward.
pub fn rfind(buffer: &[u8], pattern: &[u8]) -> Option<usize> {
    if pattern.is_empty() || buffer.len() < pattern.len() {
        return None;
    }
    (0..=buffer.len() - pattern.len())
        .rev()
        .find(|&i| matches_at(buffer, i, pattern))
}

/// Lazy scan for catalog signatures inside `buffer[start..end]`.
///
/// Hits come out in offset order, then in `kinds` order at the same offset. A
/// signature only matches if it fits entirely before `end`. The scan is `Clone`,
/// so a caller can restart it or take only the first hit.
#[derive(Debug, Clone)]
pub struct SignatureScan<'a> {
    buffer: &'a [u8],
    kinds: &'static [FileKind],
    end: usize,
    pos: usize,
    kind_idx: usize,
}

impl<'a> SignatureScan<'a> {
    pub fn new(buffer: &'a [u8], kinds: &'static [FileKind], start: usize, end: usize) -> Self {
        let end = end.min(buffer.len());
        Self {
            buffer,
            kinds,
            end,
            pos: start.min(end),
            kind_idx: 0,
        }
    }

    /// Scan the first `limit` bytes.
    pub fn prefix(buffer: &'a [u8], kinds: &'static [FileKind], limit: usize) -> Self {
        Self::new(buffer, kinds, 0, limit)
    }
}

impl Iterator for SignatureScan<'_> {
    type Item = DetectionHit;

    fn next(&mut self) -> Option<DetectionHit> {
        let buffer = self.buffer;
        let window = &buffer[..self.end];
        while self.pos < self.end {
            while self.kind_idx < self.kinds.len() {
                let kind = self.kinds[self.kind_idx];
                self.kind_idx += 1;
                if lookup(window, self.pos, kind) {
                    return Some(DetectionHit {
                        format: kind,
                        byte_offset: self.pos,
                        risk_level: kind.embedded_risk(),
                    });
                }
            }
            self.kind_idx = 0;
            self.pos += 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_known_headers() {
        assert_eq!(detect_file_kind(b"%PDF-1.7\n%\xE2\xE3"), FileKind::Pdf);
        assert_eq!(detect_file_kind(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0]), FileKind::Jpeg);
        assert_eq!(detect_file_kind(b"Rar!\x1A\x07\x01\x00"), FileKind::Rar);
        assert_eq!(detect_file_kind(b"\x7FELF\x02\x01\x01"), FileKind::Elf);
        assert_eq!(detect_file_kind(b"GIF89a\x01\x00"), FileKind::Gif);
        assert_eq!(detect_file_kind(&[0x12, 0x34, 0x56, 0x78]), FileKind::Unknown);
    }

    #[test]
    fn test_priority_order_wins() {
        // RIFF header is checked before anything later in the table.
        assert_eq!(detect_file_kind(b"RIFF\x00\x00\x00\x00WEBPVP8 "), FileKind::Webp);
        assert_eq!(detect_file_kind(b"MZ\x90\x00"), FileKind::Exe);
    }

    #[test]
    fn test_lookup_is_exact_and_bounds_checked() {
        let buf = b"xxPK\x03\x04";
        assert!(lookup(buf, 2, FileKind::Zip));
        assert!(!lookup(buf, 1, FileKind::Zip));
        assert!(!lookup(buf, 4, FileKind::Zip));
        assert!(!lookup(buf, usize::MAX, FileKind::Zip));
        assert!(!lookup(buf, 0, FileKind::Unknown));
    }

    #[test]
    fn test_rfind_returns_last() {
        let buf = [0xFF, 0xD9, 0x00, 0xFF, 0xD9, 0x01];
        assert_eq!(rfind(&buf, JPEG_EOI), Some(3));
        assert_eq!(rfind(&buf[..2], JPEG_EOI), Some(0));
        assert_eq!(rfind(&buf[..1], JPEG_EOI), None);
    }

    #[test]
    fn test_scan_orders_hits_and_restarts() {
        let mut buf = vec![0u8; 64];
        buf[10..14].copy_from_slice(b"PK\x03\x04");
        buf[30..32].copy_from_slice(b"MZ");
        buf[40..44].copy_from_slice(b"%PDF");

        let scan = SignatureScan::prefix(&buf, &EMBEDDED_KINDS, buf.len());
        let hits: Vec<_> = scan.clone().map(|h| (h.format, h.byte_offset)).collect();
        assert_eq!(
            hits,
            vec![(FileKind::Zip, 10), (FileKind::Exe, 30), (FileKind::Pdf, 40)]
        );
        // Restarting from the clone yields the same first hit.
        assert_eq!(scan.clone().next().map(|h| h.byte_offset), Some(10));
    }

    #[test]
    fn test_scan_respects_window_end() {
        let mut buf = vec![0u8; 16];
        buf[12..16].copy_from_slice(b"PK\x03\x04");
        assert_eq!(SignatureScan::prefix(&buf, &EMBEDDED_KINDS, 14).count(), 0);
        assert_eq!(SignatureScan::new(&buf, &EMBEDDED_KINDS, 12, 16).count(), 1);
    }
}
