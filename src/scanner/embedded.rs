//! Embedded-content scan: secondary file signatures anywhere in the upload.

use crate::models::{DetectionHit, RiskLevel};
use crate::signatures::{FileKind, SignatureScan, EMBEDDED_KINDS};

/// Raw signature presence over the first `limit` bytes.
///
/// Executables are reported at any offset, offset 0 included. The scan knows
/// nothing about the file's own type.
pub fn scan_hidden_files(buffer: &[u8], limit: usize) -> SignatureScan<'_> {
    SignatureScan::prefix(buffer, &EMBEDDED_KINDS, limit)
}

/// Drop the hit a container makes for its own header at offset 0.
pub fn is_own_header(hit: &DetectionHit, detected: FileKind) -> bool {
    hit.byte_offset == 0 && hit.format == detected
}

/// Hits that count against the file, in offset order.
pub fn suspicious_hits(buffer: &[u8], limit: usize, detected: FileKind) -> Vec<DetectionHit> {
    scan_hidden_files(buffer, limit)
        .filter(|hit| !is_own_header(hit, detected))
        .collect()
}

/// Whether any hit is severe enough to block on its own.
pub fn has_blocking_hit(hits: &[DetectionHit]) -> bool {
    hits.iter().any(|h| h.risk_level >= RiskLevel::High)
}
