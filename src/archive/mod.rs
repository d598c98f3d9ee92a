//! Archive bomb detection for .zip and .rar uploads.
//!
//! Runs before any other inspection so a bomb is rejected before anything
//! reads its content. Only metadata is consulted: the ZIP central directory,
//! or the RAR block headers.
//!
//! Open and read failures are returned to the caller, which must reject the
//! upload. A RAR whose headers cannot be listed is reported as a bomb instead.

pub mod rar;
pub mod zip;

use crate::config::ArchiveLimits;
use crate::errors::{GuardError, GuardResult};
use crate::models::{ArchiveBombReport, ArchiveKind};
use std::path::Path;

/// Entry count and summed uncompressed size of an archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveTotals {
    pub entry_count: usize,
    /// Summing stops once this passes the ceiling.
    pub total_uncompressed_bytes: u64,
}

impl ArchiveTotals {
    /// Add one entry, summing its size unless the ceiling is already passed.
    pub fn add_entry(&mut self, uncompressed: u64, is_dir: bool, ceiling: u64) {
        self.entry_count += 1;
        if !is_dir && self.total_uncompressed_bytes <= ceiling {
            self.total_uncompressed_bytes = self.total_uncompressed_bytes.saturating_add(uncompressed);
        }
    }
}

/// Archive bomb detector configured with fixed limits.
#[derive(Debug, Clone, Default)]
pub struct ArchiveBombDetector {
    limits: ArchiveLimits,
}

impl ArchiveBombDetector {
    pub fn new(limits: ArchiveLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ArchiveLimits {
        &self.limits
    }

    /// Inspect the archive at `path`.
    pub fn detect_archive_bomb(&self, path: &Path, kind: ArchiveKind) -> GuardResult<ArchiveBombReport> {
        let compressed = std::fs::metadata(path)
            .map_err(|e| GuardError::io(e, Some(path.to_path_buf())))?
            .len();

        let report = match kind {
            ArchiveKind::Zip => {
                let totals = zip::zip_totals(path, self.limits.max_uncompressed_bytes)?;
                self.evaluate(kind, totals, compressed)
            }
            ArchiveKind::Rar => {
                let data = std::fs::read(path).map_err(|e| GuardError::io(e, Some(path.to_path_buf())))?;
                match rar::list_headers(&data) {
                    Ok(headers) => {
                        let totals = rar::rar_totals(&headers, self.limits.max_uncompressed_bytes);
                        self.evaluate(kind, totals, compressed)
                    }
                    Err(e) => {
                        log::warn!("RAR header listing failed for {:?}: {}", path, e);
                        ArchiveBombReport {
                            is_bomb: true,
                            error: Some(format!("corrupt or unreadable RAR: {}", e)),
                            ..self.evaluate(kind, ArchiveTotals::default(), compressed)
                        }
                    }
                }
            }
        };

        if report.is_bomb {
            log::warn!(
                "Archive bomb: {:?} ({} entries, {} bytes uncompressed, ratio {:.1})",
                path,
                report.entry_count,
                report.total_uncompressed_bytes,
                report.compression_ratio
            );
        } else {
            log::debug!("Archive {:?} within limits ({} entries)", path, report.entry_count);
        }
        Ok(report)
    }

    /// Apply the three limits to already-collected totals.
    pub fn evaluate(&self, kind: ArchiveKind, totals: ArchiveTotals, compressed: u64) -> ArchiveBombReport {
        let ratio = if compressed > 0 {
            totals.total_uncompressed_bytes as f64 / compressed as f64
        } else {
            f64::INFINITY
        };

        let is_bomb = totals.entry_count > self.limits.max_entries
            || totals.total_uncompressed_bytes > self.limits.max_uncompressed_bytes
            || ratio > self.limits.max_ratio;

        ArchiveBombReport {
            is_bomb,
            archive_type: kind,
            entry_count: totals.entry_count,
            total_uncompressed_bytes: totals.total_uncompressed_bytes,
            compressed_bytes: compressed,
            compression_ratio: ratio,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(entry_count: usize, total: u64) -> ArchiveTotals {
        ArchiveTotals {
            entry_count,
            total_uncompressed_bytes: total,
        }
    }

    #[test]
    fn test_ratio_boundary_is_inclusive() {
        let detector = ArchiveBombDetector::default();
        let report = detector.evaluate(ArchiveKind::Zip, totals(3, 5000), 100);
        assert_eq!(report.compression_ratio, 50.0);
        assert!(!report.is_bomb);

        let report = detector.evaluate(ArchiveKind::Zip, totals(3, 5001), 100);
        assert!(report.is_bomb);
    }

    #[test]
    fn test_entry_count_alone_is_a_bomb() {
        let detector = ArchiveBombDetector::default();
        let report = detector.evaluate(ArchiveKind::Rar, totals(5001, 0), 1 << 20);
        assert!(report.is_bomb);
        assert!(!detector.evaluate(ArchiveKind::Rar, totals(5000, 0), 1 << 20).is_bomb);
    }

    #[test]
    fn test_empty_file_ratio_is_infinite() {
        let report = ArchiveBombDetector::default().evaluate(ArchiveKind::Zip, totals(0, 0), 0);
        assert!(report.compression_ratio.is_infinite());
        assert!(report.is_bomb);
    }

    #[test]
    fn test_totals_stop_summing_past_ceiling() {
        let mut t = ArchiveTotals::default();
        t.add_entry(80, false, 100);
        t.add_entry(0, true, 100);
        t.add_entry(30, false, 100);
        t.add_entry(1000, false, 100);
        assert_eq!(t.entry_count, 4);
        assert_eq!(t.total_uncompressed_bytes, 110);
    }

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(bytes).unwrap();
        tmp
    }

    #[test]
    fn test_rar_ratio_bomb() {
        let tmp = write_temp(&rar::fixtures::rar5(&[(10 * 1024 * 1024, b"tiny")]));
        let report = ArchiveBombDetector::default()
            .detect_archive_bomb(tmp.path(), ArchiveKind::Rar)
            .unwrap();
        assert!(report.is_bomb);
        assert_eq!(report.entry_count, 1);
        assert!(report.compression_ratio > 50.0);
        assert!(report.error.is_none());
    }

    #[test]
    fn test_rar_within_limits() {
        let tmp = write_temp(&rar::fixtures::rar4(&[(100, 90), (50, 40)]));
        let report = ArchiveBombDetector::default()
            .detect_archive_bomb(tmp.path(), ArchiveKind::Rar)
            .unwrap();
        assert!(!report.is_bomb);
        assert_eq!(report.total_uncompressed_bytes, 150);
    }

    #[test]
    fn test_unlistable_rar_is_a_bomb() {
        let tmp = write_temp(b"Rar!\x1A\x07\x01\x00\x00\x00");
        let report = ArchiveBombDetector::default()
            .detect_archive_bomb(tmp.path(), ArchiveKind::Rar)
            .unwrap();
        assert!(report.is_bomb);
        assert!(report.error.unwrap().contains("RAR"));
    }

    #[test]
    fn test_missing_archive_propagates() {
        let err = ArchiveBombDetector::default()
            .detect_archive_bomb(Path::new("/nonexistent/a.zip"), ArchiveKind::Zip)
            .unwrap_err();
        assert!(matches!(err, GuardError::Io { .. }));
    }
}
