//! Uploadguard
//!
//! Security screening for user-uploaded files: real-type detection, structural
//! validation, hidden-content and steganography heuristics, and archive bomb
//! detection. Every decision fails closed.

pub mod archive;
pub mod audit;
pub mod cli;
pub mod config;
pub mod entropy;
pub mod errors;
pub mod filter;
pub mod gate;
pub mod models;
pub mod scanner;
pub mod signatures;
pub mod stego;
pub mod structure;
pub mod utils;

pub use archive::ArchiveBombDetector;
pub use audit::{AuditSink, BlockedUpload, MemoryAuditLog, SqliteAuditLog};
pub use config::{ArchiveLimits, FilterLists, GuardConfig, ScanLimits};
pub use errors::{GuardError, GuardResult};
pub use filter::QuickFilter;
pub use gate::{UploadDecision, UploadGate, UploadRequest};
pub use models::{ArchiveBombReport, ArchiveKind, DetectionHit, QuickCheck, RiskLevel, Verdict};
pub use scanner::UploadScanner;
pub use signatures::FileKind;

use std::path::Path;

/// Extension/MIME pre-filter with the default denylists.
pub fn quick_validation(mime_type: &str, filename: &str) -> QuickCheck {
    QuickFilter::default().quick_validation(mime_type, filename)
}

/// Full verdict for the file at `path` with default limits.
pub fn detect_steganography(path: &Path) -> Verdict {
    UploadScanner::default().detect_steganography(path)
}

/// Archive bomb check with default limits. `extension` is ".zip" or ".rar".
pub fn detect_archive_bomb(path: &Path, extension: &str) -> GuardResult<ArchiveBombReport> {
    let kind = ArchiveKind::from_extension(extension)
        .ok_or_else(|| GuardError::UnsupportedArchive(extension.to_string()))?;
    ArchiveBombDetector::default().detect_archive_bomb(path, kind)
}
