//! Report types produced by the inspection pipeline.
//!
//! Everything here is built fresh per request and never mutated afterwards.
//! Only [`Verdict`] and [`ArchiveBombReport`] leave the crate as decisions;
//! the rest are evidence attached to them.

use crate::signatures::FileKind;
use serde::{Deserialize, Serialize};

/// Severity of a signature found where it should not be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
            RiskLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A catalog signature found at some offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionHit {
    pub format: FileKind,
    pub byte_offset: usize,
    pub risk_level: RiskLevel,
}

/// Outcome of a per-format structural check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralVerdict {
    pub valid: bool,
    pub reason: Option<String>,
}

impl StructuralVerdict {
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Bytes found past a format's end-of-data marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingDataReport {
    pub suspicious: bool,
    pub trailing_byte_count: usize,
    pub message: String,
}

/// Sliding-window entropy result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntropyWindowReport {
    pub suspicious: bool,
    /// Start of the first window over the threshold; 0 when not suspicious.
    pub offset: usize,
    /// Entropy of that window, or the highest window seen when not suspicious.
    pub entropy_bits: f64,
}

/// Oversized ancillary chunk in a PNG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkAnomaly {
    pub chunk_type: String,
    pub length: u32,
    pub offset: usize,
}

/// Result of least-significant-bit plane analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LsbReport {
    pub suspicious: bool,
    pub entropy_bits: f64,
    pub signatures_found: Vec<DetectionHit>,
    pub reason: Option<String>,
}

/// Archive container handled by the bomb detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
    Zip,
    Rar,
}

impl ArchiveKind {
    /// Map an extension (".zip", "RAR") to an archive kind.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "zip" => Some(ArchiveKind::Zip),
            "rar" => Some(ArchiveKind::Rar),
            _ => None,
        }
    }
}

impl std::fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveKind::Zip => write!(f, "zip"),
            ArchiveKind::Rar => write!(f, "rar"),
        }
    }
}

/// Archive metadata and the bomb decision derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveBombReport {
    pub is_bomb: bool,
    pub archive_type: ArchiveKind,
    pub entry_count: usize,
    pub total_uncompressed_bytes: u64,
    pub compressed_bytes: u64,
    /// Infinite when the archive file is empty.
    pub compression_ratio: f64,
    /// Set when the archive was judged a bomb because it could not be listed.
    pub error: Option<String>,
}

/// Aggregate decision for one uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub safe: bool,
    pub detected_type: FileKind,
    /// Failed a structural check; no further detectors ran.
    pub corrupted: bool,
    pub entropy_bits: f64,
    pub hidden_files: Vec<DetectionHit>,
    pub trailing_data: Option<TrailingDataReport>,
    pub high_entropy: bool,
    pub high_entropy_window: Option<EntropyWindowReport>,
    pub container_anomalies: Vec<ChunkAnomaly>,
    pub lsb_report: Option<LsbReport>,
    pub file_size_bytes: usize,
    /// Analysis error that forced this verdict, if any.
    pub error: Option<String>,
    pub details: String,
}

impl Verdict {
    /// Unsafe verdict with no evidence beyond `details`.
    pub fn rejected(detected_type: FileKind, file_size_bytes: usize, details: impl Into<String>) -> Self {
        Self {
            safe: false,
            detected_type,
            corrupted: false,
            entropy_bits: 0.0,
            hidden_files: Vec::new(),
            trailing_data: None,
            high_entropy: false,
            high_entropy_window: None,
            container_anomalies: Vec::new(),
            lsb_report: None,
            file_size_bytes,
            error: None,
            details: details.into(),
        }
    }

    /// Unsafe verdict for a file that failed its structural check.
    pub fn corrupted(detected_type: FileKind, file_size_bytes: usize, reason: &str) -> Self {
        Self {
            corrupted: true,
            ..Self::rejected(
                detected_type,
                file_size_bytes,
                format!("corrupted file: {}", reason),
            )
        }
    }

    /// Unsafe verdict for a file that could not be analysed.
    pub fn failed(detected_type: FileKind, file_size_bytes: usize, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::rejected(detected_type, file_size_bytes, "error while analysing the file")
        }
    }
}

/// Outcome of the extension/MIME pre-filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickCheck {
    pub safe: bool,
    pub reason: Option<String>,
}

impl QuickCheck {
    pub fn pass() -> Self {
        Self {
            safe: true,
            reason: None,
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            safe: false,
            reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_kind_from_extension() {
        assert_eq!(ArchiveKind::from_extension(".zip"), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::from_extension("RAR"), Some(ArchiveKind::Rar));
        assert_eq!(ArchiveKind::from_extension(".7z"), None);
    }

    #[test]
    fn test_verdict_serializes_labels() {
        let mut verdict = Verdict::rejected(FileKind::SevenZ, 40, "x");
        verdict.hidden_files.push(DetectionHit {
            format: FileKind::Exe,
            byte_offset: 0,
            risk_level: RiskLevel::Critical,
        });
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["detected_type"], "7Z");
        assert_eq!(json["hidden_files"][0]["format"], "EXE");
        assert_eq!(json["hidden_files"][0]["risk_level"], "CRITICAL");
    }

    #[test]
    fn test_corrupted_constructor() {
        let v = Verdict::corrupted(FileKind::Gif, 20, "missing trailer");
        assert!(!v.safe);
        assert!(v.corrupted);
        assert!(v.details.contains("missing trailer"));
    }
}
