//! Detector thresholds and denylists.
//!
//! Every limit the pipeline uses lives here so callers and tests can move a
//! boundary without touching detector code. Values load from JSON; missing
//! keys keep their defaults.

use crate::errors::{GuardError, GuardResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

const KIB: usize = 1024;
const MIB: usize = 1024 * 1024;

/// Limits for the archive bomb detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveLimits {
    /// More entries than this is a bomb.
    pub max_entries: usize,
    /// Summed uncompressed size above this is a bomb. Also the point where
    /// summing stops.
    pub max_uncompressed_bytes: u64,
    /// uncompressed / compressed above this is a bomb.
    pub max_ratio: f64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_entries: 5000,
            max_uncompressed_bytes: 200 * MIB as u64,
            max_ratio: 50.0,
        }
    }
}

/// Thresholds for the verdict aggregator and its detectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanLimits {
    /// Files shorter than this cannot carry a signature.
    pub min_file_size: usize,
    /// Prefix length sampled for global entropy.
    pub entropy_sample_bytes: usize,
    /// Prefix length scanned for embedded signatures.
    pub embedded_scan_bytes: usize,
    /// Bytes after a JPEG end-of-image searched for signatures.
    pub jpeg_trailing_scan_bytes: usize,
    /// Signature-free JPEG trailer larger than this is suspicious.
    pub jpeg_trailing_threshold: usize,
    /// PNG bytes after IEND larger than this is suspicious.
    pub png_trailing_threshold: usize,
    /// IEND must start within this many bytes of the end of the file.
    pub png_iend_window: usize,
    pub window_size: usize,
    pub window_step: usize,
    pub window_threshold: f64,
    /// Prefix length covered by the sliding window.
    pub window_scan_bytes: usize,
    /// Global entropy strictly above this is flagged (non-archives only).
    pub global_entropy_threshold: f64,
    /// Ancillary PNG chunks declaring more data than this are anomalies.
    pub ancillary_chunk_limit: u32,
    /// Raster images up to this size always get LSB analysis.
    pub lsb_max_file_size: usize,
    pub lsb_max_pixels: usize,
    /// Decoded images larger than this many bytes are not decoded at all.
    pub lsb_decode_max_bytes: usize,
    /// Reconstructed LSB bytes searched for signatures.
    pub lsb_signature_scan_bytes: usize,
    pub lsb_entropy_threshold: f64,
    pub archive: ArchiveLimits,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            min_file_size: 12,
            entropy_sample_bytes: 100_000,
            embedded_scan_bytes: 10 * MIB,
            jpeg_trailing_scan_bytes: MIB,
            jpeg_trailing_threshold: 10 * KIB,
            png_trailing_threshold: KIB,
            png_iend_window: 100,
            window_size: 4096,
            window_step: 1024,
            window_threshold: 7.5,
            window_scan_bytes: 20 * MIB,
            global_entropy_threshold: 8.0,
            ancillary_chunk_limit: 5 * KIB as u32,
            lsb_max_file_size: 5 * MIB,
            lsb_max_pixels: 200_000,
            lsb_decode_max_bytes: 64 * MIB,
            lsb_signature_scan_bytes: 500_000,
            lsb_entropy_threshold: 7.5,
            archive: ArchiveLimits::default(),
        }
    }
}

impl ScanLimits {
    /// Reject combinations the detectors cannot work with.
    pub fn validate(&self) -> GuardResult<()> {
        if self.window_size == 0 || self.window_step == 0 {
            return Err(GuardError::Config(
                "window_size and window_step must be non-zero".into(),
            ));
        }
        for (name, value) in [
            ("window_threshold", self.window_threshold),
            ("global_entropy_threshold", self.global_entropy_threshold),
            ("lsb_entropy_threshold", self.lsb_entropy_threshold),
        ] {
            if !(0.0..=8.0).contains(&value) {
                return Err(GuardError::Config(format!(
                    "{} must be within [0, 8], got {}",
                    name, value
                )));
            }
        }
        if self.lsb_decode_max_bytes == 0 {
            return Err(GuardError::Config("lsb_decode_max_bytes must be non-zero".into()));
        }
        if self.png_iend_window < 12 {
            return Err(GuardError::Config(
                "png_iend_window must cover at least one 12-byte chunk".into(),
            ));
        }
        if self.archive.max_ratio.is_nan() || self.archive.max_ratio < 0.0 {
            return Err(GuardError::Config("archive.max_ratio must be >= 0".into()));
        }
        Ok(())
    }
}

/// Denylists for the quick filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterLists {
    /// Lowercase, dot-prefixed extensions (".exe").
    pub dangerous_extensions: Vec<String>,
    /// Lowercase MIME essences ("application/x-sh").
    pub dangerous_mime_types: Vec<String>,
}

impl Default for FilterLists {
    fn default() -> Self {
        let extensions = [
            ".exe", ".bat", ".cmd", ".com", ".scr", ".vbs", ".js", ".jar", ".app", ".deb",
            ".rpm", ".sh", ".bash", ".elf", ".bin",
        ];
        let mime_types = [
            "application/x-msdownload",
            "application/x-executable",
            "application/x-sh",
            "application/x-bat",
            "text/x-sh",
        ];
        Self {
            dangerous_extensions: extensions.iter().map(|s| s.to_string()).collect(),
            dangerous_mime_types: mime_types.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Complete configuration as loaded from `--config`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub limits: ScanLimits,
    pub filter: FilterLists,
}

impl GuardConfig {
    /// Load overrides from a JSON file and validate them.
    pub fn from_json_file(path: &Path) -> GuardResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| GuardError::io(e, Some(path.to_path_buf())))?;
        let config = Self::from_json_str(&raw)?;
        log::debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> GuardResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.limits.validate()?;
        Ok(config)
    }
}
