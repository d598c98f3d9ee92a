//! Scanner Module - upload verdict aggregation
//!
//! `UploadScanner` runs every detector over one file and folds the results
//! into a [`Verdict`]. Split into submodules:
//! - `embedded`: signatures of other formats inside the upload
//! - `trailing`: bytes past the end-of-data marker
//! - `chunks`: oversized ancillary PNG chunks
//! - `risk`: suspicion predicate and the details line

pub mod chunks;
pub mod embedded;
pub mod risk;
pub mod trailing;

use crate::config::ScanLimits;
use crate::entropy::{global_entropy, windowed_entropy, WindowParams};
use crate::errors::GuardResult;
use crate::models::{LsbReport, Verdict};
use crate::signatures::{detect_file_kind, FileKind};
use crate::stego::{PixelDecoder, StegoDetector};
use crate::structure::validate_structure;
use crate::utils::read_file_bytes;
use std::path::Path;
use std::sync::Arc;

/// Verdict aggregator. Holds only immutable configuration, so one instance
/// can serve concurrent requests.
#[derive(Debug, Clone)]
pub struct UploadScanner {
    limits: ScanLimits,
    stego: Option<StegoDetector>,
}

impl Default for UploadScanner {
    fn default() -> Self {
        Self::new(ScanLimits::default())
    }
}

impl UploadScanner {
    /// Scanner with the default pixel decoder when one is compiled in.
    pub fn new(limits: ScanLimits) -> Self {
        #[cfg(feature = "pixel-decoder")]
        let stego = Some(StegoDetector::with_image_crate(limits.lsb_decode_max_bytes as u64));
        #[cfg(not(feature = "pixel-decoder"))]
        let stego = None;
        Self { limits, stego }
    }

    /// Scanner using a caller-supplied pixel decoder.
    pub fn with_pixel_decoder(limits: ScanLimits, decoder: Arc<dyn PixelDecoder>) -> Self {
        Self {
            limits,
            stego: Some(StegoDetector::new(decoder)),
        }
    }

    /// Scanner that never runs LSB analysis.
    pub fn without_pixel_decoder(limits: ScanLimits) -> Self {
        Self { limits, stego: None }
    }

    pub fn limits(&self) -> &ScanLimits {
        &self.limits
    }

    pub fn has_pixel_decoder(&self) -> bool {
        self.stego.is_some()
    }

    /// Read `path` and analyse it. Never fails: unreadable files are unsafe.
    pub fn detect_steganography(&self, path: &Path) -> Verdict {
        match read_file_bytes(path) {
            Ok(bytes) => self.analyze_bytes(&bytes),
            Err(e) => {
                log::warn!("Could not read {:?}: {}", path, e);
                Verdict::failed(FileKind::Unknown, 0, e.to_string())
            }
        }
    }

    /// Analyse an in-memory upload. Never fails: errors become unsafe verdicts.
    pub fn analyze_bytes(&self, buffer: &[u8]) -> Verdict {
        let verdict = match self.try_analyze(buffer) {
            Ok(verdict) => verdict,
            Err(e) => {
                log::warn!("Analysis failed: {}", e);
                Verdict::failed(detect_file_kind(buffer), buffer.len(), e.to_string())
            }
        };
        log::info!(
            "Verdict: {} ({}, {} bytes) - {}",
            if verdict.safe { "safe" } else { "blocked" },
            verdict.detected_type,
            verdict.file_size_bytes,
            verdict.details
        );
        verdict
    }

    fn try_analyze(&self, buffer: &[u8]) -> GuardResult<Verdict> {
        let limits = &self.limits;
        let size = buffer.len();

        if size < limits.min_file_size {
            return Ok(Verdict::rejected(
                FileKind::Unknown,
                size,
                "file is too small or empty",
            ));
        }

        let kind = detect_file_kind(buffer);
        if kind == FileKind::Unknown {
            return Ok(Verdict::rejected(
                FileKind::Unknown,
                size,
                "unrecognised or corrupted file type",
            ));
        }

        let structure = validate_structure(buffer, kind, limits);
        if !structure.valid {
            let reason = structure.reason.as_deref().unwrap_or("structure check failed");
            log::debug!("{} failed structural validation: {}", kind, reason);
            return Ok(Verdict::corrupted(kind, size, reason));
        }

        let mut verdict = Verdict::rejected(kind, size, String::new());

        verdict.hidden_files = embedded::suspicious_hits(buffer, limits.embedded_scan_bytes, kind);
        verdict.trailing_data = trailing::inspect_trailing(buffer, kind, limits);

        verdict.entropy_bits = global_entropy(buffer, limits.entropy_sample_bytes);
        verdict.high_entropy =
            verdict.entropy_bits > limits.global_entropy_threshold && !kind.is_compressed_archive();

        let window = windowed_entropy(
            buffer,
            &WindowParams {
                window: limits.window_size,
                step: limits.window_step,
                threshold: limits.window_threshold,
                max_bytes: limits.window_scan_bytes,
            },
        );
        verdict.high_entropy_window = window.suspicious.then_some(window);

        if kind == FileKind::Png {
            verdict.container_anomalies = chunks::inspect_png_chunks(buffer, limits.ancillary_chunk_limit);
        }

        verdict.lsb_report = self.run_lsb(buffer, kind, &verdict)?;

        let suspicious = risk::is_suspicious(&verdict);
        verdict.safe = !suspicious;
        verdict.details = risk::build_details(&verdict, suspicious);
        Ok(verdict)
    }

    /// LSB analysis for raster images that are small or already suspicious.
    fn run_lsb(&self, buffer: &[u8], kind: FileKind, so_far: &Verdict) -> GuardResult<Option<LsbReport>> {
        let Some(stego) = &self.stego else {
            log::debug!("No pixel decoder configured, skipping LSB analysis");
            return Ok(None);
        };
        if !kind.is_raster() {
            return Ok(None);
        }
        if buffer.len() > self.limits.lsb_max_file_size && !risk::prior_suspicion(so_far) {
            log::debug!("Skipping LSB analysis for clean {}-byte {}", buffer.len(), kind);
            return Ok(None);
        }

        match stego.analyze(buffer, kind, &self.limits) {
            Ok(report) => Ok(Some(report)),
            Err(e) if e.is_decode() => {
                log::debug!("Pixel decoder could not handle {}: {}", kind, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
