//! Upload admission: the decision an upload handler makes for one temp file.
//!
//! Order: quick filter, archive bomb check for .zip/.rar, full verdict.
//! Every rejection deletes the temp file and is written to the audit sink.
//! Archive inspection failures reject the upload.

use crate::archive::ArchiveBombDetector;
use crate::audit::{AuditSink, BlockedUpload};
use crate::config::GuardConfig;
use crate::errors::GuardResult;
use crate::filter::QuickFilter;
use crate::models::{ArchiveBombReport, ArchiveKind, Verdict};
use crate::scanner::UploadScanner;
use crate::signatures::FileKind;
use crate::utils::{final_extension, read_file_bytes, sha256_hex};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub const STATUS_ACCEPTED: u16 = 200;
pub const STATUS_FORBIDDEN: u16 = 403;

/// One uploaded file waiting for a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Temporary location of the uploaded bytes.
    pub path: PathBuf,
    /// Name the client gave the file.
    pub original_name: String,
    /// MIME type the client declared.
    pub mime_type: String,
    pub room: Option<String>,
}

/// What the handler should answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadDecision {
    pub accepted: bool,
    pub status_code: u16,
    pub reason: Option<String>,
    pub details: Option<String>,
    pub verdict: Option<Verdict>,
    pub archive_report: Option<ArchiveBombReport>,
}

impl UploadDecision {
    fn accept(verdict: Verdict, archive_report: Option<ArchiveBombReport>) -> Self {
        Self {
            accepted: true,
            status_code: STATUS_ACCEPTED,
            reason: None,
            details: Some(verdict.details.clone()),
            verdict: Some(verdict),
            archive_report,
        }
    }

    fn reject(reason: impl Into<String>, details: Option<String>) -> Self {
        Self {
            accepted: false,
            status_code: STATUS_FORBIDDEN,
            reason: Some(reason.into()),
            details,
            verdict: None,
            archive_report: None,
        }
    }
}

/// Upload gate shared across request handlers.
#[derive(Clone)]
pub struct UploadGate {
    filter: Arc<QuickFilter>,
    bombs: Arc<ArchiveBombDetector>,
    scanner: Arc<UploadScanner>,
    audit: Option<Arc<dyn AuditSink>>,
    delete_rejected: bool,
}

impl UploadGate {
    pub fn new(filter: QuickFilter, bombs: ArchiveBombDetector, scanner: UploadScanner) -> Self {
        Self {
            filter: Arc::new(filter),
            bombs: Arc::new(bombs),
            scanner: Arc::new(scanner),
            audit: None,
            delete_rejected: true,
        }
    }

    /// Gate built from configuration with the default pixel decoder.
    pub fn from_config(config: &GuardConfig) -> Self {
        Self::new(
            QuickFilter::new(config.filter.clone()),
            ArchiveBombDetector::new(config.limits.archive.clone()),
            UploadScanner::new(config.limits.clone()),
        )
    }

    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Keep rejected files on disk instead of deleting them.
    pub fn keep_rejected(mut self) -> Self {
        self.delete_rejected = false;
        self
    }

    pub fn scanner(&self) -> &UploadScanner {
        &self.scanner
    }

    /// Decide on a background thread so async handlers are not blocked.
    pub async fn admit(&self, request: UploadRequest) -> GuardResult<UploadDecision> {
        let gate = self.clone();
        let decision = tokio::task::spawn_blocking(move || gate.decide(&request)).await?;
        Ok(decision)
    }

    /// Run every check on `request` and clean up after a rejection.
    pub fn decide(&self, request: &UploadRequest) -> UploadDecision {
        let quick = self.filter.quick_validation(&request.mime_type, &request.original_name);
        if !quick.safe {
            let reason = quick.reason.unwrap_or_else(|| "file not allowed".to_string());
            return self.reject(request, UploadDecision::reject(reason, None), None);
        }

        let archive_kind = final_extension(&request.original_name)
            .as_deref()
            .and_then(ArchiveKind::from_extension);
        let mut archive_report = None;
        if let Some(kind) = archive_kind {
            match self.bombs.detect_archive_bomb(&request.path, kind) {
                Ok(report) if report.is_bomb => {
                    let details = report.error.clone().unwrap_or_else(|| {
                        format!(
                            "{} entries, {} bytes uncompressed, ratio {:.1}",
                            report.entry_count, report.total_uncompressed_bytes, report.compression_ratio
                        )
                    });
                    let mut decision = UploadDecision::reject("archive bomb detected", Some(details));
                    decision.archive_report = Some(report);
                    return self.reject(request, decision, None);
                }
                Ok(report) => archive_report = Some(report),
                Err(e) => {
                    log::warn!("Archive inspection failed for {:?}: {}", request.path, e);
                    let decision =
                        UploadDecision::reject("archive could not be inspected", Some(e.to_string()));
                    return self.reject(request, decision, None);
                }
            }
        }

        let verdict = self.scanner.detect_steganography(&request.path);
        if !verdict.safe {
            let reason = if verdict.corrupted {
                "corrupted file"
            } else if verdict.error.is_some() {
                "file could not be analysed"
            } else if verdict.detected_type == FileKind::Unknown {
                "unrecognised file type"
            } else {
                "hidden content detected"
            };
            let mut decision = UploadDecision::reject(reason, Some(verdict.details.clone()));
            decision.archive_report = archive_report;
            return self.reject(request, decision, Some(verdict));
        }

        log::info!("Accepted upload {:?}", request.original_name);
        UploadDecision::accept(verdict, archive_report)
    }

    /// Audit and delete a rejected upload.
    fn reject(&self, request: &UploadRequest, mut decision: UploadDecision, verdict: Option<Verdict>) -> UploadDecision {
        let reason = decision.reason.clone().unwrap_or_default();
        log::warn!("Blocked upload {:?}: {}", request.original_name, reason);

        if let Some(sink) = &self.audit {
            let entry = self.audit_entry(request, &reason, verdict.as_ref());
            if let Err(e) = sink.record(&entry) {
                log::error!("Failed to record blocked upload {:?}: {}", request.original_name, e);
            }
        }

        if self.delete_rejected {
            if let Err(e) = std::fs::remove_file(&request.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::error!("Failed to delete rejected upload {:?}: {}", request.path, e);
                }
            }
        }

        decision.verdict = verdict;
        decision
    }

    fn audit_entry(&self, request: &UploadRequest, reason: &str, verdict: Option<&Verdict>) -> BlockedUpload {
        let sha256 = read_file_bytes(&request.path)
            .ok()
            .map(|bytes| sha256_hex(&bytes));
        BlockedUpload {
            original_name: request.original_name.clone(),
            stored_filename: request
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            mime_type: request.mime_type.clone(),
            reason: reason.to_string(),
            detected_type: verdict.map(|v| v.detected_type),
            entropy_bits: verdict.map(|v| v.entropy_bits),
            hidden_files: verdict.map(|v| v.hidden_files.clone()).unwrap_or_default(),
            room: request.room.clone(),
            sha256,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditLog;
    use crate::config::ScanLimits;
    use std::io::Write;

    fn gate_with_log() -> (UploadGate, Arc<MemoryAuditLog>) {
        let log = Arc::new(MemoryAuditLog::new());
        let gate = UploadGate::new(
            QuickFilter::default(),
            ArchiveBombDetector::default(),
            UploadScanner::without_pixel_decoder(ScanLimits::default()),
        )
        .with_audit(log.clone());
        (gate, log)
    }

    fn upload(bytes: &[u8], name: &str, mime: &str) -> (tempfile::TempDir, UploadRequest) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload-0001");
        std::fs::File::create(&path).unwrap().write_all(bytes).unwrap();
        let request = UploadRequest {
            path,
            original_name: name.to_string(),
            mime_type: mime.to_string(),
            room: Some("room-1".to_string()),
        };
        (dir, request)
    }

    #[test]
    fn test_quick_filter_rejects_and_deletes() {
        let (gate, log) = gate_with_log();
        let (_dir, req) = upload(b"MZ\x90\x00 whatever", "tool.exe", "application/octet-stream");
        let decision = gate.decide(&req);
        assert!(!decision.accepted);
        assert_eq!(decision.status_code, STATUS_FORBIDDEN);
        assert!(!req.path.exists());
        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, "file extension not allowed");
        assert_eq!(entries[0].stored_filename, "upload-0001");
        assert!(entries[0].sha256.is_some());
    }

    #[test]
    fn test_unreadable_zip_fails_closed() {
        let (gate, log) = gate_with_log();
        let (_dir, req) = upload(b"PK\x03\x04 but not really a zip", "photos.zip", "application/zip");
        let decision = gate.decide(&req);
        assert!(!decision.accepted);
        assert_eq!(decision.reason.as_deref(), Some("archive could not be inspected"));
        assert_eq!(log.entries().len(), 1);
    }

    #[test]
    fn test_hidden_content_rejected_with_verdict() {
        let (gate, log) = gate_with_log();
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0, 1, 0xFF, 0xD9];
        jpeg.extend_from_slice(b"\0\0\x7FELF\x02\x01");
        let (_dir, req) = upload(&jpeg, "cat.jpg", "image/jpeg");
        let decision = gate.decide(&req);
        assert_eq!(decision.reason.as_deref(), Some("hidden content detected"));
        let verdict = decision.verdict.unwrap();
        assert!(!verdict.safe);
        assert_eq!(log.entries()[0].detected_type, Some(FileKind::Jpeg));
    }

    #[test]
    fn test_clean_png_accepted_and_kept() {
        let (gate, log) = gate_with_log();
        let mut png = crate::signatures::PNG_FULL_SIGNATURE.to_vec();
        png.extend_from_slice(&[0, 0, 0, 0]);
        png.extend_from_slice(b"IHDR");
        png.extend_from_slice(&[0u8; 8]);
        png.extend_from_slice(b"IEND");
        png.extend_from_slice(&[0xAE, 0x42, 0x60, 0x82]);
        let (_dir, req) = upload(&png, "pixel.png", "image/png");
        let decision = gate.decide(&req);
        assert!(decision.accepted, "{:?}", decision.details);
        assert_eq!(decision.status_code, STATUS_ACCEPTED);
        assert!(req.path.exists());
        assert!(log.entries().is_empty());
    }

    #[test]
    fn test_keep_rejected_leaves_file() {
        let (gate, _log) = gate_with_log();
        let gate = gate.keep_rejected();
        let (_dir, req) = upload(b"#!/bin/sh\necho hi\n", "run.sh", "text/x-sh");
        assert!(!gate.decide(&req).accepted);
        assert!(req.path.exists());
    }

    #[tokio::test]
    async fn test_admit_runs_off_thread() {
        let (gate, _log) = gate_with_log();
        let (_dir, req) = upload(b"tiny", "a.gif", "image/gif");
        let decision = gate.admit(req).await.unwrap();
        assert!(!decision.accepted);
        assert_eq!(decision.reason.as_deref(), Some("unrecognised file type"));
    }
}
