//! Signal aggregation and the audit `details` line.

use crate::models::{RiskLevel, Verdict};

const SEPARATOR: &str = " | ";

/// Whether any cheap detector has already raised suspicion. Used to decide
/// whether large images still get LSB analysis.
pub fn prior_suspicion(verdict: &Verdict) -> bool {
    verdict.high_entropy
        || verdict
            .high_entropy_window
            .as_ref()
            .map(|w| w.suspicious)
            .unwrap_or(false)
        || verdict
            .trailing_data
            .as_ref()
            .map(|t| t.suspicious)
            .unwrap_or(false)
        || !verdict.container_anomalies.is_empty()
}

/// Final suspicion predicate over every collected signal.
pub fn is_suspicious(verdict: &Verdict) -> bool {
    let blocking_hit = verdict
        .hidden_files
        .iter()
        .any(|h| h.risk_level >= RiskLevel::High);
    let lsb = verdict
        .lsb_report
        .as_ref()
        .map(|l| l.suspicious)
        .unwrap_or(false);
    blocking_hit || lsb || prior_suspicion(verdict)
}

/// One line per contributing signal.
pub fn detail_lines(verdict: &Verdict) -> Vec<String> {
    let mut lines = Vec::new();

    lines.extend(
        verdict
            .hidden_files
            .iter()
            .map(|h| format!("{}@{}", h.format, h.byte_offset)),
    );

    if let Some(trailing) = verdict.trailing_data.as_ref().filter(|t| t.suspicious) {
        lines.push(trailing.message.clone());
    }

    if let Some(window) = verdict.high_entropy_window.as_ref().filter(|w| w.suspicious) {
        lines.push(format!(
            "high-entropy region at offset {} (entropy={:.2})",
            window.offset, window.entropy_bits
        ));
    }

    if !verdict.container_anomalies.is_empty() {
        let chunks: Vec<String> = verdict
            .container_anomalies
            .iter()
            .map(|c| format!("{}:{}", c.chunk_type, c.length))
            .collect();
        lines.push(format!("unusual PNG chunks: {}", chunks.join(", ")));
    }

    if let Some(lsb) = &verdict.lsb_report {
        if lsb.suspicious {
            let reason = lsb
                .reason
                .as_deref()
                .unwrap_or("high entropy or embedded signature");
            lines.push(format!("LSB suspicious: {}", reason));
        } else {
            lines.push(format!("LSB: entropy={:.2}", lsb.entropy_bits));
        }
    }

    lines
}

/// Coarse summary used when no detector left a detail line.
pub fn warning_summary(verdict: &Verdict) -> String {
    let mut warnings = Vec::new();

    let labels = |level: RiskLevel| -> Vec<&'static str> {
        verdict
            .hidden_files
            .iter()
            .filter(|h| h.risk_level == level)
            .map(|h| h.format.label())
            .collect()
    };
    let critical = labels(RiskLevel::Critical);
    if !critical.is_empty() {
        warnings.push(format!("executables detected: {}", critical.join(", ")));
    }
    let high = labels(RiskLevel::High);
    if !high.is_empty() {
        warnings.push(format!("hidden archives detected: {}", high.join(", ")));
    }

    if let Some(trailing) = verdict.trailing_data.as_ref().filter(|t| t.suspicious) {
        warnings.push(format!(
            "{} ({} bytes)",
            trailing.message, trailing.trailing_byte_count
        ));
    }

    if verdict.high_entropy {
        warnings.push("abnormally high entropy (possible hidden encryption)".to_string());
    }

    if warnings.is_empty() {
        "file flagged as suspicious".to_string()
    } else {
        warnings.join(SEPARATOR)
    }
}

/// The `details` string stored on the verdict.
pub fn build_details(verdict: &Verdict, suspicious: bool) -> String {
    if !suspicious {
        return "file is safe".to_string();
    }
    let lines = detail_lines(verdict);
    if lines.is_empty() {
        warning_summary(verdict)
    } else {
        lines.join(SEPARATOR)
    }
}
