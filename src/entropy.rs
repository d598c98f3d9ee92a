//! Shannon entropy over byte buffers.
//!
//! Values range from 0.0 (every byte identical) to 8.0 (uniformly random
//! bytes). Compressed or encrypted payloads sit near the top of that range.

use crate::models::EntropyWindowReport;

/// Byte-value histogram that can slide across a buffer.
#[derive(Debug, Clone)]
struct ByteHistogram {
    counts: [u32; 256],
    total: u32,
}

impl ByteHistogram {
    fn new() -> Self {
        Self {
            counts: [0; 256],
            total: 0,
        }
    }

    fn add(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.counts[b as usize] += 1;
        }
        self.total += bytes.len() as u32;
    }

    fn remove(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.counts[b as usize] -= 1;
        }
        self.total -= bytes.len() as u32;
    }

    fn entropy(&self) -> f64 {
        entropy_from_counts(&self.counts, self.total as f64)
    }
}

fn entropy_from_counts(counts: &[u32; 256], total: f64) -> f64 {
    if total == 0.0 {
        return 0.0;
    }
    let mut entropy = 0.0;
    for &count in counts {
        if count > 0 {
            let p = count as f64 / total;
            entropy -= p * p.log2();
        }
    }
    entropy
}

/// Shannon entropy (base 2) of the whole slice.
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut freq = [0u64; 256];
    for &byte in data {
        freq[byte as usize] += 1;
    }
    let len = data.len() as f64;
    let mut entropy = 0.0;
    for &count in &freq {
        if count > 0 {
            let p = count as f64 / len;
            entropy -= p * p.log2();
        }
    }
    entropy
}

/// Entropy of the first `sample_bytes` of `buffer`.
pub fn global_entropy(buffer: &[u8], sample_bytes: usize) -> f64 {
    shannon_entropy(&buffer[..buffer.len().min(sample_bytes)])
}

/// Parameters for [`windowed_entropy`].
#[derive(Debug, Clone, Copy)]
pub struct WindowParams {
    pub window: usize,
    pub step: usize,
    pub threshold: f64,
    /// Only windows lying fully within this prefix are examined.
    pub max_bytes: usize,
}

impl Default for WindowParams {
    fn default() -> Self {
        Self {
            window: 4096,
            step: 1024,
            threshold: 7.5,
            max_bytes: 20 * 1024 * 1024,
        }
    }
}

/// Slide a window over the buffer and report the first one whose entropy
/// exceeds the threshold.
///
/// First match wins, so the reported offset is deterministic. A buffer shorter
/// than one window is never suspicious.
pub fn windowed_entropy(buffer: &[u8], params: &WindowParams) -> EntropyWindowReport {
    let limit = buffer.len().min(params.max_bytes);
    let mut report = EntropyWindowReport {
        suspicious: false,
        offset: 0,
        entropy_bits: 0.0,
    };
    if params.window == 0 || params.step == 0 || params.window > limit {
        return report;
    }

    // Windows overlap when step < window; otherwise rebuild per window.
    let incremental = params.step < params.window;
    let mut hist = ByteHistogram::new();
    hist.add(&buffer[..params.window]);

    let mut start = 0;
    loop {
        let entropy = hist.entropy();
        if entropy > params.threshold {
            log::trace!("Entropy {:.3} over threshold at offset {}", entropy, start);
            return EntropyWindowReport {
                suspicious: true,
                offset: start,
                entropy_bits: entropy,
            };
        }
        report.entropy_bits = report.entropy_bits.max(entropy);

        let next = start + params.step;
        if next + params.window > limit {
            break;
        }
        if incremental {
            hist.remove(&buffer[start..next]);
            hist.add(&buffer[start + params.window..next + params.window]);
        } else {
            hist = ByteHistogram::new();
            hist.add(&buffer[next..next + params.window]);
        }
        start = next;
    }

    report
}
