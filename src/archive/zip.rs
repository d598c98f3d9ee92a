//! ZIP central-directory listing.

use super::ArchiveTotals;
use crate::errors::{GuardError, GuardResult};
use std::fs::File;
use std::path::Path;

/// Count entries and sum their declared uncompressed sizes without
/// decompressing anything.
pub fn zip_totals(path: &Path, ceiling: u64) -> GuardResult<ArchiveTotals> {
    let file = File::open(path).map_err(|e| GuardError::io(e, Some(path.to_path_buf())))?;
    let mut archive = ::zip::ZipArchive::new(file)?;

    let mut totals = ArchiveTotals::default();
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i)?;
        totals.add_entry(entry.size(), entry.is_dir(), ceiling);
    }

    log::trace!(
        "ZIP {:?}: {} entries, {} bytes declared",
        path,
        totals.entry_count,
        totals.total_uncompressed_bytes
    );
    Ok(totals)
}
