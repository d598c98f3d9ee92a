//! PNG chunk walk looking for oversized ancillary chunks.

use crate::models::ChunkAnomaly;

/// Walk chunks from offset 8 and flag ancillary chunks whose declared length
/// exceeds `limit`.
///
/// A length that runs past the end of the buffer stops the walk; whatever was
/// flagged so far is returned.
pub fn inspect_png_chunks(buffer: &[u8], limit: u32) -> Vec<ChunkAnomaly> {
    let mut anomalies = Vec::new();
    let mut pos = 8usize;

    while pos + 8 < buffer.len() {
        let length = u32::from_be_bytes([buffer[pos], buffer[pos + 1], buffer[pos + 2], buffer[pos + 3]]);
        let chunk_type = &buffer[pos + 4..pos + 8];

        let chunk_end = match pos.checked_add(12).and_then(|p| p.checked_add(length as usize)) {
            Some(end) if end <= buffer.len() => end,
            _ => {
                log::trace!("Chunk walk stopped at offset {} (declared length {})", pos, length);
                break;
            }
        };

        // Ancillary unless the first type byte is an uppercase letter.
        let ancillary = !chunk_type[0].is_ascii_uppercase();
        if ancillary && length > limit {
            anomalies.push(ChunkAnomaly {
                chunk_type: String::from_utf8_lossy(chunk_type).into_owned(),
                length,
                offset: pos,
            });
        }

        pos = chunk_end;
    }

    anomalies
}
