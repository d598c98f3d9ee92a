//! Minimal RAR 5.0 / 4.x header lister.
//!
//! Walks block headers and records every file header's unpacked size. Packed
//! data is skipped, never decompressed. See https://www.rarlab.com/technote.htm

use super::ArchiveTotals;

/// RAR 5.0 signature: Rar!\x1A\x07\x01\x00
const RAR5_SIGNATURE: &[u8] = b"Rar!\x1A\x07\x01\x00";
/// RAR 4.x signature: Rar!\x1A\x07\x00
const RAR4_SIGNATURE: &[u8] = b"Rar!\x1A\x07\x00";

const RAR4_BLOCK_ARCHIVE: u8 = 0x73;
const RAR4_BLOCK_FILE: u8 = 0x74;
const RAR4_BLOCK_END: u8 = 0x7B;
const RAR4_FLAG_LONG_BLOCK: u16 = 0x8000;
const RAR4_FILE_LARGE: u16 = 0x0100;
const RAR4_FILE_DIRECTORY: u16 = 0x00E0;
const RAR4_ARCHIVE_ENCRYPTED_HEADERS: u16 = 0x0080;

const RAR5_BLOCK_FILE: u64 = 2;
const RAR5_BLOCK_ENCRYPTION: u64 = 4;
const RAR5_BLOCK_END: u64 = 5;
const RAR5_FLAG_EXTRA: u64 = 0x0001;
const RAR5_FLAG_DATA: u64 = 0x0002;
const RAR5_FILE_DIRECTORY: u64 = 0x0001;
const RAR5_FILE_UNKNOWN_SIZE: u64 = 0x0008;

/// RAR version detected from signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RarVersion {
    Rar5,
    Rar4,
}

/// One file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RarFileHeader {
    /// Zero when the archiver did not record it.
    pub unpacked_size: u64,
    pub is_dir: bool,
}

/// Why the header walk gave up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RarListError {
    #[error("missing RAR signature")]
    BadSignature,
    #[error("header truncated at offset {0}")]
    Truncated(usize),
    #[error("malformed {what} at offset {offset}")]
    Malformed { what: &'static str, offset: usize },
    #[error("headers are encrypted")]
    EncryptedHeaders,
}

type ListResult<T> = Result<T, RarListError>;

/// Which signature starts the buffer, and where the first block begins.
pub fn detect_version(data: &[u8]) -> Option<(RarVersion, usize)> {
    if data.starts_with(RAR5_SIGNATURE) {
        Some((RarVersion::Rar5, RAR5_SIGNATURE.len()))
    } else if data.starts_with(RAR4_SIGNATURE) {
        Some((RarVersion::Rar4, RAR4_SIGNATURE.len()))
    } else {
        None
    }
}

/// List every file header in the archive.
pub fn list_headers(data: &[u8]) -> ListResult<Vec<RarFileHeader>> {
    match detect_version(data) {
        Some((RarVersion::Rar5, first)) => list_rar5(data, first),
        Some((RarVersion::Rar4, first)) => list_rar4(data, first),
        None => Err(RarListError::BadSignature),
    }
}

/// Fold listed headers into archive totals.
pub fn rar_totals(headers: &[RarFileHeader], ceiling: u64) -> ArchiveTotals {
    let mut totals = ArchiveTotals::default();
    for header in headers {
        totals.add_entry(header.unpacked_size, header.is_dir, ceiling);
    }
    totals
}

fn le_u16(data: &[u8], offset: usize) -> ListResult<u16> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(RarListError::Truncated(offset))
}

fn le_u32(data: &[u8], offset: usize) -> ListResult<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(RarListError::Truncated(offset))
}

fn list_rar4(data: &[u8], first_block: usize) -> ListResult<Vec<RarFileHeader>> {
    let mut headers = Vec::new();
    let mut pos = first_block;

    while pos < data.len() {
        let block_type = *data.get(pos + 2).ok_or(RarListError::Truncated(pos))?;
        let flags = le_u16(data, pos + 3)?;
        let head_size = le_u16(data, pos + 5)? as usize;
        if head_size < 7 || pos + head_size > data.len() {
            return Err(RarListError::Truncated(pos));
        }

        let add_size = if flags & RAR4_FLAG_LONG_BLOCK != 0 {
            le_u32(data, pos + 7)? as u64
        } else {
            0
        };

        match block_type {
            RAR4_BLOCK_ARCHIVE if flags & RAR4_ARCHIVE_ENCRYPTED_HEADERS != 0 => {
                return Err(RarListError::EncryptedHeaders);
            }
            RAR4_BLOCK_FILE => {
                if head_size < 32 {
                    return Err(RarListError::Malformed {
                        what: "file header",
                        offset: pos,
                    });
                }
                let mut unpacked = le_u32(data, pos + 11)? as u64;
                if flags & RAR4_FILE_LARGE != 0 {
                    let high = le_u32(data, pos + 36)? as u64;
                    unpacked |= high << 32;
                }
                headers.push(RarFileHeader {
                    unpacked_size: unpacked,
                    is_dir: flags & RAR4_FILE_DIRECTORY == RAR4_FILE_DIRECTORY,
                });
            }
            RAR4_BLOCK_END => break,
            _ => {}
        }

        let next = (pos as u64)
            .checked_add(head_size as u64)
            .and_then(|p| p.checked_add(add_size))
            .ok_or(RarListError::Malformed {
                what: "block size",
                offset: pos,
            })?;
        if next > data.len() as u64 {
            return Err(RarListError::Truncated(pos));
        }
        pos = next as usize;
    }

    Ok(headers)
}

/// Read a RAR 5.0 vint (variable-length integer): 7 bits per byte, high bit = continuation.
/// Returns (value, bytes consumed).
fn read_vint(data: &[u8], offset: usize) -> ListResult<(u64, usize)> {
    let mut val: u64 = 0;
    let mut shift = 0u32;
    let mut i = offset;
    loop {
        let b = *data.get(i).ok_or(RarListError::Truncated(offset))?;
        if shift >= 64 {
            return Err(RarListError::Malformed {
                what: "vint",
                offset,
            });
        }
        i += 1;
        val |= ((b & 0x7F) as u64) << shift;
        if b & 0x80 == 0 {
            return Ok((val, i - offset));
        }
        shift += 7;
    }
}

/// Cursor over a RAR 5.0 header that never reads past its end.
struct VintCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl VintCursor<'_> {
    fn vint(&mut self) -> ListResult<u64> {
        let (val, n) = read_vint(self.data, self.pos)?;
        self.pos += n;
        Ok(val)
    }
}

fn list_rar5(data: &[u8], first_block: usize) -> ListResult<Vec<RarFileHeader>> {
    let mut headers = Vec::new();
    let mut pos = first_block;

    while pos < data.len() {
        // CRC32 precedes the size field.
        let size_at = pos + 4;
        if size_at > data.len() {
            return Err(RarListError::Truncated(pos));
        }
        let (header_size, n) = read_vint(data, size_at)?;
        let body_start = size_at + n;
        let header_end = usize::try_from(header_size)
            .ok()
            .and_then(|s| body_start.checked_add(s))
            .filter(|&end| header_size > 0 && end <= data.len())
            .ok_or(RarListError::Truncated(pos))?;

        // Header fields only; the data area follows header_end.
        let mut cursor = VintCursor {
            data: &data[..header_end],
            pos: body_start,
        };
        let block_type = cursor.vint()?;
        let flags = cursor.vint()?;
        if flags & RAR5_FLAG_EXTRA != 0 {
            cursor.vint()?;
        }
        let data_size = if flags & RAR5_FLAG_DATA != 0 { cursor.vint()? } else { 0 };

        match block_type {
            RAR5_BLOCK_ENCRYPTION => return Err(RarListError::EncryptedHeaders),
            RAR5_BLOCK_FILE => {
                let file_flags = cursor.vint()?;
                let unpacked = cursor.vint()?;
                headers.push(RarFileHeader {
                    unpacked_size: if file_flags & RAR5_FILE_UNKNOWN_SIZE != 0 { 0 } else { unpacked },
                    is_dir: file_flags & RAR5_FILE_DIRECTORY != 0,
                });
            }
            RAR5_BLOCK_END => break,
            _ => {}
        }

        let next = (header_end as u64)
            .checked_add(data_size)
            .filter(|&n| n <= data.len() as u64)
            .ok_or(RarListError::Truncated(pos))?;
        pos = next as usize;
    }

    Ok(headers)
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Hand-assembled archives for tests. CRC fields are left zero since the
    //! lister never checks them.

    fn vint(mut v: u64) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let byte = (v & 0x7F) as u8;
            v >>= 7;
            if v == 0 {
                out.push(byte);
                return out;
            }
            out.push(byte | 0x80);
        }
    }

    fn rar5_block(body: Vec<u8>, data: &[u8]) -> Vec<u8> {
        let mut block = vec![0, 0, 0, 0];
        block.extend(vint(body.len() as u64));
        block.extend(body);
        block.extend_from_slice(data);
        block
    }

    /// RAR 5.0 archive with one stored file per `(unpacked, packed_data)`.
    pub fn rar5(files: &[(u64, &[u8])]) -> Vec<u8> {
        let mut out = super::RAR5_SIGNATURE.to_vec();
        // main archive header: type 1, no flags, archive flags 0
        out.extend(rar5_block(vec![1, 0, 0], &[]));
        for (unpacked, packed) in files {
            let mut body = vint(2);
            body.extend(vint(0x0002));
            body.extend(vint(packed.len() as u64));
            body.extend(vint(0)); // file flags
            body.extend(vint(*unpacked));
            body.extend(vint(0x20)); // attributes
            body.extend(vint(0)); // compression info
            body.extend(vint(0)); // host os
            body.extend(vint(5));
            body.extend_from_slice(b"a.txt");
            out.extend(rar5_block(body, packed));
        }
        out.extend(rar5_block(vec![5, 0, 0], &[]));
        out
    }

    /// RAR 4.x archive with one file per `(unpacked, packed_len)`.
    pub fn rar4(files: &[(u32, usize)]) -> Vec<u8> {
        let mut out = super::RAR4_SIGNATURE.to_vec();
        // archive header: 13 bytes, no flags
        out.extend_from_slice(&[0, 0, 0x73, 0, 0, 13, 0, 0, 0, 0, 0, 0, 0]);
        for (unpacked, packed_len) in files {
            let name = b"a.txt";
            let head_size = 32 + name.len() as u16;
            out.extend_from_slice(&[0, 0, 0x74]);
            out.extend_from_slice(&0x8000u16.to_le_bytes());
            out.extend_from_slice(&head_size.to_le_bytes());
            out.extend_from_slice(&(*packed_len as u32).to_le_bytes());
            out.extend_from_slice(&unpacked.to_le_bytes());
            out.extend_from_slice(&[0; 11]); // host os, crc, time, version, method
            out.extend_from_slice(&(name.len() as u16).to_le_bytes());
            out.extend_from_slice(&[0x20, 0, 0, 0]);
            out.extend_from_slice(name);
            out.extend(std::iter::repeat(0x55).take(*packed_len));
        }
        out.extend_from_slice(&[0, 0, 0x7B, 0, 0x40, 7, 0]);
        out
    }
}
