//! File reading, hashing and file-name helpers.

use crate::errors::{GuardError, GuardResult};
use memmap2::Mmap;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::ops::Deref;
use std::path::Path;

/// Read-only view of an uploaded file.
///
/// Non-empty files are memory-mapped. Zero-length files cannot be mapped and
/// are represented by an empty buffer.
#[derive(Debug)]
pub enum FileBytes {
    Mapped(Mmap),
    Empty,
}

impl Deref for FileBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            FileBytes::Mapped(mmap) => mmap,
            FileBytes::Empty => &[],
        }
    }
}

/// Map `path` into memory for analysis.
pub fn read_file_bytes(path: &Path) -> GuardResult<FileBytes> {
    let file = File::open(path).map_err(|e| GuardError::io(e, Some(path.to_path_buf())))?;
    let len = file
        .metadata()
        .map_err(|e| GuardError::io(e, Some(path.to_path_buf())))?
        .len();
    if len == 0 {
        return Ok(FileBytes::Empty);
    }
    // SAFETY: the map is read-only and dropped before the file is removed.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| GuardError::mmap(e, path))?;
    Ok(FileBytes::Mapped(mmap))
}

/// Hex SHA-256 of a buffer, computed in chunks.
pub fn sha256_hex(data: &[u8]) -> String {
    const CHUNK_SIZE: usize = 8192;
    let mut hasher = Sha256::new();
    for chunk in data.chunks(CHUNK_SIZE) {
        hasher.update(chunk);
    }
    hex::encode(hasher.finalize())
}

/// Final extension of a file name, lowercased and dot-prefixed.
///
/// `photo.jpg.exe` gives `.exe`. Names with no dot, or ending in one, give `None`.
pub fn final_extension(filename: &str) -> Option<String> {
    let lower = filename.to_lowercase();
    lower
        .rfind('.')
        .filter(|&idx| idx + 1 < lower.len())
        .map(|idx| lower[idx..].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_final_extension() {
        assert_eq!(final_extension("photo.JPG.exe").as_deref(), Some(".exe"));
        assert_eq!(final_extension("archive.tar.gz").as_deref(), Some(".gz"));
        assert_eq!(final_extension("README"), None);
        assert_eq!(final_extension("trailing."), None);
    }

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_read_file_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"GIF89a;").unwrap();
        let bytes = read_file_bytes(file.path()).unwrap();
        assert_eq!(&bytes[..], b"GIF89a;");
    }

    #[test]
    fn test_read_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let bytes = read_file_bytes(file.path()).unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_file_bytes(Path::new("/nonexistent/upload.bin")).unwrap_err();
        assert!(matches!(err, GuardError::Io { path: Some(_), .. }));
    }
}
