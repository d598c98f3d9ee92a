use std::io::Write;
use tempfile::NamedTempFile;
use uploadguard::{detect_archive_bomb, ArchiveKind, GuardError};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

fn build_zip(entries: &[(&str, Vec<u8>)], method: CompressionMethod) -> NamedTempFile {
    let tmp = NamedTempFile::new().unwrap();
    let mut writer = ZipWriter::new(tmp.reopen().unwrap());
    let opts = SimpleFileOptions::default().compression_method(method);
    for (name, data) in entries {
        writer.start_file(*name, opts).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap();
    tmp
}

#[test]
fn small_stored_zip_is_not_a_bomb() {
    let tmp = build_zip(
        &[("a.txt", b"hello".to_vec()), ("b.txt", b"world".to_vec())],
        CompressionMethod::Stored,
    );
    let report = detect_archive_bomb(tmp.path(), ".zip").unwrap();
    assert!(!report.is_bomb);
    assert_eq!(report.archive_type, ArchiveKind::Zip);
    assert_eq!(report.entry_count, 2);
    assert_eq!(report.total_uncompressed_bytes, 10);
    assert!(report.compression_ratio < 1.0);
}

#[test]
fn too_many_entries_is_a_bomb() {
    let names: Vec<String> = (0..5001).map(|i| format!("f{}.txt", i)).collect();
    let entries: Vec<(&str, Vec<u8>)> = names.iter().map(|n| (n.as_str(), Vec::new())).collect();
    let tmp = build_zip(&entries, CompressionMethod::Stored);

    let report = detect_archive_bomb(tmp.path(), ".ZIP").unwrap();
    assert!(report.is_bomb);
    assert_eq!(report.entry_count, 5001);
}

#[test]
fn highly_compressible_payload_is_a_ratio_bomb() {
    let tmp = build_zip(&[("zeros.bin", vec![0u8; 1 << 20])], CompressionMethod::Deflated);

    let report = detect_archive_bomb(tmp.path(), "zip").unwrap();
    assert!(report.is_bomb);
    assert_eq!(report.total_uncompressed_bytes, 1 << 20);
    assert!(report.compression_ratio > 50.0);
}

#[test]
fn unsupported_extension_is_an_error() {
    let tmp = build_zip(&[("a.txt", b"x".to_vec())], CompressionMethod::Stored);
    let err = detect_archive_bomb(tmp.path(), ".7z").unwrap_err();
    assert!(matches!(err, GuardError::UnsupportedArchive(ext) if ext == ".7z"));
}

#[test]
fn corrupt_zip_is_an_error() {
    let mut tmp = NamedTempFile::new().unwrap();
    tmp.write_all(b"PK\x03\x04 not a real archive at all").unwrap();
    tmp.flush().unwrap();
    assert!(detect_archive_bomb(tmp.path(), ".zip").is_err());
}

#[test]
fn garbage_rar_is_reported_as_bomb() {
    let mut tmp = NamedTempFile::new().unwrap();
    tmp.write_all(b"definitely not a rar archive").unwrap();
    tmp.flush().unwrap();

    let report = detect_archive_bomb(tmp.path(), ".rar").unwrap();
    assert!(report.is_bomb);
    assert_eq!(report.archive_type, ArchiveKind::Rar);
    assert!(report.error.unwrap().starts_with("corrupt or unreadable RAR"));
}
