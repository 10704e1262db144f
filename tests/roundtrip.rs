//! Round-trip integration tests.
//!
//! These tests create archives through the public factory API, reopen them,
//! and verify entries, metadata, and decoded contents. Covered here:
//! - Empty archives
//! - Unicode entry names
//! - Deep directory structures
//! - Update-mode add and delete
//! - Long tar names split into the ustar prefix field
//! - Single-member gzip semantics

mod common;

use std::io::{Cursor, Read};

use nestar::{AccessMode, ArchiveAccess, ArchiveFormat, Error, open, open_path};

#[test]
fn test_empty_zip_roundtrip() {
    let bytes = common::create_archive_bytes(ArchiveFormat::Zip, &[]).unwrap();
    // An empty zip is just the end-of-central-directory record.
    assert_eq!(bytes.len(), 22);
    assert_eq!(&bytes[0..4], b"PK\x05\x06");

    let access = common::open_archive_bytes(ArchiveFormat::Zip, bytes).unwrap();
    assert!(access.entries().is_empty());
}

#[test]
fn test_zip_roundtrip_with_crc() {
    let entries = [
        ("file1.txt", b"Hello, World!" as &[u8]),
        ("file2.txt", b"Second file content"),
        ("dir/nested.txt", b"Nested file data"),
    ];
    let bytes = common::create_archive_bytes(ArchiveFormat::Zip, &entries).unwrap();

    let access = common::open_archive_bytes(ArchiveFormat::Zip, bytes.clone()).unwrap();
    for entry in access.entries() {
        assert!(entry.crc32.is_some(), "'{}' has no CRC", entry.name);
        assert!(entry.modified.is_some(), "'{}' has no timestamp", entry.name);
    }

    common::verify_archive_contents(ArchiveFormat::Zip, bytes, &entries);
}

#[test]
fn test_unicode_entry_names() {
    let entries = [
        ("日本語.txt", b"japanese" as &[u8]),
        ("δοκιμή/αρχείο.bin", b"greek"),
    ];
    let bytes = common::create_archive_bytes(ArchiveFormat::Zip, &entries).unwrap();
    common::verify_archive_contents(ArchiveFormat::Zip, bytes, &entries);
}

#[test]
fn test_deep_directory_structure() {
    let entries = [("a/b/c/d/e/f/g/deep.txt", b"Deeply nested file" as &[u8])];
    let bytes = common::create_archive_bytes(ArchiveFormat::Zip, &entries).unwrap();
    common::verify_archive_contents(ArchiveFormat::Zip, bytes, &entries);
}

#[test]
fn test_zip_file_roundtrip_via_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("archive.zip");

    {
        let mut archive = open_path(&path, AccessMode::Create, None).unwrap();
        archive
            .create_entry("notes.txt", &mut &b"written to disk"[..])
            .unwrap();
        archive.finish().unwrap();
    }

    let mut archive = open_path(&path, AccessMode::Read, None).unwrap();
    assert_eq!(archive.format(), ArchiveFormat::Zip);
    assert_eq!(archive.mode(), AccessMode::Read);
    assert_eq!(common::read_entry(&mut archive, "notes.txt"), b"written to disk");

    // Entry paths qualified with the archive's own path also resolve.
    let qualified = format!("{}/notes.txt", path.display());
    assert_eq!(
        common::read_entry(&mut archive, &qualified),
        b"written to disk"
    );
}

#[test]
fn test_zip_update_add_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("archive.zip");

    {
        let mut archive = open_path(&path, AccessMode::Create, None).unwrap();
        archive.create_entry("keep.txt", &mut &b"keep"[..]).unwrap();
        archive.create_entry("drop.txt", &mut &b"drop"[..]).unwrap();
        archive.finish().unwrap();
    }

    {
        let mut archive = open_path(&path, AccessMode::Update, None).unwrap();
        assert!(archive.delete_entry("drop.txt").unwrap());
        assert!(!archive.delete_entry("never-there.txt").unwrap());
        archive.create_entry("added.txt", &mut &b"added"[..]).unwrap();
        archive.finish().unwrap();
    }

    let bytes = std::fs::read(&path).unwrap();
    common::verify_archive_contents(
        ArchiveFormat::Zip,
        bytes,
        &[("keep.txt", b"keep" as &[u8]), ("added.txt", b"added")],
    );
}

#[test]
fn test_zip_duplicate_entry_rejected() {
    let mut bytes = Vec::new();
    let mut access = open(
        Box::new(Cursor::new(&mut bytes)),
        ArchiveFormat::Zip,
        AccessMode::Create,
        None,
    )
    .unwrap();
    access.create_entry("same.txt", &mut &b"a"[..]).unwrap();
    let err = common::expect_err(access.create_entry("same.txt", &mut &b"b"[..]));
    assert!(matches!(err, Error::EntryExists { .. }));
}

#[test]
fn test_zip_corrupted_payload_fails_read() {
    let entries = [("data.bin", b"some compressible payload payload payload" as &[u8])];
    let mut bytes = common::create_archive_bytes(ArchiveFormat::Zip, &entries).unwrap();

    // Flip a byte in the middle of the stored entry data.
    let middle = bytes.len() / 3;
    bytes[middle] ^= 0xFF;

    let mut access = common::open_archive_bytes(ArchiveFormat::Zip, bytes).unwrap();
    let mut reader = access.open_entry("data.bin").unwrap().unwrap();
    let mut sink = Vec::new();
    assert!(reader.read_to_end(&mut sink).is_err());
}

#[test]
fn test_tar_roundtrip() {
    let entries = [
        ("readme.txt", b"tar round trip" as &[u8]),
        ("dir/data.bin", &[0u8, 1, 2, 3, 254, 255]),
    ];
    let bytes = common::create_archive_bytes(ArchiveFormat::Tar, &entries).unwrap();
    // Header + data blocks are 512-aligned and the trailer is two zero blocks.
    assert_eq!(bytes.len() % 512, 0);
    assert!(bytes[bytes.len() - 1024..].iter().all(|&b| b == 0));

    common::verify_archive_contents(ArchiveFormat::Tar, bytes, &entries);
}

#[test]
fn test_tar_long_name_roundtrip() {
    let long_name = format!("{}leaf.txt", "directory-with-a-rather-long-name/".repeat(4));
    assert!(long_name.len() > 100);
    let entries = [(long_name.as_str(), b"split into the prefix field" as &[u8])];
    let bytes = common::create_archive_bytes(ArchiveFormat::Tar, &entries).unwrap();
    common::verify_archive_contents(ArchiveFormat::Tar, bytes, &entries);
}

#[test]
fn test_tar_delete_not_supported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("archive.tar");
    {
        let mut archive = open_path(&path, AccessMode::Create, None).unwrap();
        archive.create_entry("a.txt", &mut &b"a"[..]).unwrap();
        archive.finish().unwrap();
    }

    let mut archive = open_path(&path, AccessMode::Update, None).unwrap();
    // Absent entries report false before the capability check applies.
    assert!(!archive.delete_entry("missing.txt").unwrap());
    let err = common::expect_err(archive.delete_entry("a.txt"));
    assert!(matches!(err, Error::NotSupported { .. }));
    archive.finish().unwrap();
}

#[test]
fn test_gzip_roundtrip() {
    let entries = [("notes.txt", b"single member payload" as &[u8])];
    let bytes = common::create_archive_bytes(ArchiveFormat::GZip, &entries).unwrap();
    assert_eq!(&bytes[0..2], &[0x1F, 0x8B]);

    let mut access = common::open_archive_bytes(ArchiveFormat::GZip, bytes).unwrap();
    assert!(access.is_compressed());
    assert!(!access.is_archive());
    assert_eq!(access.entries().len(), 1);
    assert_eq!(access.entries()[0].name, "notes.txt");
    assert_eq!(
        common::read_entry(&mut *access, "notes.txt"),
        b"single member payload"
    );
}

#[test]
fn test_gzip_second_entry_rejected() {
    let mut bytes = Vec::new();
    let mut access = open(
        Box::new(Cursor::new(&mut bytes)),
        ArchiveFormat::GZip,
        AccessMode::Create,
        None,
    )
    .unwrap();
    access.create_entry("first.txt", &mut &b"one"[..]).unwrap();
    let err = common::expect_err(access.create_entry("second.txt", &mut &b"two"[..]));
    assert!(matches!(err, Error::NotSupported { .. }));
}

#[test]
fn test_create_mode_requires_empty_stream() {
    let existing = common::create_archive_bytes(ArchiveFormat::GZip, &[("a", b"x")]).unwrap();
    let err = common::expect_err(open(
        Box::new(Cursor::new(existing)),
        ArchiveFormat::GZip,
        AccessMode::Create,
        None,
    ));
    assert!(matches!(err, Error::InvalidOperation { .. }));
}

#[test]
fn test_create_entry_rejected_in_read_mode() {
    let bytes = common::create_archive_bytes(ArchiveFormat::Zip, &[("a.txt", b"a")]).unwrap();
    let mut access = common::open_archive_bytes(ArchiveFormat::Zip, bytes).unwrap();
    let err = common::expect_err(access.create_entry("b.txt", &mut &b"b"[..]));
    assert!(matches!(err, Error::InvalidOperation { .. }));
}

#[test]
fn test_open_path_read_requires_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.zip");
    assert!(open_path(&missing, AccessMode::Read, None).is_err());
    assert!(!missing.exists());
}

#[test]
fn test_open_path_create_refuses_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("archive.zip");
    {
        let mut archive = open_path(&path, AccessMode::Create, None).unwrap();
        archive.finish().unwrap();
    }
    assert!(open_path(&path, AccessMode::Create, None).is_err());
}

#[test]
fn test_open_path_update_creates_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fresh.zip");
    {
        let mut archive = open_path(&path, AccessMode::Update, None).unwrap();
        archive.create_entry("a.txt", &mut &b"a"[..]).unwrap();
        archive.finish().unwrap();
    }
    let bytes = std::fs::read(&path).unwrap();
    common::verify_archive_contents(ArchiveFormat::Zip, bytes, &[("a.txt", b"a")]);
}
