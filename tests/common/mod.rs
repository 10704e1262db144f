//! Shared test utilities for integration tests.
//!
//! Archive creation and verification helpers are consolidated here to avoid
//! duplication.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test
//! file compiles as a separate crate and may only use a subset of these
//! helpers.

#![allow(dead_code)]

use std::io::{Cursor, Read};

use nestar::{AccessMode, ArchiveAccess, ArchiveFormat, open};

/// Creates an in-memory archive of the given format from (path, data)
/// tuples and returns the raw archive bytes.
pub fn create_archive_bytes(
    format: ArchiveFormat,
    entries: &[(&str, &[u8])],
) -> nestar::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    {
        let mut access = open(
            Box::new(Cursor::new(&mut bytes)),
            format,
            AccessMode::Create,
            None,
        )?;
        for (name, data) in entries {
            let mut source: &[u8] = data;
            access.create_entry(name, &mut source)?;
        }
        access.finish()?;
    }
    Ok(bytes)
}

/// Opens `bytes` as a read-only archive of the given format.
pub fn open_archive_bytes(
    format: ArchiveFormat,
    bytes: Vec<u8>,
) -> nestar::Result<Box<dyn ArchiveAccess>> {
    open(
        Box::new(Cursor::new(bytes)),
        format,
        AccessMode::Read,
        None,
    )
}

/// Reads the full contents of the named entry.
///
/// # Panics
///
/// Panics if the entry is missing or cannot be decoded.
pub fn read_entry(access: &mut (dyn ArchiveAccess + '_), name: &str) -> Vec<u8> {
    let mut reader = access
        .open_entry(name)
        .unwrap_or_else(|e| panic!("Failed to open entry '{}': {}", name, e))
        .unwrap_or_else(|| panic!("Entry '{}' not found", name));
    let mut data = Vec::new();
    reader
        .read_to_end(&mut data)
        .unwrap_or_else(|e| panic!("Failed to read entry '{}': {}", name, e));
    data
}

/// Opens `bytes` as the given format and compares every expected entry
/// byte-for-byte. Reading an entry decodes it in full, so integrity checks
/// built into the format (such as ZIP CRCs) are exercised along the way.
///
/// # Panics
///
/// Panics on any mismatch between the archive and `expected_entries`.
pub fn verify_archive_contents(
    format: ArchiveFormat,
    bytes: Vec<u8>,
    expected_entries: &[(&str, &[u8])],
) {
    let mut access =
        open_archive_bytes(format, bytes).expect("Failed to open archive for verification");

    let file_count = access.entries().iter().filter(|e| !e.is_directory).count();
    assert_eq!(
        file_count,
        expected_entries.len(),
        "Entry count mismatch: expected {}, got {}",
        expected_entries.len(),
        file_count
    );

    for (name, expected_data) in expected_entries {
        let entry = access
            .find_entry(name)
            .unwrap_or_else(|| panic!("Entry '{}' not found in archive", name))
            .clone();
        assert_eq!(
            entry.length,
            expected_data.len() as i64,
            "Length mismatch for '{}'",
            name
        );
        let extracted = read_entry(&mut *access, name);
        assert_eq!(
            &extracted[..],
            *expected_data,
            "Content mismatch for '{}'",
            name
        );
    }
}

/// Extracts the error from a Result, panicking if it's Ok.
pub fn expect_err<T, E>(result: Result<T, E>) -> E {
    match result {
        Ok(_) => panic!("Expected error but got Ok"),
        Err(e) => e,
    }
}
