//! Property-based tests using proptest.
//!
//! These tests verify invariants of path decomposition and archive
//! round-trips using randomly generated inputs.

mod common;

use proptest::prelude::*;

use nestar::{ArchiveFormat, split_nested_path};

/// Strategy for path components with no archive extension: 1-10 characters,
/// never ending in a recognized suffix.
fn plain_component_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9][a-zA-Z0-9_-]{0,9}".prop_map(|s| s.to_string())
}

/// Strategy for archive-entry payloads: 0 to 4 KiB of arbitrary bytes.
fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 0..4096)
}

proptest! {
    /// Paths built purely from plain components never decompose.
    #[test]
    fn plain_paths_have_no_boundary(
        parts in proptest::collection::vec(plain_component_strategy(), 1..5)
    ) {
        let path = parts.join("/");
        prop_assert!(split_nested_path(&path).is_none(), "'{path}' split unexpectedly");
    }

    /// Inserting an archive component with a remainder always yields the
    /// component as the external boundary.
    #[test]
    fn archive_component_marks_boundary(
        prefix in proptest::collection::vec(plain_component_strategy(), 0..3),
        archive_stem in plain_component_strategy(),
        suffix in proptest::collection::vec(plain_component_strategy(), 1..3),
    ) {
        let archive = format!("{archive_stem}.zip");
        let mut parts = prefix.clone();
        parts.push(archive.clone());
        let external_expected = parts.join("/");
        parts.extend(suffix.clone());
        let path = parts.join("/");

        let nested = split_nested_path(&path).expect("boundary expected");
        prop_assert_eq!(nested.external_path, external_expected);
        prop_assert_eq!(nested.segments, vec![suffix.join("/")]);
    }

    /// Decomposition is insensitive to the separator flavor.
    #[test]
    fn backslashes_split_like_slashes(
        prefix in plain_component_strategy(),
        archive_stem in plain_component_strategy(),
        entry in plain_component_strategy(),
    ) {
        let forward = format!("{prefix}/{archive_stem}.tar/{entry}");
        let backward = format!("{prefix}\\{archive_stem}.tar\\{entry}");
        prop_assert_eq!(split_nested_path(&forward), split_nested_path(&backward));
    }

    /// Whatever bytes go into a zip entry come back out unchanged.
    #[test]
    fn zip_roundtrip_preserves_bytes(data in payload_strategy()) {
        let entries = [("data.bin", data.as_slice())];
        let bytes = common::create_archive_bytes(ArchiveFormat::Zip, &entries).unwrap();
        let mut access = common::open_archive_bytes(ArchiveFormat::Zip, bytes).unwrap();
        prop_assert_eq!(common::read_entry(&mut *access, "data.bin"), data);
    }

    /// Same property for tar, which stores payloads verbatim in 512-byte
    /// blocks.
    #[test]
    fn tar_roundtrip_preserves_bytes(data in payload_strategy()) {
        let entries = [("data.bin", data.as_slice())];
        let bytes = common::create_archive_bytes(ArchiveFormat::Tar, &entries).unwrap();
        let mut access = common::open_archive_bytes(ArchiveFormat::Tar, bytes).unwrap();
        prop_assert_eq!(common::read_entry(&mut *access, "data.bin"), data);
    }

    /// Same property for gzip's single member.
    #[test]
    fn gzip_roundtrip_preserves_bytes(data in payload_strategy()) {
        let entries = [("data.bin", data.as_slice())];
        let bytes = common::create_archive_bytes(ArchiveFormat::GZip, &entries).unwrap();
        let mut access = common::open_archive_bytes(ArchiveFormat::GZip, bytes).unwrap();
        prop_assert_eq!(common::read_entry(&mut *access, "data.bin"), data);
    }
}
