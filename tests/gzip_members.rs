//! Integration tests for GZIP access over concatenated member streams.
//!
//! Files produced by `gzip`-style tools may be plain single-member streams
//! or several members concatenated back to back (`cat a.gz b.gz > all.gz`).
//! The accessor surfaces each member as its own entry.

mod common;

use std::io::Write;

use nestar::{AccessMode, ArchiveAccess, member_entries, open_path};

use flate2::{Compression, GzBuilder};

fn gzip_member(name: Option<&str>, data: &[u8]) -> Vec<u8> {
    let mut builder = GzBuilder::new();
    if let Some(name) = name {
        builder = builder.filename(name);
    }
    let mut encoder = builder.write(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[test]
fn test_concatenated_members_surface_as_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("all.gz");

    let mut bytes = gzip_member(Some("first.txt"), b"first payload");
    bytes.extend(gzip_member(Some("second.txt"), b"second payload"));
    bytes.extend(gzip_member(None, b"anonymous"));
    std::fs::write(&path, &bytes).unwrap();

    let mut access = open_path(&path, AccessMode::Read, None).unwrap();
    let names: Vec<_> = access.entries().iter().map(|e| e.name.clone()).collect();
    assert_eq!(names, vec!["first.txt", "second.txt", "file.dat"]);

    assert_eq!(common::read_entry(&mut access, "first.txt"), b"first payload");
    assert_eq!(
        common::read_entry(&mut access, "second.txt"),
        b"second payload"
    );
    assert_eq!(common::read_entry(&mut access, "file.dat"), b"anonymous");
}

#[test]
fn test_member_lengths_and_crcs_from_footers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("two.gz");

    let first = b"0123456789";
    let second = b"abcdef";
    let mut bytes = gzip_member(Some("a.bin"), first);
    bytes.extend(gzip_member(Some("b.bin"), second));
    std::fs::write(&path, &bytes).unwrap();

    let access = open_path(&path, AccessMode::Read, None).unwrap();
    let entries = access.entries();
    assert_eq!(entries[0].length, first.len() as i64);
    assert_eq!(entries[0].crc32, Some(crc32fast::hash(first)));
    assert_eq!(entries[1].length, second.len() as i64);
    assert_eq!(entries[1].crc32, Some(crc32fast::hash(second)));
}

#[test]
fn test_truncated_tail_yields_parsed_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cut.gz");

    let mut bytes = gzip_member(Some("intact.txt"), b"whole member");
    let broken = gzip_member(Some("broken.txt"), b"this member gets cut");
    bytes.extend(&broken[..broken.len() / 2]);
    std::fs::write(&path, &bytes).unwrap();

    let mut access = open_path(&path, AccessMode::Read, None).unwrap();
    assert_eq!(access.entries().len(), 1);
    assert_eq!(common::read_entry(&mut access, "intact.txt"), b"whole member");
}

#[test]
fn test_member_scan_cap_through_file() {
    let mut bytes = Vec::new();
    for i in 0..4 {
        bytes.extend(gzip_member(None, format!("member {i}").as_bytes()));
    }

    let capped: Vec<_> = member_entries(std::io::Cursor::new(&bytes), Some(2)).collect();
    assert_eq!(capped.len(), 2);
    assert_eq!(capped[0].name, "file.dat");
    assert_eq!(capped[1].name, "file_1.dat");
}

#[test]
fn test_gzip_written_entry_reads_back_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("made.gz");

    {
        let mut access = open_path(&path, AccessMode::Create, None).unwrap();
        access
            .create_entry("report.csv", &mut &b"a,b,c\n1,2,3\n"[..])
            .unwrap();
        access.finish().unwrap();
    }

    let mut access = open_path(&path, AccessMode::Read, None).unwrap();
    assert_eq!(access.entries().len(), 1);
    assert_eq!(access.entries()[0].name, "report.csv");
    assert!(access.entries()[0].modified.is_some());
    assert_eq!(
        common::read_entry(&mut access, "report.csv"),
        b"a,b,c\n1,2,3\n"
    );
}
