//! TAR accessor: ustar read and append-style authoring.
//!
//! A TAR stream is a sequence of 512-byte header blocks, each followed by
//! its zero-padded payload, terminated by two zero blocks. Reading validates
//! each header checksum and joins the ustar name/prefix split. Creating
//! appends entries before the trailer; the trailer itself is written by
//! [`ArchiveAccess::finish`]. TAR has no way to rewrite earlier blocks, so
//! deletion is unsupported.

use std::io::{Read, Seek, SeekFrom, Write};
use std::time::{Duration, SystemTime};

use crate::access::{AccessMode, ArchiveAccess, ArchiveEntry, ArchiveStream, stream_len};
use crate::error::{Error, Result};
use crate::format::ArchiveFormat;

const BLOCK_SIZE: u64 = 512;
const NAME_LEN: usize = 100;
const PREFIX_LEN: usize = 155;
const TYPE_FILE: u8 = b'0';
const TYPE_DIR: u8 = b'5';

struct TarRecord {
    name: String,
    size: u64,
    mtime: u64,
    is_directory: bool,
    data_offset: u64,
}

/// Accessor over a TAR container.
pub struct TarArchiveAccess<'s> {
    stream: Box<dyn ArchiveStream + 's>,
    mode: AccessMode,
    entries: Vec<ArchiveEntry>,
    records: Vec<TarRecord>,
    /// Offset of the archive trailer (the first zero block).
    trailer_offset: u64,
    dirty: bool,
}

impl<'s> TarArchiveAccess<'s> {
    /// Binds an accessor to `stream` in the given mode.
    ///
    /// `Read` and `Update` scan existing header blocks (an empty stream is
    /// an empty archive); `Create` requires an empty stream.
    pub fn new(mut stream: Box<dyn ArchiveStream + 's>, mode: AccessMode) -> Result<Self> {
        let len = stream_len(&mut *stream)?;
        if mode == AccessMode::Create && len != 0 {
            return Err(Error::invalid_operation(
                "cannot open a non-empty stream in Create mode",
            ));
        }
        let (records, trailer_offset) = match mode {
            AccessMode::Create => (Vec::new(), 0),
            AccessMode::Read | AccessMode::Update => scan_records(&mut *stream, len)?,
        };
        let entries = records.iter().map(record_entry).collect();
        Ok(Self {
            stream,
            mode,
            entries,
            records,
            trailer_offset,
            // A fresh stream needs its trailer even with no entries.
            dirty: mode != AccessMode::Read && len == 0,
        })
    }
}

impl ArchiveAccess for TarArchiveAccess<'_> {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Tar
    }

    fn mode(&self) -> AccessMode {
        self.mode
    }

    fn is_archive(&self) -> bool {
        true
    }

    /// TAR stores entry data verbatim.
    fn is_compressed(&self) -> bool {
        false
    }

    fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    fn open_entry<'a>(&'a mut self, name: &str) -> Result<Option<Box<dyn Read + 'a>>> {
        let Some(record) = self.records.iter().find(|r| r.name == name) else {
            return Ok(None);
        };
        self.stream.seek(SeekFrom::Start(record.data_offset))?;
        Ok(Some(Box::new((&mut *self.stream).take(record.size))))
    }

    fn create_entry(&mut self, name: &str, data: &mut dyn Read) -> Result<ArchiveEntry> {
        if self.mode == AccessMode::Read {
            return Err(Error::invalid_operation(
                "cannot create entries through a Read-mode accessor",
            ));
        }
        if name.is_empty() {
            return Err(Error::invalid_argument("name", "must not be empty"));
        }
        if self.find_entry(name).is_some() {
            return Err(Error::EntryExists { path: name.into() });
        }

        let is_directory = name.ends_with('/');
        let mut payload = Vec::new();
        data.read_to_end(&mut payload)?;
        if is_directory && !payload.is_empty() {
            return Err(Error::invalid_argument(
                "name",
                "directory entries cannot carry data",
            ));
        }

        let mtime = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let header = build_header(name, payload.len() as u64, mtime, is_directory)?;

        self.stream.seek(SeekFrom::Start(self.trailer_offset))?;
        self.stream.write_all(&header)?;
        self.stream.write_all(&payload)?;
        let padding = payload.len().next_multiple_of(BLOCK_SIZE as usize) - payload.len();
        self.stream.write_all(&vec![0u8; padding])?;

        let data_offset = self.trailer_offset + BLOCK_SIZE;
        self.trailer_offset = data_offset + (payload.len() + padding) as u64;
        self.dirty = true;

        let record = TarRecord {
            name: name.to_string(),
            size: payload.len() as u64,
            mtime,
            is_directory,
            data_offset,
        };
        let entry = record_entry(&record);
        self.records.push(record);
        self.entries.push(entry.clone());
        Ok(entry)
    }

    fn delete_entry(&mut self, name: &str) -> Result<bool> {
        if self.find_entry(name).is_none() {
            return Ok(false);
        }
        if self.mode == AccessMode::Read {
            return Err(Error::invalid_operation(
                "cannot delete entries through a Read-mode accessor",
            ));
        }
        Err(Error::not_supported(
            "TAR does not support deleting entries",
        ))
    }

    fn finish(&mut self) -> Result<()> {
        if self.mode == AccessMode::Read || !self.dirty {
            return Ok(());
        }
        self.stream.seek(SeekFrom::Start(self.trailer_offset))?;
        self.stream.write_all(&[0u8; 2 * BLOCK_SIZE as usize])?;
        self.stream.flush()?;
        self.dirty = false;
        Ok(())
    }
}

impl Drop for TarArchiveAccess<'_> {
    fn drop(&mut self) {
        if self.dirty {
            log::error!("TAR accessor dropped without its trailer; call finish()");
        }
    }
}

fn record_entry(record: &TarRecord) -> ArchiveEntry {
    ArchiveEntry {
        name: record.name.clone(),
        length: record.size as i64,
        modified: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(record.mtime)),
        is_directory: record.is_directory,
        crc32: None,
    }
}

/// Scans header blocks until the trailer or end of stream, returning the
/// records and the trailer offset.
fn scan_records(
    stream: &mut (dyn ArchiveStream + '_),
    len: u64,
) -> Result<(Vec<TarRecord>, u64)> {
    let mut records = Vec::new();
    let mut offset = 0u64;
    let mut block = [0u8; BLOCK_SIZE as usize];

    while offset + BLOCK_SIZE <= len {
        stream.seek(SeekFrom::Start(offset))?;
        stream.read_exact(&mut block)?;
        if block.iter().all(|&b| b == 0) {
            return Ok((records, offset));
        }

        verify_checksum(&block, offset)?;
        let size = parse_octal(&block[124..136], offset)?;
        let mtime = parse_octal(&block[136..148], offset)?;
        let type_flag = block[156];
        let padded = size.next_multiple_of(BLOCK_SIZE);

        // Only regular files and directories surface as entries; link and
        // special-file headers are skipped along with their payload.
        if matches!(type_flag, TYPE_FILE | 0 | TYPE_DIR) {
            let mut name = header_name(&block, offset)?;
            let is_directory = type_flag == TYPE_DIR;
            if is_directory && !name.ends_with('/') {
                name.push('/');
            }
            records.push(TarRecord {
                name,
                size,
                mtime,
                is_directory,
                data_offset: offset + BLOCK_SIZE,
            });
        }
        offset += BLOCK_SIZE + padded;
    }
    Ok((records, len.min(offset)))
}

/// Joins the ustar prefix and name fields into a forward-slash path.
fn header_name(block: &[u8], offset: u64) -> Result<String> {
    let name = field_str(&block[..NAME_LEN]);
    if name.is_empty() {
        return Err(Error::invalid_operation(format!(
            "empty name in tar header at offset {offset}"
        )));
    }
    let prefix = field_str(&block[345..345 + PREFIX_LEN]);
    if prefix.is_empty() {
        Ok(name)
    } else {
        Ok(format!("{prefix}/{name}"))
    }
}

fn field_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn parse_octal(field: &[u8], offset: u64) -> Result<u64> {
    let end = field
        .iter()
        .position(|&b| b == 0 || b == b' ')
        .unwrap_or(field.len());
    let trimmed = &field[..end];
    if trimmed.is_empty() {
        return Ok(0);
    }
    let mut value = 0u64;
    for &byte in trimmed {
        if !(b'0'..=b'7').contains(&byte) {
            return Err(Error::invalid_operation(format!(
                "bad octal field in tar header at offset {offset}"
            )));
        }
        value = value * 8 + u64::from(byte - b'0');
    }
    Ok(value)
}

/// Validates the header checksum: the unsigned byte sum of the block with
/// the checksum field itself treated as spaces.
fn verify_checksum(block: &[u8], offset: u64) -> Result<()> {
    let recorded = parse_octal(&block[148..156], offset)?;
    let mut sum = 0u64;
    for (index, &byte) in block.iter().enumerate() {
        sum += if (148..156).contains(&index) {
            u64::from(b' ')
        } else {
            u64::from(byte)
        };
    }
    if sum != recorded {
        return Err(Error::invalid_operation(format!(
            "bad tar header checksum at offset {offset}: expected {recorded}, computed {sum}"
        )));
    }
    Ok(())
}

/// Builds a ustar header block, splitting long names across the prefix
/// field when needed.
fn build_header(name: &str, size: u64, mtime: u64, is_directory: bool) -> Result<[u8; 512]> {
    let (prefix, base) = split_ustar_name(name)?;

    let mut block = [0u8; 512];
    block[..base.len()].copy_from_slice(base.as_bytes());
    let mode: &[u8] = if is_directory { b"0000755" } else { b"0000644" };
    block[100..107].copy_from_slice(mode);
    block[108..115].copy_from_slice(b"0000000"); // uid
    block[116..123].copy_from_slice(b"0000000"); // gid
    block[124..136].copy_from_slice(format!("{size:011o}\0").as_bytes());
    block[136..148].copy_from_slice(format!("{mtime:011o}\0").as_bytes());
    block[156] = if is_directory { TYPE_DIR } else { TYPE_FILE };
    block[257..263].copy_from_slice(b"ustar\0");
    block[263..265].copy_from_slice(b"00");
    block[345..345 + prefix.len()].copy_from_slice(prefix.as_bytes());

    let mut sum = 0u64;
    for (index, &byte) in block.iter().enumerate() {
        sum += if (148..156).contains(&index) {
            u64::from(b' ')
        } else {
            u64::from(byte)
        };
    }
    block[148..156].copy_from_slice(format!("{sum:06o}\0 ").as_bytes());
    Ok(block)
}

/// Splits `name` into (prefix, name) fields. Names up to 100 bytes need no
/// prefix; longer ones split at a `/` so both halves fit their fields.
fn split_ustar_name(name: &str) -> Result<(&str, &str)> {
    if name.len() <= NAME_LEN {
        return Ok(("", name));
    }
    for (index, _) in name.match_indices('/') {
        let (prefix, rest) = (&name[..index], &name[index + 1..]);
        if prefix.len() <= PREFIX_LEN && !rest.is_empty() && rest.len() <= NAME_LEN {
            return Ok((prefix, rest));
        }
    }
    Err(Error::invalid_argument(
        "name",
        format!("'{name}' does not fit ustar name fields"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn open(buf: &mut Vec<u8>, mode: AccessMode) -> TarArchiveAccess<'_> {
        TarArchiveAccess::new(Box::new(Cursor::new(buf)), mode).unwrap()
    }

    fn read_entry(access: &mut TarArchiveAccess<'_>, name: &str) -> Vec<u8> {
        let mut reader = access.open_entry(name).unwrap().expect("entry exists");
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_attributes() {
        let mut buf = Vec::new();
        let access = open(&mut buf, AccessMode::Create);
        assert_eq!(access.format(), ArchiveFormat::Tar);
        assert!(access.is_archive());
        assert!(!access.is_compressed());
    }

    #[test]
    fn test_create_then_read_roundtrip() {
        let mut buf = Vec::new();
        {
            let mut access = open(&mut buf, AccessMode::Create);
            access
                .create_entry("dir/file.txt", &mut &b"tar data here"[..])
                .unwrap();
            access.create_entry("dir/", &mut std::io::empty()).unwrap();
            access.finish().unwrap();
        }
        // Trailer plus two 512-byte entries (one with a payload block).
        assert_eq!(buf.len() as u64 % BLOCK_SIZE, 0);

        let mut access = open(&mut buf, AccessMode::Read);
        let names: Vec<_> = access.entries().iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec!["dir/file.txt", "dir/"]);

        let entry = access.find_entry("dir/file.txt").unwrap();
        assert_eq!(entry.length, 13);
        assert!(!entry.is_directory);
        assert_eq!(entry.crc32, None);
        assert!(entry.modified.is_some());
        assert!(access.find_entry("dir/").unwrap().is_directory);

        assert_eq!(read_entry(&mut access, "dir/file.txt"), b"tar data here");
    }

    #[test]
    fn test_payload_padded_to_block_boundary() {
        let mut buf = Vec::new();
        {
            let mut access = open(&mut buf, AccessMode::Create);
            access
                .create_entry("exact.bin", &mut &vec![7u8; 512][..])
                .unwrap();
            access.create_entry("after.txt", &mut &b"next"[..]).unwrap();
            access.finish().unwrap();
        }
        let mut access = open(&mut buf, AccessMode::Read);
        assert_eq!(read_entry(&mut access, "exact.bin"), vec![7u8; 512]);
        assert_eq!(read_entry(&mut access, "after.txt"), b"next");
    }

    #[test]
    fn test_update_appends_entries() {
        let mut buf = Vec::new();
        {
            let mut access = open(&mut buf, AccessMode::Create);
            access.create_entry("first.txt", &mut &b"one"[..]).unwrap();
            access.finish().unwrap();
        }
        {
            let mut access = open(&mut buf, AccessMode::Update);
            assert_eq!(access.entries().len(), 1);
            access.create_entry("second.txt", &mut &b"two"[..]).unwrap();
            access.finish().unwrap();
        }
        let mut access = open(&mut buf, AccessMode::Read);
        let names: Vec<_> = access.entries().iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec!["first.txt", "second.txt"]);
        assert_eq!(read_entry(&mut access, "first.txt"), b"one");
        assert_eq!(read_entry(&mut access, "second.txt"), b"two");
    }

    #[test]
    fn test_long_name_uses_prefix_field() {
        let long_dir = "a/".repeat(40); // 80 bytes of directories
        let name = format!("{long_dir}{}", "f".repeat(90));
        assert!(name.len() > NAME_LEN);

        let mut buf = Vec::new();
        {
            let mut access = open(&mut buf, AccessMode::Create);
            access.create_entry(&name, &mut &b"deep"[..]).unwrap();
            access.finish().unwrap();
        }
        let mut access = open(&mut buf, AccessMode::Read);
        assert_eq!(access.entries()[0].name, name);
        assert_eq!(read_entry(&mut access, &name), b"deep");
    }

    #[test]
    fn test_unsplittable_long_name_is_rejected() {
        let name = "x".repeat(150);
        let mut buf = Vec::new();
        let mut access = open(&mut buf, AccessMode::Create);
        let err = access.create_entry(&name, &mut &b"d"[..]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
        access.finish().unwrap();
    }

    #[test]
    fn test_read_empty_stream_is_empty_archive() {
        let mut buf = Vec::new();
        let mut access = open(&mut buf, AccessMode::Read);
        assert!(access.entries().is_empty());
        assert!(access.open_entry("anything").unwrap().is_none());
        assert!(!access.delete_entry("anything").unwrap());
    }

    #[test]
    fn test_corrupt_checksum_is_rejected() {
        let mut buf = Vec::new();
        {
            let mut access = open(&mut buf, AccessMode::Create);
            access.create_entry("a.txt", &mut &b"data"[..]).unwrap();
            access.finish().unwrap();
        }
        buf[0] ^= 0xFF; // clobber the name without fixing the checksum
        let result = TarArchiveAccess::new(Box::new(Cursor::new(&mut buf)), AccessMode::Read);
        assert!(matches!(result, Err(Error::InvalidOperation { .. })));
    }

    #[test]
    fn test_mutation_rules() {
        let mut buf = Vec::new();
        {
            let mut access = open(&mut buf, AccessMode::Create);
            access.create_entry("a.txt", &mut &b"data"[..]).unwrap();
            let err = access.create_entry("a.txt", &mut &b"dup"[..]).unwrap_err();
            assert!(matches!(err, Error::EntryExists { .. }));
            access.finish().unwrap();
        }
        {
            let mut access = open(&mut buf, AccessMode::Read);
            let err = access.create_entry("b.txt", &mut &b"x"[..]).unwrap_err();
            assert!(matches!(err, Error::InvalidOperation { .. }));
            let err = access.delete_entry("a.txt").unwrap_err();
            assert!(matches!(err, Error::InvalidOperation { .. }));
        }
        let mut access = open(&mut buf, AccessMode::Update);
        let err = access.delete_entry("a.txt").unwrap_err();
        assert!(err.is_unsupported());
        assert!(!access.delete_entry("missing.txt").unwrap());
    }

    #[test]
    fn test_create_rejects_non_empty_stream() {
        let mut buf = vec![1u8; 512];
        let result = TarArchiveAccess::new(Box::new(Cursor::new(&mut buf)), AccessMode::Create);
        assert!(matches!(result, Err(Error::InvalidOperation { .. })));
    }

    #[test]
    fn test_octal_parsing() {
        assert_eq!(parse_octal(b"0000644\0", 0).unwrap(), 0o644);
        assert_eq!(parse_octal(b"777 ", 0).unwrap(), 0o777);
        assert_eq!(parse_octal(b"\0\0\0\0", 0).unwrap(), 0);
        assert!(parse_octal(b"9bad", 0).is_err());
    }
}
