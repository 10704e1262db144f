//! GZIP accessor: multi-member read, single-member authoring.
//!
//! Reading scans the stream with [`crate::gzip_member::member_entries`], so
//! concatenated members each surface as an entry. Authoring follows the
//! format's single-payload nature: exactly one entry may be created, and the
//! target stream must start empty.

use std::io::{Read, Seek, SeekFrom, Write};
use std::time::SystemTime;

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::DeflateEncoder;

use crate::access::{AccessMode, ArchiveAccess, ArchiveEntry, ArchiveStream, stream_len};
use crate::error::{Error, Result};
use crate::format::ArchiveFormat;
use crate::gzip_member::{GZIP_MAGIC, GzipMemberEntry, member_entries};

const CM_DEFLATE: u8 = 8;
const FLAG_FNAME: u8 = 0x08;
const OS_UNKNOWN: u8 = 255;

/// Accessor over a GZIP member stream.
pub struct GzipArchiveAccess<'s> {
    stream: Box<dyn ArchiveStream + 's>,
    mode: AccessMode,
    entries: Vec<ArchiveEntry>,
    members: Vec<GzipMemberEntry>,
}

impl<'s> GzipArchiveAccess<'s> {
    /// Binds an accessor to `stream` in the given mode.
    ///
    /// In `Read` mode the stream is scanned for members immediately. In
    /// `Create` and `Update` modes the stream must be empty: GZIP supports
    /// only a single logical payload member when being authored, so there is
    /// no meaningful way to update existing content in place.
    pub fn new(mut stream: Box<dyn ArchiveStream + 's>, mode: AccessMode) -> Result<Self> {
        let members = match mode {
            AccessMode::Read => member_entries(&mut *stream, None).collect::<Vec<_>>(),
            AccessMode::Create | AccessMode::Update => {
                if stream_len(&mut *stream)? != 0 {
                    return Err(Error::invalid_operation(format!(
                        "cannot open a non-empty GZIP stream in {mode} mode"
                    )));
                }
                Vec::new()
            }
        };
        let entries = members
            .iter()
            .map(|m| {
                ArchiveEntry::file(m.name.clone(), m.length)
                    .with_modified(m.modified)
                    .with_crc32(m.crc32)
            })
            .collect();
        Ok(Self {
            stream,
            mode,
            entries,
            members,
        })
    }

    fn write_member_header(&mut self, name: &str) -> Result<()> {
        let mtime = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        self.stream.write_all(&GZIP_MAGIC)?;
        self.stream.write_u8(CM_DEFLATE)?;
        self.stream.write_u8(FLAG_FNAME)?;
        self.stream.write_u32::<LittleEndian>(mtime)?;
        self.stream.write_u8(0)?; // extra flags
        self.stream.write_u8(OS_UNKNOWN)?;
        self.stream.write_all(name.as_bytes())?;
        self.stream.write_u8(0)?;
        Ok(())
    }
}

impl ArchiveAccess for GzipArchiveAccess<'_> {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::GZip
    }

    fn mode(&self) -> AccessMode {
        self.mode
    }

    /// GZIP is a single-stream container, not a multi-entry archive.
    fn is_archive(&self) -> bool {
        false
    }

    fn is_compressed(&self) -> bool {
        true
    }

    fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    fn open_entry<'a>(&'a mut self, name: &str) -> Result<Option<Box<dyn Read + 'a>>> {
        let Some(index) = self.entries.iter().position(|e| e.name == name) else {
            return Ok(None);
        };
        // Entries created through this accessor start at offset zero; the
        // decoder stops at the member boundary either way.
        let offset = self.members.get(index).map_or(0, |m| m.offset);
        self.stream.seek(SeekFrom::Start(offset))?;
        Ok(Some(Box::new(GzDecoder::new(&mut *self.stream))))
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
        if !self.entries.is_empty() {
            return Err(Error::not_supported(
                "a GZIP container holds a single member; cannot create another entry",
            ));
        }

        self.write_member_header(name)?;

        let mut hasher = crc32fast::Hasher::new();
        let mut length = 0u64;
        let mut encoder = DeflateEncoder::new(&mut *self.stream, Compression::default());
        let mut buf = [0u8; 8192];
        loop {
            let count = data.read(&mut buf)?;
            if count == 0 {
                break;
            }
            hasher.update(&buf[..count]);
            length += count as u64;
            encoder.write_all(&buf[..count])?;
        }
        encoder.finish()?;

        let crc32 = hasher.finalize();
        self.stream.write_u32::<LittleEndian>(crc32)?;
        self.stream.write_u32::<LittleEndian>(length as u32)?;
        self.stream.flush()?;

        let entry = ArchiveEntry::file(name, length as i64)
            .with_modified(Some(SystemTime::now()))
            .with_crc32(Some(crc32));
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
            "GZIP does not support deleting members",
        ))
    }

    fn finish(&mut self) -> Result<()> {
        // Member data and footer are committed by create_entry.
        if self.mode != AccessMode::Read {
            self.stream.flush()?;
        }
        Ok(())
    }
}
