//! Low-level GZIP member framing (RFC 1952).
//!
//! A GZIP byte stream is a sequence of one or more independently-compressed
//! *members*, each framed as a variable-length header, a raw deflate
//! payload, and an 8-byte CRC-32 + size footer. [`inflate`] decodes one
//! member header from the current stream position; [`member_entries`] scans
//! a whole stream, locating each member's payload boundary through the
//! deflate stream's natural end.
//!
//! Scanning is deliberately fault-tolerant: a corrupted or truncated stream
//! yields the successfully parsed prefix of members rather than an error,
//! since callers routinely probe untrusted or partially-downloaded files.

use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::time::{Duration, SystemTime};

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::DeflateDecoder;

use crate::error::{Error, Result};

/// GZIP magic bytes.
pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// Member name used when the header carries no FNAME field.
pub const DEFAULT_MEMBER_NAME: &str = "file.dat";

const CM_DEFLATE: u8 = 8;
const FLAG_FHCRC: u8 = 0x02;
const FLAG_FEXTRA: u8 = 0x04;
const FLAG_FNAME: u8 = 0x08;
const FLAG_FCOMMENT: u8 = 0x10;
const FLAG_RESERVED: u8 = 0xE0;

/// The fixed portion of a member header: magic, method, flags, mtime, extra
/// flags, OS byte.
const FIXED_HEADER_LEN: usize = 10;

/// One physical GZIP member within a (possibly concatenated) byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GzipMemberEntry {
    /// Name from the header's FNAME field, or [`DEFAULT_MEMBER_NAME`];
    /// disambiguated with a numeric suffix by [`member_entries`] when
    /// concatenated members collide.
    pub name: String,
    /// Byte offset of the member's first header byte within the stream.
    pub offset: u64,
    /// Uncompressed payload length from the member footer, or -1 until the
    /// payload has been decoded.
    pub length: i64,
    /// CRC-32 of the uncompressed payload from the member footer, once the
    /// payload has been decoded.
    pub crc32: Option<u32>,
    /// Modification time from the header, when nonzero.
    pub modified: Option<SystemTime>,
    /// The OS byte identifying the encoding operating system.
    pub operating_system: u8,
    /// Exact number of header bytes consumed by [`inflate`]; at least 10.
    pub deserialize_byte_count: usize,
}

impl GzipMemberEntry {
    /// Serialized size of this entry. Always -1: parsed members cannot be
    /// re-serialized standalone.
    pub fn serialize_byte_count(&self) -> i64 {
        -1
    }

    /// Round-tripping a parsed member back to bytes is intentionally
    /// unimplemented; this always fails.
    pub fn serialize(&self, _writer: &mut dyn Write) -> Result<()> {
        Err(Error::not_supported(
            "GZIP member entries cannot be re-serialized",
        ))
    }
}

/// Decodes one GZIP member header from the current position of `reader`.
///
/// The compressed payload is not consumed; on return the reader is
/// positioned at the first byte of the deflate stream. `offset` is the
/// stream offset of the header's first byte and is recorded verbatim in the
/// returned entry.
///
/// # Errors
///
/// [`Error::InvalidOperation`] identifying the offending field for a bad
/// magic, a non-deflate compression method, or nonzero reserved flag bits.
/// I/O errors (including truncation) pass through as [`Error::Io`].
pub fn inflate<R: Read + ?Sized>(reader: &mut R, offset: u64) -> Result<GzipMemberEntry> {
    let mut consumed = 0usize;

    let mut magic = [0u8; 2];
    reader.read_exact(&mut magic)?;
    consumed += 2;
    if magic != GZIP_MAGIC {
        return Err(Error::invalid_operation(format!(
            "bad GZIP magic {:#04x} {:#04x} at offset {offset}",
            magic[0], magic[1]
        )));
    }

    let method = reader.read_u8()?;
    consumed += 1;
    if method != CM_DEFLATE {
        return Err(Error::invalid_operation(format!(
            "unsupported GZIP compression method {method} (expected deflate)"
        )));
    }

    let flags = reader.read_u8()?;
    consumed += 1;
    if flags & FLAG_RESERVED != 0 {
        return Err(Error::invalid_operation(format!(
            "reserved GZIP flag bits set: {flags:#04x}"
        )));
    }

    let mtime = reader.read_u32::<LittleEndian>()?;
    let _extra_flags = reader.read_u8()?;
    let operating_system = reader.read_u8()?;
    consumed += 6;
    debug_assert_eq!(consumed, FIXED_HEADER_LEN);

    if flags & FLAG_FEXTRA != 0 {
        let extra_len = reader.read_u16::<LittleEndian>()? as usize;
        consumed += 2;
        let mut extra = vec![0u8; extra_len];
        reader.read_exact(&mut extra)?;
        consumed += extra_len;
    }

    let mut name = None;
    if flags & FLAG_FNAME != 0 {
        let raw = read_null_terminated(reader, &mut consumed)?;
        name = Some(String::from_utf8_lossy(&raw).into_owned());
    }

    if flags & FLAG_FCOMMENT != 0 {
        read_null_terminated(reader, &mut consumed)?;
    }

    if flags & FLAG_FHCRC != 0 {
        let _header_crc = reader.read_u16::<LittleEndian>()?;
        consumed += 2;
    }

    Ok(GzipMemberEntry {
        name: name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_MEMBER_NAME.to_string()),
        offset,
        length: -1,
        crc32: None,
        modified: (mtime != 0).then(|| SystemTime::UNIX_EPOCH + Duration::from_secs(mtime as u64)),
        operating_system,
        deserialize_byte_count: consumed,
    })
}

fn read_null_terminated<R: Read + ?Sized>(
    reader: &mut R,
    consumed: &mut usize,
) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    loop {
        let byte = reader.read_u8()?;
        *consumed += 1;
        if byte == 0 {
            return Ok(bytes);
        }
        bytes.push(byte);
    }
}

/// Scans `stream` for concatenated GZIP members, yielding up to
/// `max_entries` of them (all, when `None`) in offset order.
///
/// Each member's payload is decoded to locate its footer and the start of
/// the next member, so the yielded entries carry their footer length and
/// CRC-32. The scan terminates cleanly, yielding only the prefix parsed so
/// far, on the first corrupt or truncated member; the fault is logged, not
/// propagated.
pub fn member_entries<R: Read + Seek>(stream: R, max_entries: Option<usize>) -> MemberEntries<R> {
    MemberEntries {
        stream,
        next_offset: 0,
        yielded: 0,
        max_entries,
        name_counts: HashMap::new(),
        done: false,
    }
}

/// Lazy iterator over the members of a GZIP stream. See [`member_entries`].
pub struct MemberEntries<R> {
    stream: R,
    next_offset: u64,
    yielded: usize,
    max_entries: Option<usize>,
    name_counts: HashMap<String, usize>,
    done: bool,
}

impl<R: Read + Seek> MemberEntries<R> {
    fn next_member(&mut self) -> Result<Option<GzipMemberEntry>> {
        let len = self.stream.seek(SeekFrom::End(0))?;
        if self.next_offset >= len {
            return Ok(None);
        }
        self.stream.seek(SeekFrom::Start(self.next_offset))?;

        let mut entry = inflate(&mut self.stream, self.next_offset)?;
        let header_end = self.next_offset + entry.deserialize_byte_count as u64;

        // The deflate decoder buffers reads from the stream, so the stream
        // position after decoding overshoots; total_in() gives the exact
        // compressed payload size.
        self.stream.seek(SeekFrom::Start(header_end))?;
        let mut decoder = DeflateDecoder::new(&mut self.stream);
        let decoded = io::copy(&mut decoder, &mut io::sink())?;
        let payload_len = decoder.total_in();

        self.stream.seek(SeekFrom::Start(header_end + payload_len))?;
        let crc32 = self.stream.read_u32::<LittleEndian>()?;
        let footer_size = self.stream.read_u32::<LittleEndian>()?;
        if u64::from(footer_size) != decoded & 0xFFFF_FFFF {
            log::warn!(
                "GZIP member at offset {} reports size {} but decoded {} bytes",
                entry.offset,
                footer_size,
                decoded
            );
        }
        entry.crc32 = Some(crc32);
        entry.length = i64::from(footer_size);
        entry.name = self.disambiguate(entry.name);

        self.next_offset = header_end + payload_len + 8;
        Ok(Some(entry))
    }

    /// Appends `_N` before the extension of names already seen in this scan:
    /// `file.dat`, `file_1.dat`, `file_2.dat`, ...
    fn disambiguate(&mut self, name: String) -> String {
        let seen = self.name_counts.entry(name.clone()).or_insert(0);
        *seen += 1;
        let repeat = *seen - 1;
        if repeat == 0 {
            return name;
        }
        match name.rfind('.') {
            Some(dot) => format!("{}_{repeat}{}", &name[..dot], &name[dot..]),
            None => format!("{name}_{repeat}"),
        }
    }
}

impl<R: Read + Seek> Iterator for MemberEntries<R> {
    type Item = GzipMemberEntry;

    fn next(&mut self) -> Option<GzipMemberEntry> {
        if self.done || self.max_entries.is_some_and(|max| self.yielded >= max) {
            return None;
        }
        match self.next_member() {
            Ok(Some(entry)) => {
                self.yielded += 1;
                Some(entry)
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                log::warn!(
                    "GZIP member scan stopped at offset {}: {err}",
                    self.next_offset
                );
                self.done = true;
                None
            }
        }
    }
}
