//! ZIP accessor: read, create, and update support.
//!
//! Reading walks the central directory located through the end-of-central-
//! directory record, which is found by scanning the stream tail backwards
//! for its magic. Writing keeps pending entries in memory (compressed) and
//! rewrites local headers, the central directory, and the trailer on
//! [`ArchiveAccess::finish`]. Update mode loads existing entries into the
//! pending set so deletions and additions rewrite the whole container.
//!
//! Stored and deflated entries are supported; ZIP64 and encrypted entries
//! are rejected as unsupported.

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::time::{Duration, SystemTime};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Datelike, Timelike, Utc};
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use memchr::memmem;

use crate::access::{AccessMode, ArchiveAccess, ArchiveEntry, ArchiveStream, stream_len};
use crate::crc::Crc32Reader;
use crate::error::{Error, Result};
use crate::format::ArchiveFormat;

const LOCAL_HEADER_MAGIC: u32 = 0x0403_4B50;
const CENTRAL_HEADER_MAGIC: u32 = 0x0201_4B50;
const EOCDR_MAGIC: &[u8; 4] = b"PK\x05\x06";
/// Fixed EOCDR size plus the maximum comment length.
const MAX_EOCDR_SEARCH: u64 = 22 + u16::MAX as u64;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;
const FLAG_ENCRYPTED: u16 = 0x0001;
const FLAG_UTF8: u16 = 0x0800;
const VERSION_NEEDED: u16 = 20;

/// One central-directory record of an existing archive.
struct ZipRecord {
    name: String,
    method: u16,
    flags: u16,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    dos_time: u16,
    dos_date: u16,
    local_header_offset: u32,
}

impl ZipRecord {
    fn is_directory(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// An entry awaiting commit, held compressed in memory.
struct PendingEntry {
    name: String,
    method: u16,
    crc32: u32,
    dos_time: u16,
    dos_date: u16,
    compressed: Vec<u8>,
    uncompressed_size: u32,
}

/// Accessor over a ZIP container.
pub struct ZipArchiveAccess<'s> {
    stream: Box<dyn ArchiveStream + 's>,
    mode: AccessMode,
    entries: Vec<ArchiveEntry>,
    /// Central-directory records; populated in Read mode only.
    records: Vec<ZipRecord>,
    /// Entries to write on commit; populated in Create/Update modes.
    pending: Vec<PendingEntry>,
    /// Stream length at open time, used to blank stale trailing bytes when
    /// a rewrite shrinks the container.
    initial_len: u64,
    dirty: bool,
}

impl<'s> ZipArchiveAccess<'s> {
    /// Binds an accessor to `stream` in the given mode.
    ///
    /// `Read` parses the central directory (an empty stream yields an empty
    /// archive). `Create` requires an empty stream. `Update` accepts either
    /// and loads any existing entries for rewriting.
    pub fn new(mut stream: Box<dyn ArchiveStream + 's>, mode: AccessMode) -> Result<Self> {
        let initial_len = stream_len(&mut *stream)?;
        let mut access = Self {
            stream,
            mode,
            entries: Vec::new(),
            records: Vec::new(),
            pending: Vec::new(),
            initial_len,
            dirty: false,
        };
        match mode {
            AccessMode::Read => {
                access.records = parse_central_directory(&mut *access.stream, initial_len)?;
                access.entries = access.records.iter().map(record_entry).collect();
            }
            AccessMode::Create => {
                if initial_len != 0 {
                    return Err(Error::invalid_operation(
                        "cannot open a non-empty stream in Create mode",
                    ));
                }
                // Even an entry-less archive needs its trailer written.
                access.dirty = true;
            }
            AccessMode::Update => {
                access.dirty = initial_len == 0;
                let records = parse_central_directory(&mut *access.stream, initial_len)?;
                for record in records {
                    let compressed = read_raw_entry_data(&mut *access.stream, &record)?;
                    access.pending.push(PendingEntry {
                        name: record.name,
                        method: record.method,
                        crc32: record.crc32,
                        dos_time: record.dos_time,
                        dos_date: record.dos_date,
                        compressed,
                        uncompressed_size: record.uncompressed_size,
                    });
                }
                access.rebuild_entries();
            }
        }
        Ok(access)
    }

    fn rebuild_entries(&mut self) {
        self.entries = self.pending.iter().map(pending_entry).collect();
    }

    fn commit(&mut self) -> Result<()> {
        self.stream.seek(SeekFrom::Start(0))?;
        let mut offsets = Vec::with_capacity(self.pending.len());
        for entry in &self.pending {
            let offset = self.stream.stream_position()?;
            offsets.push(u32::try_from(offset).map_err(|_| {
                Error::not_supported("archive exceeds 4 GiB; ZIP64 is not supported")
            })?);
            write_local_header(&mut *self.stream, entry)?;
            self.stream.write_all(&entry.compressed)?;
        }

        let central_offset = self.stream.stream_position()?;
        for (entry, offset) in self.pending.iter().zip(&offsets) {
            write_central_header(&mut *self.stream, entry, *offset)?;
        }
        let central_end = self.stream.stream_position()?;

        self.stream.write_all(EOCDR_MAGIC)?;
        self.stream.write_u16::<LittleEndian>(0)?; // this disk
        self.stream.write_u16::<LittleEndian>(0)?; // central directory disk
        let count = u16::try_from(self.pending.len())
            .map_err(|_| Error::not_supported("more than 65535 entries requires ZIP64"))?;
        self.stream.write_u16::<LittleEndian>(count)?;
        self.stream.write_u16::<LittleEndian>(count)?;
        let central_size = u32::try_from(central_end - central_offset).map_err(|_| {
            Error::not_supported("central directory exceeds 4 GiB; ZIP64 is not supported")
        })?;
        let central_start = u32::try_from(central_offset).map_err(|_| {
            Error::not_supported("archive exceeds 4 GiB; ZIP64 is not supported")
        })?;
        self.stream.write_u32::<LittleEndian>(central_size)?;
        self.stream.write_u32::<LittleEndian>(central_start)?;
        self.stream.write_u16::<LittleEndian>(0)?; // comment length

        // Blank out stale bytes from a previously longer archive so a later
        // EOCDR scan cannot land on the old trailer.
        let new_len = self.stream.stream_position()?;
        if self.initial_len > new_len {
            let mut remaining = self.initial_len - new_len;
            let zeros = [0u8; 4096];
            while remaining > 0 {
                let chunk = remaining.min(zeros.len() as u64) as usize;
                self.stream.write_all(&zeros[..chunk])?;
                remaining -= chunk as u64;
            }
        }
        self.initial_len = self.initial_len.max(new_len);
        self.stream.flush()?;
        self.dirty = false;
        Ok(())
    }
}

impl ArchiveAccess for ZipArchiveAccess<'_> {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
    }

    fn mode(&self) -> AccessMode {
        self.mode
    }

    fn is_archive(&self) -> bool {
        true
    }

    fn is_compressed(&self) -> bool {
        true
    }

    fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    fn open_entry<'a>(&'a mut self, name: &str) -> Result<Option<Box<dyn Read + 'a>>> {
        if self.mode == AccessMode::Read {
            let Some(record) = self.records.iter().find(|r| r.name == name) else {
                return Ok(None);
            };
            if record.flags & FLAG_ENCRYPTED != 0 {
                return Err(Error::not_supported("encrypted ZIP entries"));
            }
            let data_offset = seek_past_local_header(&mut *self.stream, record)?;
            self.stream.seek(SeekFrom::Start(data_offset))?;
            let raw = (&mut *self.stream).take(u64::from(record.compressed_size));
            decode_entry(raw, record.method, record.crc32, &record.name).map(Some)
        } else {
            let Some(entry) = self.pending.iter().find(|e| e.name == name) else {
                return Ok(None);
            };
            let raw = Cursor::new(entry.compressed.as_slice());
            decode_entry(raw, entry.method, entry.crc32, &entry.name).map(Some)
        }
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

        let mut raw = Vec::new();
        data.read_to_end(&mut raw)?;
        if name.ends_with('/') && !raw.is_empty() {
            return Err(Error::invalid_argument(
                "name",
                "directory entries cannot carry data",
            ));
        }
        let uncompressed_size = u32::try_from(raw.len())
            .map_err(|_| Error::not_supported("entries over 4 GiB require ZIP64"))?;
        let crc32 = crc32fast::hash(&raw);
        let (method, compressed) = if raw.is_empty() {
            (METHOD_STORED, raw)
        } else {
            (METHOD_DEFLATED, deflate_bytes(&raw)?)
        };
        let (dos_date, dos_time) = dos_date_time(SystemTime::now());

        self.pending.push(PendingEntry {
            name: name.to_string(),
            method,
            crc32,
            dos_time,
            dos_date,
            compressed,
            uncompressed_size,
        });
        self.dirty = true;
        self.rebuild_entries();
        Ok(self.entries.last().expect("entry just added").clone())
    }

    fn delete_entry(&mut self, name: &str) -> Result<bool> {
        if self.find_entry(name).is_none() {
            return Ok(false);
        }
        match self.mode {
            AccessMode::Read => Err(Error::invalid_operation(
                "cannot delete entries through a Read-mode accessor",
            )),
            AccessMode::Create => Err(Error::not_supported(
                "ZIP entry deletion requires Update mode",
            )),
            AccessMode::Update => {
                self.pending.retain(|e| e.name != name);
                self.dirty = true;
                self.rebuild_entries();
                Ok(true)
            }
        }
    }

    fn finish(&mut self) -> Result<()> {
        if self.mode == AccessMode::Read || !self.dirty {
            return Ok(());
        }
        self.commit()
    }
}

impl Drop for ZipArchiveAccess<'_> {
    fn drop(&mut self) {
        // Backstop only: the archive trailer is written by finish(), and a
        // drop with pending changes leaves the container without one.
        if self.dirty {
            log::error!("ZIP accessor dropped with uncommitted changes; call finish()");
        }
    }
}

fn record_entry(record: &ZipRecord) -> ArchiveEntry {
    ArchiveEntry {
        name: record.name.clone(),
        length: i64::from(record.uncompressed_size),
        modified: system_time_from_dos(record.dos_date, record.dos_time),
        is_directory: record.is_directory(),
        crc32: Some(record.crc32),
    }
}

fn pending_entry(entry: &PendingEntry) -> ArchiveEntry {
    ArchiveEntry {
        name: entry.name.clone(),
        length: i64::from(entry.uncompressed_size),
        modified: system_time_from_dos(entry.dos_date, entry.dos_time),
        is_directory: entry.name.ends_with('/'),
        crc32: Some(entry.crc32),
    }
}

fn deflate_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn decode_entry<'a, R: Read + Send + 'a>(
    raw: R,
    method: u16,
    crc32: u32,
    name: &str,
) -> Result<Box<dyn Read + 'a>> {
    match method {
        METHOD_STORED => Ok(Box::new(Crc32Reader::new(raw, crc32, name))),
        METHOD_DEFLATED => Ok(Box::new(Crc32Reader::new(
            DeflateDecoder::new(raw),
            crc32,
            name,
        ))),
        other => Err(Error::not_supported(format!(
            "ZIP compression method {other}"
        ))),
    }
}

/// Locates and parses the end-of-central-directory record, then the central
/// directory it points at. An empty stream is a valid, empty archive.
fn parse_central_directory(
    stream: &mut (dyn ArchiveStream + '_),
    len: u64,
) -> Result<Vec<ZipRecord>> {
    if len == 0 {
        return Ok(Vec::new());
    }

    let tail_len = len.min(MAX_EOCDR_SEARCH);
    stream.seek(SeekFrom::Start(len - tail_len))?;
    let mut tail = vec![0u8; tail_len as usize];
    stream.read_exact(&mut tail)?;
    let eocdr_pos = memmem::rfind(&tail, EOCDR_MAGIC).ok_or_else(|| {
        Error::invalid_operation("no end-of-central-directory record found; not a ZIP archive")
    })?;

    let mut eocdr = Cursor::new(&tail[eocdr_pos + 4..]);
    let _this_disk = eocdr.read_u16::<LittleEndian>()?;
    let _central_disk = eocdr.read_u16::<LittleEndian>()?;
    let _entries_this_disk = eocdr.read_u16::<LittleEndian>()?;
    let total_entries = eocdr.read_u16::<LittleEndian>()?;
    let central_size = eocdr.read_u32::<LittleEndian>()?;
    let central_offset = eocdr.read_u32::<LittleEndian>()?;
    if total_entries == u16::MAX || central_offset == u32::MAX {
        return Err(Error::not_supported("ZIP64 archives"));
    }

    stream.seek(SeekFrom::Start(u64::from(central_offset)))?;
    let mut central = vec![0u8; central_size as usize];
    stream.read_exact(&mut central)?;
    let mut cursor = Cursor::new(central.as_slice());

    let mut records = Vec::with_capacity(usize::from(total_entries));
    for _ in 0..total_entries {
        records.push(parse_central_record(&mut cursor)?);
    }
    Ok(records)
}

fn parse_central_record(cursor: &mut Cursor<&[u8]>) -> Result<ZipRecord> {
    let magic = cursor.read_u32::<LittleEndian>()?;
    if magic != CENTRAL_HEADER_MAGIC {
        return Err(Error::invalid_operation(format!(
            "bad central directory header magic {magic:#010x}"
        )));
    }
    let _version_made_by = cursor.read_u16::<LittleEndian>()?;
    let _version_needed = cursor.read_u16::<LittleEndian>()?;
    let flags = cursor.read_u16::<LittleEndian>()?;
    let method = cursor.read_u16::<LittleEndian>()?;
    let dos_time = cursor.read_u16::<LittleEndian>()?;
    let dos_date = cursor.read_u16::<LittleEndian>()?;
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let compressed_size = cursor.read_u32::<LittleEndian>()?;
    let uncompressed_size = cursor.read_u32::<LittleEndian>()?;
    let name_len = cursor.read_u16::<LittleEndian>()?;
    let extra_len = cursor.read_u16::<LittleEndian>()?;
    let comment_len = cursor.read_u16::<LittleEndian>()?;
    let _disk_start = cursor.read_u16::<LittleEndian>()?;
    let _internal_attributes = cursor.read_u16::<LittleEndian>()?;
    let _external_attributes = cursor.read_u32::<LittleEndian>()?;
    let local_header_offset = cursor.read_u32::<LittleEndian>()?;

    if compressed_size == u32::MAX || uncompressed_size == u32::MAX || local_header_offset == u32::MAX
    {
        return Err(Error::not_supported("ZIP64 archives"));
    }

    let mut name = vec![0u8; usize::from(name_len)];
    cursor.read_exact(&mut name)?;
    cursor.seek(SeekFrom::Current(i64::from(extra_len) + i64::from(comment_len)))?;

    Ok(ZipRecord {
        name: String::from_utf8_lossy(&name).replace('\\', "/"),
        method,
        flags,
        crc32,
        compressed_size,
        uncompressed_size,
        dos_time,
        dos_date,
        local_header_offset,
    })
}

/// Validates the local header for `record` and returns the offset of the
/// first data byte.
fn seek_past_local_header(
    stream: &mut (dyn ArchiveStream + '_),
    record: &ZipRecord,
) -> Result<u64> {
    stream.seek(SeekFrom::Start(u64::from(record.local_header_offset)))?;
    let magic = stream.read_u32::<LittleEndian>()?;
    if magic != LOCAL_HEADER_MAGIC {
        return Err(Error::invalid_operation(format!(
            "bad local header magic {magic:#010x} for entry '{}'",
            record.name
        )));
    }
    // Fixed local-header fields after the magic, through the extra length.
    let mut fixed = [0u8; 26];
    stream.read_exact(&mut fixed)?;
    let name_len = u16::from_le_bytes([fixed[22], fixed[23]]);
    let extra_len = u16::from_le_bytes([fixed[24], fixed[25]]);
    Ok(u64::from(record.local_header_offset)
        + 4
        + 26
        + u64::from(name_len)
        + u64::from(extra_len))
}

fn read_raw_entry_data(
    stream: &mut (dyn ArchiveStream + '_),
    record: &ZipRecord,
) -> Result<Vec<u8>> {
    if record.flags & FLAG_ENCRYPTED != 0 {
        return Err(Error::not_supported("encrypted ZIP entries"));
    }
    let data_offset = seek_past_local_header(stream, record)?;
    stream.seek(SeekFrom::Start(data_offset))?;
    let mut data = vec![0u8; record.compressed_size as usize];
    stream.read_exact(&mut data)?;
    Ok(data)
}

fn write_local_header(stream: &mut (dyn ArchiveStream + '_), entry: &PendingEntry) -> Result<()> {
    stream.write_u32::<LittleEndian>(LOCAL_HEADER_MAGIC)?;
    stream.write_u16::<LittleEndian>(VERSION_NEEDED)?;
    stream.write_u16::<LittleEndian>(FLAG_UTF8)?;
    stream.write_u16::<LittleEndian>(entry.method)?;
    stream.write_u16::<LittleEndian>(entry.dos_time)?;
    stream.write_u16::<LittleEndian>(entry.dos_date)?;
    stream.write_u32::<LittleEndian>(entry.crc32)?;
    stream.write_u32::<LittleEndian>(entry.compressed.len() as u32)?;
    stream.write_u32::<LittleEndian>(entry.uncompressed_size)?;
    stream.write_u16::<LittleEndian>(entry.name.len() as u16)?;
    stream.write_u16::<LittleEndian>(0)?; // extra length
    stream.write_all(entry.name.as_bytes())?;
    Ok(())
}

fn write_central_header(
    stream: &mut (dyn ArchiveStream + '_),
    entry: &PendingEntry,
    local_header_offset: u32,
) -> Result<()> {
    stream.write_u32::<LittleEndian>(CENTRAL_HEADER_MAGIC)?;
    stream.write_u16::<LittleEndian>(VERSION_NEEDED)?; // version made by
    stream.write_u16::<LittleEndian>(VERSION_NEEDED)?;
    stream.write_u16::<LittleEndian>(FLAG_UTF8)?;
    stream.write_u16::<LittleEndian>(entry.method)?;
    stream.write_u16::<LittleEndian>(entry.dos_time)?;
    stream.write_u16::<LittleEndian>(entry.dos_date)?;
    stream.write_u32::<LittleEndian>(entry.crc32)?;
    stream.write_u32::<LittleEndian>(entry.compressed.len() as u32)?;
    stream.write_u32::<LittleEndian>(entry.uncompressed_size)?;
    stream.write_u16::<LittleEndian>(entry.name.len() as u16)?;
    stream.write_u16::<LittleEndian>(0)?; // extra length
    stream.write_u16::<LittleEndian>(0)?; // comment length
    stream.write_u16::<LittleEndian>(0)?; // disk number start
    stream.write_u16::<LittleEndian>(0)?; // internal attributes
    stream.write_u32::<LittleEndian>(0)?; // external attributes
    stream.write_u32::<LittleEndian>(local_header_offset)?;
    stream.write_all(entry.name.as_bytes())?;
    Ok(())
}

/// Converts a `SystemTime` to MS-DOS (date, time) fields. Times before 1980
/// clamp to the epoch of the format.
fn dos_date_time(time: SystemTime) -> (u16, u16) {
    let datetime: DateTime<Utc> = time.into();
    let year = datetime.year().clamp(1980, 2107);
    let date = (((year - 1980) as u16) << 9)
        | ((datetime.month() as u16) << 5)
        | datetime.day() as u16;
    let time = ((datetime.hour() as u16) << 11)
        | ((datetime.minute() as u16) << 5)
        | ((datetime.second() as u16) / 2);
    (date, time)
}

/// Converts MS-DOS (date, time) fields to a `SystemTime`, or `None` for
/// out-of-range field values.
fn system_time_from_dos(date: u16, time: u16) -> Option<SystemTime> {
    let year = 1980 + i32::from((date >> 9) & 0x7F);
    let month = u32::from((date >> 5) & 0x0F);
    let day = u32::from(date & 0x1F);
    let hour = u32::from((time >> 11) & 0x1F);
    let minute = u32::from((time >> 5) & 0x3F);
    let second = u32::from(time & 0x1F) * 2;

    let naive = chrono::NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_opt(hour, minute, second)?;
    let timestamp = naive.and_utc().timestamp();
    u64::try_from(timestamp)
        .ok()
        .map(|secs| SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
}
