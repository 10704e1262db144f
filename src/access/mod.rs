//! The archive accessor abstraction shared by all container back ends.
//!
//! An accessor is bound to exactly one stream and one [`AccessMode`] for its
//! lifetime. It exposes entry enumeration plus open/create/delete operations
//! whose availability depends on the mode and the container format.
//!
//! Accessors are obtained through [`crate::open`] or [`crate::open_path`];
//! the concrete back ends live in the submodules of this module.

pub mod gzip;
pub mod tar;
pub mod zip;

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::time::SystemTime;

use crate::error::Result;
use crate::format::ArchiveFormat;

/// The access mode an accessor is constructed with. Fixed for the
/// accessor's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Entries may be enumerated and read. Creation and deletion are
    /// invalid operations.
    Read,
    /// The target starts empty and entries may be created. Reads before an
    /// entry is created are not meaningful.
    Create,
    /// Existing entries may be read; creation and deletion support is
    /// format-dependent.
    Update,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "Read"),
            Self::Create => write!(f, "Create"),
            Self::Update => write!(f, "Update"),
        }
    }
}

/// The stream bound to an accessor.
///
/// Blanket-implemented for anything readable, writable, seekable, and
/// sendable; both `std::fs::File` and `std::io::Cursor<Vec<u8>>` qualify.
/// Accessors opened in `Read` mode never invoke the write half.
pub trait ArchiveStream: Read + Write + Seek + Send {}

impl<T: Read + Write + Seek + Send + ?Sized> ArchiveStream for T {}

/// One addressable unit inside an accessor.
///
/// Entries are immutable snapshots taken when the archive is scanned or when
/// an entry is created. Deleting an entry invalidates it in the archive but
/// does not alter previously returned snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path-like name, forward-slash separated. Directory entries end with
    /// a separator.
    pub name: String,
    /// Uncompressed length in bytes, or -1 if unknown (e.g. a streaming
    /// GZIP member whose payload has not been decoded).
    pub length: i64,
    /// Last modification time, when the container records one.
    pub modified: Option<SystemTime>,
    /// Whether this entry names a directory rather than a file.
    pub is_directory: bool,
    /// CRC-32 of the uncompressed data, where the container records one.
    pub crc32: Option<u32>,
}

impl ArchiveEntry {
    /// Creates a file entry.
    pub fn file(name: impl Into<String>, length: i64) -> Self {
        Self {
            name: name.into(),
            length,
            modified: None,
            is_directory: false,
            crc32: None,
        }
    }

    /// Creates a directory entry, normalizing the name to end with `/`.
    pub fn directory(name: impl Into<String>) -> Self {
        let mut name = name.into();
        if !name.ends_with('/') {
            name.push('/');
        }
        Self {
            name,
            length: 0,
            modified: None,
            is_directory: true,
            crc32: None,
        }
    }

    /// Sets the modification time.
    pub fn with_modified(mut self, modified: Option<SystemTime>) -> Self {
        self.modified = modified;
        self
    }

    /// Sets the recorded CRC-32.
    pub fn with_crc32(mut self, crc32: Option<u32>) -> Self {
        self.crc32 = crc32;
        self
    }
}

/// An open, mode-bound handle over one archive stream.
///
/// Implementations release the underlying stream when dropped. Pending
/// writes are committed by [`finish`][Self::finish]; dropping an accessor
/// with uncommitted writes logs an error and discards nothing that was
/// already committed, but the archive trailer may be missing. Call `finish`
/// explicitly on every write path.
pub trait ArchiveAccess: Send {
    /// The container format this accessor services.
    fn format(&self) -> ArchiveFormat;

    /// The mode the accessor was constructed with.
    fn mode(&self) -> AccessMode;

    /// `true` if the container supports multiple named entries, `false` for
    /// single-stream containers such as GZIP.
    fn is_archive(&self) -> bool;

    /// `true` if entry data is stored compressed.
    fn is_compressed(&self) -> bool;

    /// The entries currently known to the accessor, in container order.
    fn entries(&self) -> &[ArchiveEntry];

    /// Finds an entry by exact name.
    fn find_entry(&self, name: &str) -> Option<&ArchiveEntry> {
        self.entries().iter().find(|e| e.name == name)
    }

    /// Opens an entry's uncompressed data for reading.
    ///
    /// Returns `Ok(None)` when no entry with that name exists. When the
    /// container records a CRC-32 the returned reader verifies it and
    /// reports a mismatch as an `InvalidData` I/O error at end of stream.
    fn open_entry<'a>(&'a mut self, name: &str) -> Result<Option<Box<dyn Read + 'a>>>;

    /// Creates a new entry with the given name, consuming `data` to the end.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::InvalidOperation`] in `Read` mode.
    /// - [`crate::Error::NotSupported`] when the format cannot hold another
    ///   entry (e.g. a second GZIP member).
    /// - [`crate::Error::EntryExists`] when the name is already taken.
    fn create_entry(&mut self, name: &str, data: &mut dyn Read) -> Result<ArchiveEntry>;

    /// Deletes an entry by name.
    ///
    /// Returns `Ok(false)` when no entry with that name exists, regardless
    /// of mode. For an existing entry, deletion is an invalid operation in
    /// `Read` mode and unsupported for formats that cannot rewrite their
    /// members (GZIP, TAR).
    fn delete_entry(&mut self, name: &str) -> Result<bool>;

    /// Commits pending writes (trailers, directory records) to the stream.
    ///
    /// Idempotent; a no-op for `Read`-mode accessors.
    fn finish(&mut self) -> Result<()>;
}

/// Reports the total length of a stream, restoring the current position.
pub(crate) fn stream_len(stream: &mut (dyn ArchiveStream + '_)) -> io::Result<u64> {
    let position = stream.stream_position()?;
    let len = stream.seek(SeekFrom::End(0))?;
    if position != len {
        stream.seek(SeekFrom::Start(position))?;
    }
    Ok(len)
}
