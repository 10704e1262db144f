//! # nestar
//!
//! Uniform access to compressed archives, including archives nested inside
//! other archives.
//!
//! This crate provides a format registry that maps file extensions to
//! archive formats, a pluggable factory that opens streams as archive
//! accessors, native accessors for ZIP, GZIP, and TAR, and path navigation
//! that treats nested archives as part of the directory tree: a location
//! such as `saves/outer.zip/inner.tar/notes.txt` resolves through every
//! container on the way.
//!
//! ## Quick Start
//!
//! ### Creating and Reading an Archive
//!
//! ```rust,no_run
//! use nestar::{AccessMode, ArchiveAccess, Result, open_path};
//!
//! fn main() -> Result<()> {
//!     // Create an archive; the format comes from the file extension.
//!     let mut archive = open_path("backup.zip", AccessMode::Create, None)?;
//!     archive.create_entry("docs/readme.txt", &mut &b"hello"[..])?;
//!     archive.finish()?;
//!
//!     // Reopen and list what is inside.
//!     let archive = open_path("backup.zip", AccessMode::Read, None)?;
//!     for entry in archive.entries() {
//!         println!("{}: {} bytes", entry.name, entry.length);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Reaching Through Nested Archives
//!
//! ```rust,no_run
//! use nestar::{ArchiveAccess, Result, open_nested};
//! use std::io::Read;
//!
//! fn main() -> Result<()> {
//!     let location = "saves/outer.zip/inner.tar/notes.txt";
//!     if let Some(mut nested) = open_nested(location)? {
//!         let entry_path = nested.entry_path.clone();
//!         if let Some(mut reader) = nested.access.open_entry(&entry_path)? {
//!             let mut text = String::new();
//!             reader.read_to_string(&mut text)?;
//!             println!("{text}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Browsing an Archive Like a Directory Tree
//!
//! ```rust,no_run
//! use nestar::{AccessMode, Result, list_contents, open_path};
//!
//! fn main() -> Result<()> {
//!     let mut archive = open_path("backup.zip", AccessMode::Read, None)?;
//!     // Recursive listing; nested archives are descended into as if they
//!     // were directories.
//!     for name in list_contents(&mut archive, "", true, true)? {
//!         println!("{name}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Extending the Registry
//!
//! Formats and accessor implementations are registered process-wide. The
//! built-in registrations cover `.zip`, `.gz`, and `.tar` with the native
//! accessors; [`register_format`] and [`register_factory`] add more:
//!
//! ```rust
//! use nestar::{ArchiveFormat, ArchiveImplementation, Result, register_format};
//!
//! fn main() -> Result<()> {
//!     register_format(
//!         ArchiveFormat::Other(700),
//!         &[".pak"],
//!         &[ArchiveImplementation::Other(700)],
//!     )?;
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`], an alias for
//! `std::result::Result<T, Error>`. The [`Error`] enum distinguishes
//! configuration mistakes ([`Error::OutOfRange`], [`Error::InvalidArgument`])
//! from runtime conditions such as [`Error::NotFound`],
//! [`Error::NotSupported`], and corrupted input
//! ([`Error::InvalidOperation`], [`Error::CrcMismatch`]).
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod access;
pub mod crc;
pub mod error;
pub mod factory;
pub mod format;
pub mod gzip_member;
pub mod list;
pub mod location;
pub mod navigate;

pub use error::{Error, Result};

pub use access::{AccessMode, ArchiveAccess, ArchiveEntry, ArchiveStream};

pub use format::{
    ArchiveFormat, ArchiveImplementation, add_file_extension, add_implementation,
    available_implementations, file_extensions, formats_from_file_name, is_format_supported,
    preferred_implementation, register_format,
};

pub use factory::{AccessorFactory, FileArchiveAccess, open, open_path, register_factory};

pub use gzip_member::{GzipMemberEntry, member_entries};

pub use navigate::{NestedArchive, NestedArchivePath, open_nested, split_nested_path};

pub use location::{ArchiveStorage, FileSystemStorage, StorageAccess, StorageLocation};

pub use list::{list_contents, list_entries};

pub use crc::Crc32Reader;
