//! Error types for archive access operations.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes when registering formats, opening archives, and working with
//! entries, along with a convenient [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! All fallible operations in this crate return `Result<T, Error>`. You can
//! handle errors using pattern matching or the `?` operator:
//!
//! ```rust,no_run
//! use nestar::{AccessMode, ArchiveAccess, Result, open_path};
//!
//! fn count_entries(path: &str) -> Result<usize> {
//!     let archive = open_path(path, AccessMode::Read, None)?;
//!     Ok(archive.entries().len())
//! }
//! ```

use std::io;

/// The main error type for archive access operations.
///
/// # Error Categories
///
/// Errors fall into several categories:
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | I/O | [`Io`][Self::Io] | File system operations |
/// | Configuration | [`OutOfRange`][Self::OutOfRange], [`InvalidArgument`][Self::InvalidArgument] | Bad registration arguments |
/// | Compatibility | [`NotSupported`][Self::NotSupported] | Missing factory or structurally unsupported operation |
/// | Contract | [`InvalidOperation`][Self::InvalidOperation] | Mode/format mismatches, corrupt headers |
/// | Lookup | [`NotFound`][Self::NotFound], [`EntryExists`][Self::EntryExists] | Missing or duplicated entries |
/// | Integrity | [`CrcMismatch`][Self::CrcMismatch] | Data corruption |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred during file or stream operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A sentinel or otherwise out-of-range value was passed where a real
    /// format or implementation was required.
    ///
    /// Registration operations reject `ArchiveFormat::None` and the
    /// `None`/`Any` implementation sentinels.
    #[error("value '{value}' is out of range for parameter '{parameter}'")]
    OutOfRange {
        /// The parameter that received the out-of-range value.
        parameter: &'static str,
        /// A rendering of the rejected value.
        value: String,
    },

    /// An argument failed validation.
    ///
    /// The message names the offending parameter so callers can distinguish,
    /// e.g., a malformed extension from an unregistered format.
    #[error("invalid argument '{parameter}': {reason}")]
    InvalidArgument {
        /// The parameter that failed validation.
        parameter: &'static str,
        /// Description of the validation failure.
        reason: String,
    },

    /// The requested operation is structurally unsupported.
    ///
    /// Examples: no factory is registered for a (format, implementation)
    /// pair, deleting entries from a GZIP or TAR container, or creating a
    /// second entry in a GZIP container.
    #[error("not supported: {reason}")]
    NotSupported {
        /// Description of what is unsupported.
        reason: String,
    },

    /// The operation conflicts with the accessor's mode or the stream's
    /// actual content.
    ///
    /// Examples: creating an entry through a `Read`-mode accessor, opening a
    /// non-empty stream for `Create`, or a corrupt header field.
    #[error("invalid operation: {reason}")]
    InvalidOperation {
        /// Description of the conflict.
        reason: String,
    },

    /// A file, entry, or nested archive segment was not found.
    #[error("not found: {path}")]
    NotFound {
        /// The path or entry name that was not found.
        path: String,
    },

    /// An entry already exists in the archive.
    #[error("entry already exists: {path}")]
    EntryExists {
        /// The path that already exists.
        path: String,
    },

    /// The CRC-32 checksum of an entry's data does not match the recorded
    /// value, indicating corruption.
    #[error("CRC mismatch for '{entry_name}': expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        /// The entry whose data failed verification.
        entry_name: String,
        /// The checksum recorded in the container.
        expected: u32,
        /// The checksum computed over the decoded data.
        actual: u32,
    },
}

impl Error {
    /// Returns `true` if this error stems from bad registration or call
    /// arguments rather than from archive content.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::OutOfRange { .. } | Error::InvalidArgument { .. }
        )
    }

    /// Returns `true` if this error indicates data corruption.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::CrcMismatch { .. })
    }

    /// Returns `true` if the operation was structurally unsupported.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::NotSupported { .. })
    }

    /// Creates an `OutOfRange` error for the named parameter.
    pub fn out_of_range(parameter: &'static str, value: impl std::fmt::Display) -> Self {
        Error::OutOfRange {
            parameter,
            value: value.to_string(),
        }
    }

    /// Creates an `InvalidArgument` error for the named parameter.
    pub fn invalid_argument(parameter: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            parameter,
            reason: reason.into(),
        }
    }

    /// Creates a `NotSupported` error.
    pub fn not_supported(reason: impl Into<String>) -> Self {
        Error::NotSupported {
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidOperation` error.
    pub fn invalid_operation(reason: impl Into<String>) -> Self {
        Error::InvalidOperation {
            reason: reason.into(),
        }
    }

    /// Creates a `NotFound` error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Error::NotFound { path: path.into() }
    }
}

/// A specialized Result type for archive operations.
pub type Result<T> = std::result::Result<T, Error>;
