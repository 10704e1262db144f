//! Decomposition of path strings that thread through nested archives.
//!
//! A location string such as `saves/outer.zip/deep/inner.tar/dir/file.txt`
//! crosses container boundaries wherever a path segment carries a known
//! archive extension with further path remaining beyond it. The navigator
//! splits such a string into the external file-system path and the chain of
//! in-archive entry paths, then opens each boundary in order, outermost
//! first, buffering nested archive bytes in memory.

use std::io::{Cursor, Read};

use crate::access::{AccessMode, ArchiveAccess};
use crate::error::{Error, Result};
use crate::factory::{open, open_path};
use crate::format::formats_from_file_name;

/// A location string decomposed at its nested-archive boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedArchivePath {
    /// The file-system path of the outermost archive file.
    pub external_path: String,
    /// In-archive entry paths, one per accessor in the chain. All but the
    /// last name nested archive entries to open; the last is the terminal
    /// entry path within the innermost accessor and may be empty when the
    /// location addresses an archive root.
    pub segments: Vec<String>,
}

/// Splits `path` at nested-archive boundaries, or returns `None` when no
/// segment with a known archive extension is followed by further path.
///
/// Forward slashes and backslashes are accepted interchangeably; the
/// decomposed parts use forward slashes.
pub fn split_nested_path(path: &str) -> Option<NestedArchivePath> {
    let normalized = path.replace('\\', "/");
    let components: Vec<&str> = normalized.split('/').collect();

    let boundary = components.iter().enumerate().position(|(index, component)| {
        index + 1 < components.len() && !formats_from_file_name(component).is_empty()
    })?;

    let external_path = components[..=boundary].join("/");
    let mut segments = Vec::new();
    let mut current = String::new();
    for (index, component) in components.iter().enumerate().skip(boundary + 1) {
        if !current.is_empty() {
            current.push('/');
        }
        current.push_str(component);
        if index + 1 < components.len() && !formats_from_file_name(component).is_empty() {
            segments.push(std::mem::take(&mut current));
        }
    }
    segments.push(current);

    Some(NestedArchivePath {
        external_path,
        segments,
    })
}

/// An opened chain of nested accessors: the innermost accessor plus the
/// terminal entry path it contains.
///
/// The caller owns the accessor; dropping it releases the buffered nested
/// streams and the outermost file handle.
pub struct NestedArchive {
    /// The accessor containing the terminal entry.
    pub access: Box<dyn ArchiveAccess>,
    /// Entry path of the location's target within [`access`][Self::access];
    /// empty when the location addresses the archive root.
    pub entry_path: String,
    /// The file-system path of the outermost archive file.
    pub external_path: String,
}

/// Opens the accessor chain for `path`, or returns `Ok(None)` when the path
/// crosses no nested-archive boundary.
///
/// Every boundary is opened read-only, outermost first. Intermediate nested
/// archives are buffered into memory, so the returned accessor is
/// independent of all but the outermost file handle.
///
/// # Errors
///
/// [`Error::NotFound`] when an intermediate nested archive entry does not
/// exist; otherwise whatever opening a boundary reports.
pub fn open_nested(path: &str) -> Result<Option<NestedArchive>> {
    let Some(decomposed) = split_nested_path(path) else {
        return Ok(None);
    };

    let mut access: Box<dyn ArchiveAccess> = Box::new(open_path(
        &decomposed.external_path,
        AccessMode::Read,
        None,
    )?);
    let (terminal, intermediates) = decomposed
        .segments
        .split_last()
        .expect("split_nested_path yields at least one segment");
    for segment in intermediates {
        access = open_entry_as_archive(&mut *access, segment)?;
    }

    Ok(Some(NestedArchive {
        access,
        entry_path: terminal.clone(),
        external_path: decomposed.external_path,
    }))
}

/// Buffers the named entry of `access` and opens it as a read-only archive
/// accessor, with the format taken from the entry name's extension.
pub(crate) fn open_entry_as_archive(
    access: &mut (dyn ArchiveAccess + '_),
    entry_path: &str,
) -> Result<Box<dyn ArchiveAccess>> {
    let format = formats_from_file_name(entry_path)
        .first()
        .copied()
        .ok_or_else(|| {
            Error::invalid_operation(format!(
                "'{entry_path}' has no recognized archive extension"
            ))
        })?;
    let mut bytes = Vec::new();
    {
        let Some(mut reader) = access.open_entry(entry_path)? else {
            return Err(Error::not_found(entry_path));
        };
        reader.read_to_end(&mut bytes)?;
    }
    open(Box::new(Cursor::new(bytes)), format, AccessMode::Read, None)
}
