//! Directory-style listing over archive accessors.
//!
//! An archive is a flat sequence of named entries, but callers usually want
//! to browse it like a directory tree: list one level at a time, see
//! directories even when the writer never emitted explicit directory
//! entries, and optionally descend through nested archives as if they were
//! directories themselves.

use std::collections::HashSet;

use crate::access::{ArchiveAccess, ArchiveEntry};
use crate::error::{Error, Result};
use crate::format::formats_from_file_name;
use crate::navigate::open_entry_as_archive;

/// Lists the entries under `location` within `access`.
///
/// `location` must be empty (the archive root) or end with a separator;
/// backslashes are accepted and treated as forward slashes. The location
/// may thread through nested archives (`inner.tar/sub/`), which are opened
/// read-only and buffered in memory for the duration of the call.
///
/// Containers are directories and entries whose name carries a known archive
/// extension. With `include_containers` false they are walked but not
/// themselves returned. With `recurse` true the walk descends into
/// directories and into nested archives; entry names in the result are
/// qualified relative to `location`, always with forward slashes.
///
/// A nested archive that fails to open during a recursive walk is logged
/// and skipped rather than failing the whole listing. A location naming a
/// directory with no entries under it yields an empty list.
///
/// # Errors
///
/// [`Error::InvalidArgument`] when `location` is non-empty without a
/// trailing separator; [`Error::NotFound`] when an intermediate nested
/// archive entry named by `location` does not exist.
pub fn list_entries(
    access: &mut (dyn ArchiveAccess + '_),
    location: &str,
    include_containers: bool,
    recurse: bool,
) -> Result<Vec<ArchiveEntry>> {
    let location = location.replace('\\', "/");
    if !location.is_empty() && !location.ends_with('/') {
        return Err(Error::invalid_argument(
            "location",
            format!("'{location}' does not end with a separator"),
        ));
    }

    // Descend through any nested-archive boundaries in the location so the
    // walk itself only ever sees a directory prefix within one accessor.
    let mut owned: Option<Box<dyn ArchiveAccess>> = None;
    let mut prefix = location.as_str();
    loop {
        let current: &mut (dyn ArchiveAccess + '_) = match owned.as_deref_mut() {
            Some(inner) => inner,
            None => &mut *access,
        };
        let Some(boundary) = nested_boundary(current, prefix) else {
            let mut result = Vec::new();
            walk(
                current,
                prefix,
                "",
                include_containers,
                recurse,
                &mut result,
            )?;
            return Ok(result);
        };
        let inner = open_entry_as_archive(current, &boundary)?;
        prefix = &prefix[boundary.len() + 1..];
        owned = Some(inner);
    }
}

/// Lists the names of the entries under `location`; see [`list_entries`].
pub fn list_contents(
    access: &mut (dyn ArchiveAccess + '_),
    location: &str,
    include_containers: bool,
    recurse: bool,
) -> Result<Vec<String>> {
    Ok(list_entries(access, location, include_containers, recurse)?
        .into_iter()
        .map(|entry| entry.name)
        .collect())
}

/// Finds the first component span of `prefix` that names a nested archive
/// entry to descend into, or `None` when the prefix is a plain directory
/// path within `access`.
///
/// An explicit directory entry wins over the archive interpretation, so a
/// real directory named `data.zip/` is browsed in place.
fn nested_boundary(access: &(dyn ArchiveAccess + '_), prefix: &str) -> Option<String> {
    let mut end = 0;
    for component in prefix.split('/') {
        if component.is_empty() {
            break;
        }
        let span = &prefix[..end + component.len()];
        end += component.len() + 1;
        if formats_from_file_name(component).is_empty() {
            continue;
        }
        if access.find_entry(&format!("{span}/")).is_some() {
            continue;
        }
        return Some(span.to_string());
    }
    None
}

fn walk(
    access: &mut (dyn ArchiveAccess + '_),
    prefix: &str,
    qualifier: &str,
    include_containers: bool,
    recurse: bool,
    result: &mut Vec<ArchiveEntry>,
) -> Result<()> {
    let children = immediate_children(access.entries(), prefix);

    for child in children {
        let name = child.name.trim_end_matches('/');
        let is_container = child.is_directory || !formats_from_file_name(name).is_empty();

        if include_containers || !is_container {
            let mut qualified = child.clone();
            qualified.name = format!("{qualifier}{}", child.name);
            result.push(qualified);
        }

        if !recurse {
            continue;
        }
        if child.is_directory {
            let sub_prefix = format!("{prefix}{name}/");
            let sub_qualifier = format!("{qualifier}{name}/");
            walk(
                access,
                &sub_prefix,
                &sub_qualifier,
                include_containers,
                recurse,
                result,
            )?;
        } else if is_container {
            let entry_path = format!("{prefix}{name}");
            match open_entry_as_archive(access, &entry_path) {
                Ok(mut inner) => {
                    let inner_qualifier = format!("{qualifier}{name}/");
                    walk(
                        &mut *inner,
                        "",
                        &inner_qualifier,
                        include_containers,
                        recurse,
                        result,
                    )?;
                }
                Err(err) => {
                    log::warn!("skipping nested archive '{entry_path}': {err}");
                }
            }
        }
    }
    Ok(())
}

/// The immediate children of `prefix`, in encounter order, with names made
/// relative to `prefix`. Directories with no explicit entry of their own
/// are synthesized from deeper entry names; an explicit directory entry
/// contributes its metadata instead.
fn immediate_children(entries: &[ArchiveEntry], prefix: &str) -> Vec<ArchiveEntry> {
    let mut children: Vec<ArchiveEntry> = Vec::new();
    let mut seen_directories: HashSet<String> = HashSet::new();

    for entry in entries {
        let Some(relative) = entry.name.strip_prefix(prefix) else {
            continue;
        };
        if relative.is_empty() {
            continue;
        }
        match relative.trim_end_matches('/').find('/') {
            None => {
                let mut child = entry.clone();
                child.name = relative.to_string();
                if relative.ends_with('/') {
                    // Explicit directory entry; replace a synthesized one.
                    if seen_directories.insert(child.name.clone()) {
                        children.push(child);
                    } else if let Some(existing) =
                        children.iter_mut().find(|c| c.name == child.name)
                    {
                        *existing = child;
                    }
                } else {
                    children.push(child);
                }
            }
            Some(separator) => {
                // A deeper entry implies an intermediate directory.
                let name = format!("{}/", &relative[..separator]);
                if seen_directories.insert(name.clone()) {
                    children.push(ArchiveEntry {
                        name,
                        length: 0,
                        modified: None,
                        is_directory: true,
                        crc32: None,
                    });
                }
            }
        }
    }
    children
}
