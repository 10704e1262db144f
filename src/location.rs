//! Storage locations: path values resolved against the plain file system or
//! a chain of nested archive accessors.
//!
//! A [`StorageLocation`] pairs a path string with a storage provider. The
//! default provider answers queries from the file system; when the path
//! threads through nested-archive boundaries the provider becomes the
//! accessor chain opened by [`crate::navigate::open_nested`], and queries
//! resolve against the terminal archive entry. Either way the caller sees
//! one uniform surface: existence, size, last write time, and open-stream.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::SystemTime;

use crate::access::ArchiveAccess;
use crate::error::{Error, Result};
use crate::format::formats_from_file_name;
use crate::navigate::{NestedArchive, open_nested};

/// Uniform storage query surface backed either by the file system or by an
/// open archive accessor.
pub trait StorageAccess: Send {
    /// Whether `path` resolves to an existing file or entry.
    fn exists(&mut self, path: &str) -> bool;

    /// Size in bytes, or 0 when `path` does not resolve to anything.
    fn size(&mut self, path: &str) -> Result<i64>;

    /// Last write time, or [`SystemTime::UNIX_EPOCH`] as the minimum
    /// sentinel when `path` does not resolve to anything. Never fails.
    fn last_write_time_utc(&mut self, path: &str) -> SystemTime;

    /// Opens `path` for reading.
    fn open(&mut self, path: &str) -> Result<Box<dyn Read + '_>>;
}

/// The default provider: queries go straight to the file system.
#[derive(Debug, Default)]
pub struct FileSystemStorage;

impl StorageAccess for FileSystemStorage {
    fn exists(&mut self, path: &str) -> bool {
        Path::new(path).exists()
    }

    fn size(&mut self, path: &str) -> Result<i64> {
        match std::fs::metadata(path) {
            Ok(metadata) => Ok(metadata.len() as i64),
            Err(_) => Ok(0),
        }
    }

    fn last_write_time_utc(&mut self, path: &str) -> SystemTime {
        std::fs::metadata(path)
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH)
    }

    fn open(&mut self, path: &str) -> Result<Box<dyn Read + '_>> {
        Ok(Box::new(File::open(path)?))
    }
}

/// Provider bound to an open archive accessor; paths are entry paths within
/// that accessor.
pub struct ArchiveStorage {
    access: Box<dyn ArchiveAccess>,
}

impl ArchiveStorage {
    /// Wraps an accessor. The provider owns it and releases it on drop.
    pub fn new(access: Box<dyn ArchiveAccess>) -> Self {
        Self { access }
    }

    fn entry_length(&self, path: &str) -> Option<i64> {
        self.access
            .find_entry(path)
            .or_else(|| self.access.find_entry(&format!("{path}/")))
            .map(|e| e.length)
    }
}

impl StorageAccess for ArchiveStorage {
    fn exists(&mut self, path: &str) -> bool {
        self.entry_length(path).is_some()
    }

    fn size(&mut self, path: &str) -> Result<i64> {
        Ok(self.entry_length(path).unwrap_or(0))
    }

    fn last_write_time_utc(&mut self, path: &str) -> SystemTime {
        self.access
            .find_entry(path)
            .and_then(|e| e.modified)
            .unwrap_or(SystemTime::UNIX_EPOCH)
    }

    fn open(&mut self, path: &str) -> Result<Box<dyn Read + '_>> {
        self.access
            .open_entry(path)?
            .ok_or_else(|| Error::not_found(path))
    }
}

enum Provider {
    Default(FileSystemStorage),
    Archive {
        storage: ArchiveStorage,
        /// Terminal entry path within the accessor.
        entry_path: String,
    },
}

/// A generalized path value: a plain file-system path, or a path into a
/// (possibly nested) archive.
///
/// Constructed with [`StorageLocation::from_file_path`]; the special
/// [`null`][StorageLocation::null] location carries no path at all. When the
/// provider is archive-backed, the location owns the accessor chain and
/// releases it on drop.
pub struct StorageLocation {
    path: Option<String>,
    provider: Provider,
}

impl StorageLocation {
    /// The location with no path.
    pub fn null() -> Self {
        Self {
            path: None,
            provider: Provider::Default(FileSystemStorage),
        }
    }

    /// Wraps `path`, resolving nested-archive boundaries.
    ///
    /// When the path crosses such a boundary the chain is opened read-only
    /// and becomes this location's provider. A chain that cannot be opened
    /// (missing outer file, missing nested entry, malformed archive) falls
    /// back to the default provider, where the path simply fails to
    /// resolve.
    pub fn from_file_path(path: &str) -> Self {
        let provider = match open_nested(path) {
            Ok(Some(NestedArchive {
                access, entry_path, ..
            })) => Provider::Archive {
                storage: ArchiveStorage::new(access),
                entry_path,
            },
            Ok(None) => Provider::Default(FileSystemStorage),
            Err(err) => {
                log::debug!("treating '{path}' as a plain path: {err}");
                Provider::Default(FileSystemStorage)
            }
        };
        Self {
            path: Some(path.replace('\\', "/")),
            provider,
        }
    }

    /// The path string, or `None` for the null location.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// `true` for the null location.
    pub fn is_null(&self) -> bool {
        self.path.is_none()
    }

    /// `true` when the path cannot name any storage target. An empty path
    /// is not invalid (it merely fails length queries).
    pub fn is_invalid(&self) -> bool {
        self.path.as_deref().is_some_and(|p| p.contains('\0'))
    }

    /// `true` unless the path resolves into a nested archive.
    pub fn uses_default_storage(&self) -> bool {
        matches!(self.provider, Provider::Default(_))
    }

    /// Whether the resolved target may hold further entries: a file-system
    /// directory, an openable nested archive, or any path ending in a
    /// separator (even one that does not exist yet).
    pub fn is_container(&mut self) -> bool {
        let Some(path) = self.path.clone() else {
            return false;
        };
        if path.ends_with('/') {
            return true;
        }
        match &mut self.provider {
            Provider::Default(_) => {
                let fs_path = Path::new(&path);
                if fs_path.is_dir() {
                    return true;
                }
                let Some(file_name) = fs_path.file_name().and_then(|n| n.to_str()) else {
                    return false;
                };
                if formats_from_file_name(file_name).is_empty() {
                    return false;
                }
                // Looks like an archive; it is a container only if it
                // actually opens as one.
                crate::open_path(&path, crate::AccessMode::Read, None).is_ok()
            }
            Provider::Archive {
                storage,
                entry_path,
            } => {
                if entry_path.is_empty() {
                    return true; // the archive root itself
                }
                if let Some(entry) = storage
                    .access
                    .find_entry(&format!("{entry_path}/"))
                    .or_else(|| storage.access.find_entry(entry_path))
                {
                    if entry.is_directory {
                        return true;
                    }
                }
                if formats_from_file_name(entry_path).is_empty() {
                    return false;
                }
                crate::navigate::open_entry_as_archive(&mut *storage.access, entry_path).is_ok()
            }
        }
    }

    /// Whether the target currently exists.
    pub fn exists(&mut self) -> bool {
        let Some(path) = self.path.clone() else {
            return false;
        };
        match &mut self.provider {
            Provider::Default(storage) => storage.exists(&path),
            Provider::Archive {
                storage,
                entry_path,
            } => {
                let entry_path = entry_path.clone();
                entry_path.is_empty() || storage.exists(&entry_path)
            }
        }
    }

    /// The target's size in bytes.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for a null or empty path;
    /// [`Error::NotFound`] when the target does not exist.
    pub fn size(&mut self) -> Result<i64> {
        let Some(path) = self.path.clone() else {
            return Err(Error::invalid_argument("path", "location has no path"));
        };
        if path.is_empty() {
            return Err(Error::invalid_argument("path", "path is empty"));
        }
        if !self.exists() {
            return Err(Error::not_found(path));
        }
        match &mut self.provider {
            Provider::Default(storage) => storage.size(&path),
            Provider::Archive {
                storage,
                entry_path,
            } => {
                let entry_path = entry_path.clone();
                storage.size(&entry_path)
            }
        }
    }

    /// The target's last write time, or [`SystemTime::UNIX_EPOCH`] when the
    /// target does not exist. Never fails.
    pub fn last_write_time_utc(&mut self) -> SystemTime {
        let Some(path) = self.path.clone() else {
            return SystemTime::UNIX_EPOCH;
        };
        match &mut self.provider {
            Provider::Default(storage) => storage.last_write_time_utc(&path),
            Provider::Archive {
                storage,
                entry_path,
            } => {
                let entry_path = entry_path.clone();
                storage.last_write_time_utc(&entry_path)
            }
        }
    }

    /// Opens the target for reading through the resolved provider.
    pub fn open(&mut self) -> Result<Box<dyn Read + '_>> {
        let Some(path) = self.path.clone() else {
            return Err(Error::invalid_argument("path", "location has no path"));
        };
        match &mut self.provider {
            Provider::Default(storage) => storage.open(&path),
            Provider::Archive {
                storage,
                entry_path,
            } => {
                let entry_path = entry_path.clone();
                storage.open(&entry_path)
            }
        }
    }
}
