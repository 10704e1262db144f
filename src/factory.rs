//! The implementation factory registry and the `open` entry points.
//!
//! Each (format, implementation) pair maps to at most one constructor
//! callback producing a concrete accessor bound to a stream and an access
//! mode. The built-in `Native` constructors for ZIP, GZIP, and TAR are
//! installed on first use; callers register additional pairs at startup.

use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::Path;
use std::sync::{LazyLock, Mutex, MutexGuard};

use crate::access::gzip::GzipArchiveAccess;
use crate::access::tar::TarArchiveAccess;
use crate::access::zip::ZipArchiveAccess;
use crate::access::{AccessMode, ArchiveAccess, ArchiveEntry, ArchiveStream};
use crate::error::{Error, Result};
use crate::format::{ArchiveFormat, ArchiveImplementation, preferred_implementation};

/// Constructor callback producing an accessor over a stream.
///
/// Factories must honor the mode contract: reject `Create` on non-empty
/// streams and fix the mode for the accessor's lifetime.
pub type AccessorFactory = for<'s> fn(
    Box<dyn ArchiveStream + 's>,
    AccessMode,
) -> Result<Box<dyn ArchiveAccess + 's>>;

fn new_zip_access<'s>(
    stream: Box<dyn ArchiveStream + 's>,
    mode: AccessMode,
) -> Result<Box<dyn ArchiveAccess + 's>> {
    Ok(Box::new(ZipArchiveAccess::new(stream, mode)?))
}

fn new_gzip_access<'s>(
    stream: Box<dyn ArchiveStream + 's>,
    mode: AccessMode,
) -> Result<Box<dyn ArchiveAccess + 's>> {
    Ok(Box::new(GzipArchiveAccess::new(stream, mode)?))
}

fn new_tar_access<'s>(
    stream: Box<dyn ArchiveStream + 's>,
    mode: AccessMode,
) -> Result<Box<dyn ArchiveAccess + 's>> {
    Ok(Box::new(TarArchiveAccess::new(stream, mode)?))
}

type FactoryKey = (ArchiveFormat, ArchiveImplementation);

static FACTORIES: LazyLock<Mutex<Vec<(FactoryKey, AccessorFactory)>>> = LazyLock::new(|| {
    Mutex::new(vec![
        (
            (ArchiveFormat::Zip, ArchiveImplementation::Native),
            new_zip_access as AccessorFactory,
        ),
        (
            (ArchiveFormat::GZip, ArchiveImplementation::Native),
            new_gzip_access as AccessorFactory,
        ),
        (
            (ArchiveFormat::Tar, ArchiveImplementation::Native),
            new_tar_access as AccessorFactory,
        ),
    ])
});

fn factories() -> MutexGuard<'static, Vec<(FactoryKey, AccessorFactory)>> {
    FACTORIES.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registers a constructor for a (format, implementation) pair.
///
/// Returns `Ok(false)`, leaving the existing registration untouched, if the
/// exact pair is already registered.
///
/// # Errors
///
/// [`Error::OutOfRange`] if `format` is `None` or `implementation` is a
/// sentinel (`None`/`Any`).
pub fn register_factory(
    format: ArchiveFormat,
    implementation: ArchiveImplementation,
    factory: AccessorFactory,
) -> Result<bool> {
    if format == ArchiveFormat::None {
        return Err(Error::out_of_range("format", format));
    }
    if implementation.is_sentinel() {
        return Err(Error::out_of_range("implementation", implementation));
    }
    let mut factories = factories();
    if factories.iter().any(|(key, _)| *key == (format, implementation)) {
        return Ok(false);
    }
    factories.push(((format, implementation), factory));
    Ok(true)
}

/// Opens an archive accessor over `stream`.
///
/// `implementation` of `None` (or the `Any` sentinel) resolves to the
/// format's preferred implementation per the format registry.
///
/// # Errors
///
/// [`Error::NotSupported`] when no factory is registered for the resolved
/// (format, implementation) pair; otherwise whatever the constructor
/// reports (bad content, mode conflicts).
pub fn open<'s>(
    stream: Box<dyn ArchiveStream + 's>,
    format: ArchiveFormat,
    mode: AccessMode,
    implementation: Option<ArchiveImplementation>,
) -> Result<Box<dyn ArchiveAccess + 's>> {
    let implementation = match implementation {
        None | Some(ArchiveImplementation::Any) | Some(ArchiveImplementation::None) => {
            preferred_implementation(format)
        }
        Some(other) => other,
    };
    let factory = factories()
        .iter()
        .find(|(key, _)| *key == (format, implementation))
        .map(|(_, factory)| *factory)
        .ok_or_else(|| {
            Error::not_supported(format!(
                "no factory registered for format {format} with implementation {implementation}"
            ))
        })?;
    factory(stream, mode)
}

/// Opens an archive accessor over the file at `path`, determining the
/// format from the file name's (outermost) extension.
///
/// The file is opened with mode-appropriate access: `Read` requires an
/// existing file, `Create` requires that none exists, and `Update` opens or
/// creates one. Entry lookups on the returned accessor additionally accept
/// absolute in-archive paths, i.e. the archive file path joined with an
/// entry name.
///
/// # Errors
///
/// [`Error::InvalidOperation`] when the extension maps to no known format;
/// [`Error::NotSupported`] when no factory exists; I/O errors from the
/// file system.
pub fn open_path(
    path: impl AsRef<Path>,
    mode: AccessMode,
    implementation: Option<ArchiveImplementation>,
) -> Result<FileArchiveAccess> {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::invalid_argument("path", "path has no file name"))?;
    let format = crate::format::formats_from_file_name(file_name)
        .first()
        .copied()
        .ok_or_else(|| {
            Error::invalid_operation(format!(
                "'{file_name}' has no recognized archive extension"
            ))
        })?;

    let file: File = match mode {
        AccessMode::Read => OpenOptions::new().read(true).open(path)?,
        AccessMode::Create => OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?,
        AccessMode::Update => OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?,
    };

    let inner = open(Box::new(file), format, mode, implementation)?;
    Ok(FileArchiveAccess {
        inner,
        path: path.to_string_lossy().replace('\\', "/"),
    })
}

/// A file-backed accessor that accepts absolute in-archive entry paths.
///
/// Wraps the format accessor opened by [`open_path`]; names of the form
/// `<archive file path>/<entry name>` are resolved to `<entry name>` before
/// delegation, so callers can address entries with fully qualified paths.
pub struct FileArchiveAccess {
    inner: Box<dyn ArchiveAccess>,
    path: String,
}

impl FileArchiveAccess {
    /// The file path this accessor was opened from, forward-slash separated.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn resolve<'n>(&self, name: &'n str) -> Cow<'n, str> {
        // The stored path is forward-slash normalized; match names the
        // same way.
        let normalized: Cow<'n, str> = if name.contains('\\') {
            Cow::Owned(name.replace('\\', "/"))
        } else {
            Cow::Borrowed(name)
        };
        let Some(rest) = normalized.strip_prefix(self.path.as_str()) else {
            return normalized;
        };
        let rest = rest.trim_start_matches('/');
        if rest.is_empty() {
            normalized
        } else {
            Cow::Owned(rest.to_string())
        }
    }
}

impl ArchiveAccess for FileArchiveAccess {
    fn format(&self) -> ArchiveFormat {
        self.inner.format()
    }

    fn mode(&self) -> AccessMode {
        self.inner.mode()
    }

    fn is_archive(&self) -> bool {
        self.inner.is_archive()
    }

    fn is_compressed(&self) -> bool {
        self.inner.is_compressed()
    }

    fn entries(&self) -> &[ArchiveEntry] {
        self.inner.entries()
    }

    fn find_entry(&self, name: &str) -> Option<&ArchiveEntry> {
        self.inner.find_entry(&self.resolve(name))
    }

    fn open_entry<'a>(&'a mut self, name: &str) -> Result<Option<Box<dyn Read + 'a>>> {
        let name = self.resolve(name).to_string();
        self.inner.open_entry(&name)
    }

    fn create_entry(&mut self, name: &str, data: &mut dyn Read) -> Result<ArchiveEntry> {
        let name = self.resolve(name).to_string();
        self.inner.create_entry(&name, data)
    }

    fn delete_entry(&mut self, name: &str) -> Result<bool> {
        let name = self.resolve(name).to_string();
        self.inner.delete_entry(&name)
    }

    fn finish(&mut self) -> Result<()> {
        self.inner.finish()
    }
}
