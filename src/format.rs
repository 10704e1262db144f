//! Archive format identifiers and the process-wide format registry.
//!
//! The registry is a static catalog mapping each [`ArchiveFormat`] to an
//! ordered list of recognized file extensions (first = default) and an
//! ordered list of [`ArchiveImplementation`]s that can service it (first =
//! preferred). Built-in formats (ZIP, GZIP, TAR, BZIP2) are installed on
//! first use; callers may register additional formats, extensions, and
//! implementations at startup.
//!
//! Registration mutates process-wide state. The registry itself is guarded
//! by a mutex, but callers that depend on a specific registration order must
//! serialize their own registration calls.
//!
//! # Examples
//!
//! ```rust
//! use nestar::{ArchiveFormat, formats_from_file_name};
//!
//! let formats = formats_from_file_name("backup.tar.gz");
//! assert_eq!(formats, vec![ArchiveFormat::GZip, ArchiveFormat::Tar]);
//! ```

use std::fmt;
use std::sync::{LazyLock, Mutex, MutexGuard};

use crate::error::{Error, Result};

/// Identifies a compressed archive container kind.
///
/// `None` is a sentinel meaning "no format"; it is never a valid operand for
/// registration or implementation queries. `Other` carries caller-defined
/// format identifiers registered at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// Not an archive format. Never registrable.
    None,
    /// The ZIP container format.
    Zip,
    /// The GZIP member stream format.
    GZip,
    /// The TAR container format.
    Tar,
    /// The BZIP2 stream format. Recognized by extension only; no accessor
    /// implementation ships with this crate.
    BZip2,
    /// A caller-defined format registered at runtime.
    Other(u32),
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Zip => write!(f, "Zip"),
            Self::GZip => write!(f, "GZip"),
            Self::Tar => write!(f, "Tar"),
            Self::BZip2 => write!(f, "BZip2"),
            Self::Other(id) => write!(f, "Other({id})"),
        }
    }
}

/// Identifies a concrete codec/library strategy servicing a format.
///
/// `None` and `Any` are reserved sentinels: `None` means "no implementation"
/// and `Any` means "whichever is preferred". Neither may be registered as a
/// real implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveImplementation {
    /// No implementation. Reserved sentinel.
    None,
    /// Any available implementation. Reserved sentinel used when a caller
    /// has no preference.
    Any,
    /// The implementation shipped with this crate.
    Native,
    /// A caller-defined implementation registered at runtime.
    Other(u32),
}

impl ArchiveImplementation {
    /// Returns `true` for the reserved `None`/`Any` sentinels, which may
    /// never be registered.
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Self::None | Self::Any)
    }
}

impl fmt::Display for ArchiveImplementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Any => write!(f, "Any"),
            Self::Native => write!(f, "Native"),
            Self::Other(id) => write!(f, "Other({id})"),
        }
    }
}

struct FormatRecord {
    format: ArchiveFormat,
    /// Extensions with leading dot, in priority order (first = default).
    extensions: Vec<String>,
    /// Implementations in priority order (first = preferred).
    implementations: Vec<ArchiveImplementation>,
}

pub(crate) struct FormatRegistry {
    /// Registration order is preserved; built-ins come first.
    records: Vec<FormatRecord>,
}

impl FormatRegistry {
    fn with_builtins() -> Self {
        let mut registry = Self {
            records: Vec::new(),
        };
        registry.install(ArchiveFormat::Zip, &[".zip"], &[ArchiveImplementation::Native]);
        registry.install(ArchiveFormat::GZip, &[".gz"], &[ArchiveImplementation::Native]);
        registry.install(ArchiveFormat::Tar, &[".tar"], &[ArchiveImplementation::Native]);
        // BZip2 is recognized in file names but has no accessor, so it
        // carries no implementations and IsFormatSupported reports false.
        registry.install(ArchiveFormat::BZip2, &[".bz2"], &[]);
        registry
    }

    fn install(
        &mut self,
        format: ArchiveFormat,
        extensions: &[&str],
        implementations: &[ArchiveImplementation],
    ) {
        self.records.push(FormatRecord {
            format,
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            implementations: implementations.to_vec(),
        });
    }

    fn record(&self, format: ArchiveFormat) -> Option<&FormatRecord> {
        self.records.iter().find(|r| r.format == format)
    }

    fn record_mut(&mut self, format: ArchiveFormat) -> Option<&mut FormatRecord> {
        self.records.iter_mut().find(|r| r.format == format)
    }

    /// Finds the format owning `extension`, matched case-insensitively.
    /// `extension` must include the leading dot.
    fn format_owning_extension(&self, extension: &str) -> Option<ArchiveFormat> {
        self.records.iter().find_map(|r| {
            r.extensions
                .iter()
                .any(|e| e.eq_ignore_ascii_case(extension))
                .then_some(r.format)
        })
    }
}

static REGISTRY: LazyLock<Mutex<FormatRegistry>> =
    LazyLock::new(|| Mutex::new(FormatRegistry::with_builtins()));

fn registry() -> MutexGuard<'static, FormatRegistry> {
    // Registry state is plain data, so a poisoned lock is still usable.
    REGISTRY.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Returns `true` if at least one implementation is registered for `format`.
///
/// `ArchiveFormat::None`, unregistered formats, and formats recognized only
/// by extension (such as the built-in BZIP2) report `false`.
pub fn is_format_supported(format: ArchiveFormat) -> bool {
    registry()
        .record(format)
        .is_some_and(|r| !r.implementations.is_empty())
}

/// Returns the file extensions registered for `format`, in priority order.
///
/// The first entry is the default extension used when synthesizing a file
/// name. Unknown, `None`, and unregistered formats yield an empty list.
pub fn file_extensions(format: ArchiveFormat) -> Vec<String> {
    registry()
        .record(format)
        .map(|r| r.extensions.clone())
        .unwrap_or_default()
}

/// Decomposes a (possibly compound) file name into the archive formats its
/// extensions identify, outermost (rightmost) first.
///
/// The rightmost recognized extension is stripped repeatedly, case
/// insensitively, until no known extension remains or the remaining name is
/// degenerate (empty, ending in a dot, or only a path separator). A name with
/// no recognized extension yields an empty sequence.
///
/// ```rust
/// use nestar::{ArchiveFormat, formats_from_file_name};
///
/// assert_eq!(
///     formats_from_file_name("baz.zip.tar.gz"),
///     vec![ArchiveFormat::GZip, ArchiveFormat::Tar, ArchiveFormat::Zip],
/// );
/// ```
pub fn formats_from_file_name(file_name: &str) -> Vec<ArchiveFormat> {
    let registry = registry();
    let mut formats = Vec::new();
    let mut rest = file_name;
    loop {
        if rest.is_empty() || rest.ends_with('.') || rest == "/" || rest == "\\" {
            break;
        }
        let Some(dot) = rest.rfind('.') else { break };
        let Some(format) = registry.format_owning_extension(&rest[dot..]) else {
            break;
        };
        formats.push(format);
        rest = &rest[..dot];
    }
    formats
}

/// Registers a new archive format with its extensions and implementations.
///
/// The first extension becomes the default and the first implementation the
/// preferred one. Returns `Ok(true)` on success and `Ok(false)`, leaving all
/// state untouched, if `format` is already registered.
///
/// # Errors
///
/// - [`Error::OutOfRange`] if `format` is `None` or an implementation is a
///   sentinel value.
/// - [`Error::InvalidArgument`] if `extensions` or `implementations` is
///   empty, an extension is malformed, or an extension is already registered
///   to a different format.
pub fn register_format(
    format: ArchiveFormat,
    extensions: &[&str],
    implementations: &[ArchiveImplementation],
) -> Result<bool> {
    if format == ArchiveFormat::None {
        return Err(Error::out_of_range("format", format));
    }
    if extensions.is_empty() {
        return Err(Error::invalid_argument(
            "extensions",
            "at least one file extension is required",
        ));
    }
    if implementations.is_empty() {
        return Err(Error::invalid_argument(
            "implementations",
            "at least one implementation is required",
        ));
    }
    for extension in extensions {
        validate_extension(extension)?;
    }
    for implementation in implementations {
        if implementation.is_sentinel() {
            return Err(Error::out_of_range("implementations", implementation));
        }
    }

    let mut registry = registry();
    if registry.record(format).is_some() {
        return Ok(false);
    }
    for extension in extensions {
        if let Some(owner) = registry.format_owning_extension(extension) {
            return Err(Error::invalid_argument(
                "extensions",
                format!("extension '{extension}' is already registered to format {owner}"),
            ));
        }
    }
    registry.install(format, extensions, implementations);
    Ok(true)
}

/// Adds a file extension to an already-registered format.
///
/// If the extension is already present (case-insensitively), returns
/// `Ok(false)`; with `make_default` it is additionally moved to the front
/// without being duplicated. Otherwise the extension is appended (or
/// prepended when `make_default`) and `Ok(true)` is returned.
///
/// # Errors
///
/// - [`Error::OutOfRange`] if `format` is `None`.
/// - [`Error::InvalidArgument`] naming `extension` if it is malformed or
///   owned by a different format, or naming `format` if the format is
///   unregistered.
pub fn add_file_extension(
    format: ArchiveFormat,
    extension: &str,
    make_default: bool,
) -> Result<bool> {
    if format == ArchiveFormat::None {
        return Err(Error::out_of_range("format", format));
    }
    validate_extension(extension)?;

    let mut registry = registry();
    if registry.record(format).is_none() {
        return Err(Error::invalid_argument(
            "format",
            format!("format {format} is not registered"),
        ));
    }
    match registry.format_owning_extension(extension) {
        Some(owner) if owner == format => {
            if make_default {
                let record = registry.record_mut(format).expect("record checked above");
                let position = record
                    .extensions
                    .iter()
                    .position(|e| e.eq_ignore_ascii_case(extension))
                    .expect("extension checked above");
                let existing = record.extensions.remove(position);
                record.extensions.insert(0, existing);
            }
            Ok(false)
        }
        Some(owner) => Err(Error::invalid_argument(
            "extension",
            format!("extension '{extension}' is already registered to format {owner}"),
        )),
        None => {
            let record = registry.record_mut(format).expect("record checked above");
            if make_default {
                record.extensions.insert(0, extension.to_string());
            } else {
                record.extensions.push(extension.to_string());
            }
            Ok(true)
        }
    }
}

/// Adds an implementation to an already-registered format.
///
/// Same reorder-without-duplicate semantics as [`add_file_extension`]: an
/// already-present implementation returns `Ok(false)` and is moved to the
/// front when `make_preferred` is set.
///
/// # Errors
///
/// - [`Error::OutOfRange`] if `format` is `None` or `implementation` is a
///   sentinel (`None`/`Any`).
/// - [`Error::InvalidArgument`] naming `format` if it is unregistered.
pub fn add_implementation(
    format: ArchiveFormat,
    implementation: ArchiveImplementation,
    make_preferred: bool,
) -> Result<bool> {
    if format == ArchiveFormat::None {
        return Err(Error::out_of_range("format", format));
    }
    if implementation.is_sentinel() {
        return Err(Error::out_of_range("implementation", implementation));
    }

    let mut registry = registry();
    let Some(record) = registry.record_mut(format) else {
        return Err(Error::invalid_argument(
            "format",
            format!("format {format} is not registered"),
        ));
    };
    if let Some(position) = record
        .implementations
        .iter()
        .position(|i| *i == implementation)
    {
        if make_preferred && position != 0 {
            record.implementations.remove(position);
            record.implementations.insert(0, implementation);
        }
        Ok(false)
    } else {
        if make_preferred {
            record.implementations.insert(0, implementation);
        } else {
            record.implementations.push(implementation);
        }
        Ok(true)
    }
}

/// Returns the implementations registered for `format` in priority order,
/// or an empty list for unregistered formats.
pub fn available_implementations(format: ArchiveFormat) -> Vec<ArchiveImplementation> {
    registry()
        .record(format)
        .map(|r| r.implementations.clone())
        .unwrap_or_default()
}

/// Returns the preferred (first-registered) implementation for `format`, or
/// [`ArchiveImplementation::None`] when none is registered.
pub fn preferred_implementation(format: ArchiveFormat) -> ArchiveImplementation {
    registry()
        .record(format)
        .and_then(|r| r.implementations.first().copied())
        .unwrap_or(ArchiveImplementation::None)
}

/// Validates the shape of a file extension: a leading dot followed by at
/// least one character, no separators, no control characters, and no second
/// dot (only single-level extensions are allowed).
fn validate_extension(extension: &str) -> Result<()> {
    if extension.trim().is_empty() {
        return Err(Error::invalid_argument(
            "extension",
            "must not be empty or whitespace",
        ));
    }
    if !extension.starts_with('.') {
        return Err(Error::invalid_argument(
            "extension",
            format!("'{extension}' must start with '.'"),
        ));
    }
    if extension.len() < 2 {
        return Err(Error::invalid_argument(
            "extension",
            "must name at least one character after the dot",
        ));
    }
    if extension.contains(['/', '\\']) {
        return Err(Error::invalid_argument(
            "extension",
            format!("'{extension}' must not contain path separators"),
        ));
    }
    if extension.chars().any(char::is_control) {
        return Err(Error::invalid_argument(
            "extension",
            "must not contain control characters",
        ));
    }
    if extension[1..].contains('.') {
        return Err(Error::invalid_argument(
            "extension",
            format!("'{extension}' must be a single-level extension"),
        ));
    }
    Ok(())
}
