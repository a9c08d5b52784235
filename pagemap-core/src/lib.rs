#![allow(unknown_lints)]
#![deny(broken_intra_doc_links, invalid_html_tags)]
//! Data structures and decoding for the linux `/proc/<pid>/maps` and `/proc/<pid>/pagemap`
//! files.
//!
//! This crate performs no I/O of its own.  The [`TranslationEngine`] is generic over a source of
//! map lines and a seekable source of pagemap records, so it can be driven by the real files in
//! `/proc` (see the `pagemap` crate) or by in-memory buffers.
//!
//! # Overview
//!
//! Each line of `/proc/<pid>/maps` describes one virtual memory region.  For every region the
//! engine:
//!
//! 1. parses the `<start>-<end>` address range ([`VirtualRange`]),
//! 2. works out where the first page's record lives in `pagemap` and how many pages the region
//!    spans ([`TranslationRequest`]),
//! 3. reads one 64-bit record per page and decodes it ([`PagemapEntry`], [`ResolvedPage`]),
//! 4. buckets the resulting physical address into a 512 MiB stripe ([`classify`]).
//!
//! ```
//! use pagemap_core::{PageGeometry, TranslationEngine};
//! use std::io::Cursor;
//!
//! let geometry = PageGeometry::new(0x1000).unwrap();
//! let maps = "1000-3000 r--p 00000000 00:00 0\n";
//! // one record per virtual page, indexed from virtual address 0
//! let mut table = vec![0u8; 8 * 3];
//! table[8..16].copy_from_slice(&(1u64 << 63 | 0x42).to_ne_bytes());
//!
//! let engine = TranslationEngine::from_buf_read(Cursor::new(maps), Cursor::new(table), geometry);
//! let pages = engine.collect::<Result<Vec<_>, _>>().unwrap();
//! assert_eq!(pages.len(), 2);
//! assert!(pages[0].present);
//! assert_eq!(pages[0].physical_addr, 0x42000);
//! ```
//!
//! # Cargo features
//!
//! * `serde1` -- Optional.  Derives `Serialize` (and `Deserialize` where it cannot break an
//!   invariant) for the data types in this crate.
//! * `backtrace` -- Optional.  Captures a stack trace whenever an `InternalError` is raised.

use std::fmt;
use std::io;
use std::path::PathBuf;

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

macro_rules! build_internal_error {
    ($err: expr) => {
        crate::PagemapError::InternalError(crate::InternalError {
            msg: format!("Internal Unwrap Error: {}", $err),
            file: file!(),
            line: line!(),
            #[cfg(feature = "backtrace")]
            backtrace: backtrace::Backtrace::new(),
        })
    };
    ($err: expr, $msg: expr) => {
        crate::PagemapError::InternalError(crate::InternalError {
            msg: format!("Internal Unwrap Error: {}: {}", $msg, $err),
            file: file!(),
            line: line!(),
            #[cfg(feature = "backtrace")]
            backtrace: backtrace::Backtrace::new(),
        })
    };
}

macro_rules! expect {
    ($e:expr) => {
        match crate::IntoResult::into($e) {
            Ok(v) => v,
            Err(e) => return Err(build_internal_error!(e)),
        }
    };
    ($e:expr, $msg:expr) => {
        match crate::IntoResult::into($e) {
            Ok(v) => v,
            Err(e) => return Err(build_internal_error!(e, $msg)),
        }
    };
}

macro_rules! from_str {
    ($t:tt, $e:expr) => {{
        let e = $e;
        expect!(
            $t::from_str_radix(e, 10),
            format!("Failed to parse {} ({:?}) as a {}", stringify!($e), e, stringify!($t),)
        )
    }};
    ($t:tt, $e:expr, $radix:expr) => {{
        let e = $e;
        expect!(
            $t::from_str_radix(e, $radix),
            format!("Failed to parse {} ({:?}) as a {}", stringify!($e), e, stringify!($t))
        )
    }};
}

mod types;
pub use types::*;

mod geometry;
pub use geometry::*;

mod maps;
pub use maps::*;

mod request;
pub use request::*;

mod entry;
pub use entry::*;

mod stripe;
pub use stripe::*;

mod engine;
pub use engine::*;

pub(crate) trait IntoResult<T, E> {
    fn into(t: Self) -> Result<T, E>;
}

impl<T> IntoResult<T, NoneError> for Option<T> {
    fn into(t: Option<T>) -> Result<T, NoneError> {
        t.ok_or(NoneError)
    }
}

impl<T, E> IntoResult<T, E> for Result<T, E> {
    fn into(t: Result<T, E>) -> Result<T, E> {
        t
    }
}

#[doc(hidden)]
#[derive(Debug)]
pub struct NoneError;

impl fmt::Display for NoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NoneError")
    }
}

/// An I/O error that remembers the path of the file it came from.
///
/// This is carried inside a `std::io::Error`, and unpacked again when the `io::Error` is
/// converted into a [`PagemapError`].
#[derive(Debug)]
pub struct IoErrorWrapper {
    pub path: PathBuf,
    pub inner: io::Error,
}

impl std::error::Error for IoErrorWrapper {}

impl fmt::Display for IoErrorWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IoErrorWrapper({}): {}", self.path.display(), self.inner)
    }
}

/// How a seek into the pagemap failed.
#[derive(Debug)]
pub enum SeekFailure {
    /// The seek succeeded, but the reported position is not the requested offset.
    Landed(u64),
    /// The seek itself returned an error.
    Io(io::Error),
}

/// The various error conditions in the pagemap crates.
///
/// Every variant except the path-carrying I/O ones corresponds to a fatal condition of a
/// translation pass.  Once a [`TranslationEngine`] yields one of these it yields nothing else.
#[derive(Debug)]
pub enum PagemapError {
    /// A standard permission denied error.
    ///
    /// This will be a common error, since reading another process's pagemap requires
    /// `PTRACE_MODE_READ` access.
    PermissionDenied(Option<PathBuf>),
    /// This might mean that the process no longer exists, or that your kernel doesn't support the
    /// feature you are trying to use.
    NotFound(Option<PathBuf>),
    /// Any other IO error (rare).
    Io(io::Error, Option<PathBuf>),
    /// The page size reported by the system cannot be used to address the pagemap.
    Configuration(String),
    /// A line of the maps file does not start with two hexadecimal addresses.
    MalformedRange(String),
    /// Positioning the pagemap at a record offset failed.
    Seek { requested: u64, cause: SeekFailure },
    /// A pagemap record could not be read in full.
    Read { offset: u64, cause: io::Error },
    /// An error caused by a bug in this library.
    InternalError(InternalError),
}

/// An internal error in the pagemap crates
///
/// If you encounter this error, consider it a bug and please report it, along with the maps
/// line or pagemap offset that triggered it.
///
/// If you compile with the optional `backtrace` feature (disabled by default),
/// you can gain access to a stack trace of where the error happened.
#[cfg_attr(feature = "serde1", derive(Serialize))]
pub struct InternalError {
    pub msg: String,
    pub file: &'static str,
    pub line: u32,
    #[cfg(feature = "backtrace")]
    #[cfg_attr(feature = "serde1", serde(skip))]
    pub backtrace: backtrace::Backtrace,
}

impl fmt::Debug for InternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bug at {}:{} (please report this pagemap bug)\n{}",
            self.file, self.line, self.msg
        )
    }
}

impl fmt::Display for InternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bug at {}:{} (please report this pagemap bug)\n{}",
            self.file, self.line, self.msg
        )
    }
}

impl From<io::Error> for PagemapError {
    fn from(io: io::Error) -> Self {
        use io::ErrorKind;
        let kind = io.kind();
        // the only way we'll have a path for the IO error is if this IO error
        // has an IoErrorWrapper inside
        if !io.get_ref().map_or(false, |inner| inner.is::<IoErrorWrapper>()) {
            return match kind {
                ErrorKind::PermissionDenied => PagemapError::PermissionDenied(None),
                ErrorKind::NotFound => PagemapError::NotFound(None),
                _other => PagemapError::Io(io, None),
            };
        }
        match io.into_inner().map(|inner| inner.downcast::<IoErrorWrapper>()) {
            Some(Ok(wrapper)) => {
                let IoErrorWrapper { path, inner } = *wrapper;
                match kind {
                    ErrorKind::PermissionDenied => PagemapError::PermissionDenied(Some(path)),
                    ErrorKind::NotFound => PagemapError::NotFound(Some(path)),
                    _other => {
                        const ESRCH: i32 = 3;
                        if matches!(inner.raw_os_error(), Some(raw) if raw == ESRCH) {
                            // "No such process" means the /proc/<pid> directory went away
                            PagemapError::NotFound(Some(path))
                        } else {
                            PagemapError::Io(inner, Some(path))
                        }
                    }
                }
            }
            Some(Err(other)) => PagemapError::Io(io::Error::new(kind, other), None),
            None => PagemapError::Io(io::Error::from(kind), None),
        }
    }
}

impl From<std::num::ParseIntError> for PagemapError {
    fn from(e: std::num::ParseIntError) -> Self {
        build_internal_error!(e)
    }
}

impl fmt::Display for PagemapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PagemapError::PermissionDenied(Some(p)) => write!(f, "Permission Denied: {}", p.display()),
            PagemapError::PermissionDenied(None) => write!(f, "Permission Denied"),
            PagemapError::NotFound(Some(p)) => write!(f, "File not found: {}", p.display()),
            PagemapError::NotFound(None) => write!(f, "File not found"),
            PagemapError::Io(inner, Some(p)) => write!(f, "Unexpected IO error({}): {}", p.display(), inner),
            PagemapError::Io(inner, None) => write!(f, "Unexpected IO error: {}", inner),
            PagemapError::Configuration(msg) => write!(f, "Unusable page geometry: {}", msg),
            PagemapError::MalformedRange(line) => write!(f, "Not a valid address range: {:?}", line),
            PagemapError::Seek {
                requested,
                cause: SeekFailure::Landed(pos),
            } => write!(f, "Seek to pagemap offset {:#x} landed at {:#x}", requested, pos),
            PagemapError::Seek {
                requested,
                cause: SeekFailure::Io(inner),
            } => write!(f, "Failed to seek pagemap to offset {:#x}: {}", requested, inner),
            PagemapError::Read { offset, cause } => {
                write!(f, "Failed to read pagemap record at offset {:#x}: {}", offset, cause)
            }
            PagemapError::InternalError(e) => write!(f, "Internal error: {}", e),
        }
    }
}

impl std::error::Error for PagemapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PagemapError::Io(inner, _) => Some(inner),
            PagemapError::Seek {
                cause: SeekFailure::Io(inner),
                ..
            } => Some(inner),
            PagemapError::Read { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

/// Common result type of pagemap operations.
pub type PagemapResult<T> = Result<T, PagemapError>;
