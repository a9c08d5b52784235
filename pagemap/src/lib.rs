#![allow(unknown_lints)]
#![deny(broken_intra_doc_links, invalid_html_tags)]
//! This crate shows where the virtual pages of a linux process live in physical memory.
//!
//! It reads two files from the `procfs` filesystem, usually mounted at `/proc`:
//!
//! * `/proc/<pid>/maps`, which lists the virtual memory regions of the process, and
//! * `/proc/<pid>/pagemap`, which holds one 64-bit record per virtual page.
//!
//! The parsing and decoding live in the `pagemap-core` crate, which is re-exported here.  This
//! crate adds the parts that touch the running system: the page size, and opening the files.
//!
//! # Permissions
//!
//! Reading another process's `pagemap` requires `PTRACE_MODE_READ` access to it.  Since Linux 4.2
//! the page frame numbers in `pagemap` read as zero unless the reader has `CAP_SYS_ADMIN`, so
//! without root every present page resolves to physical address 0.
//!
//! # Examples
//!
//! ```rust
//! use pagemap::process::Process;
//! use pagemap::{Detect, MMapPath, PageGeometry};
//!
//! let geometry = PageGeometry::detect().unwrap();
//! let me = Process::myself().unwrap();
//!
//! // [vsyscall] lies above the user address limit, and has no pagemap records
//! let lines = me
//!     .maps_lines()
//!     .unwrap()
//!     .filter(|line| !matches!(line.as_deref().map(MMapPath::from_maps_line), Ok(Ok(MMapPath::Vsyscall))));
//!
//! let engine = pagemap::TranslationEngine::new(lines, me.pagemap().unwrap(), geometry);
//! let present = engine.filter_map(Result::ok).filter(|page| page.present).count();
//! assert!(present > 0);
//! ```

pub use pagemap_core::*;

use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};

use rustix::fd::AsFd;

macro_rules! wrap_io_error {
    ($path:expr, $expr:expr) => {
        match $expr {
            Ok(v) => Ok(v),
            Err(e) => {
                let kind = e.kind();
                Err(::std::io::Error::new(
                    kind,
                    crate::IoErrorWrapper {
                        path: $path.to_owned(),
                        inner: e.into(),
                    },
                ))
            }
        }
    };
}

pub mod process;

/// A wrapper around a `File` that remembers the name of the path
struct FileWrapper {
    inner: File,
    path: PathBuf,
}

impl FileWrapper {
    fn open_at<P, Q, Fd: AsFd>(root: P, dirfd: Fd, path: Q) -> Result<FileWrapper, io::Error>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        use rustix::fs::{Mode, OFlags};

        let p = root.as_ref().join(path.as_ref());
        let fd = wrap_io_error!(
            p,
            rustix::fs::openat(dirfd, path.as_ref(), OFlags::RDONLY | OFlags::CLOEXEC, Mode::empty())
        )?;
        Ok(FileWrapper {
            inner: File::from(fd),
            path: p,
        })
    }
}

impl Read for FileWrapper {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        wrap_io_error!(self.path, self.inner.read(buf))
    }
    fn read_to_end(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        wrap_io_error!(self.path, self.inner.read_to_end(buf))
    }
    fn read_to_string(&mut self, buf: &mut String) -> io::Result<usize> {
        wrap_io_error!(self.path, self.inner.read_to_string(buf))
    }
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        wrap_io_error!(self.path, self.inner.read_exact(buf))
    }
}

impl Seek for FileWrapper {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        wrap_io_error!(self.path, self.inner.seek(pos))
    }
}

/// Values that are read from the running system rather than from a file.
pub trait Detect: Sized {
    fn detect() -> PagemapResult<Self>;
}

impl Detect for PageGeometry {
    /// Builds the geometry from `sysconf(_SC_PAGESIZE)`.
    ///
    /// Call this once and pass the result around; the page size does not change while the
    /// system is running.
    fn detect() -> PagemapResult<Self> {
        PageGeometry::new(page_size())
    }
}

/// Memory page size, in bytes.
///
/// This is calculated from `sysconf(_SC_PAGESIZE)`.
pub fn page_size() -> u64 {
    rustix::param::page_size() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size() {
        let libc_page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        assert_eq!(page_size(), libc_page_size as u64);
    }

    #[test]
    fn test_detect_geometry() {
        let geometry = PageGeometry::detect().unwrap();
        assert_eq!(geometry.page_size(), page_size());
        assert_eq!(1u64 << geometry.page_shift(), geometry.page_size());
    }

    #[test]
    fn test_file_io_errors() {
        fn inner<P: AsRef<Path>>(p: P) -> Result<(), PagemapError> {
            let mut file = FileWrapper::open_at("", rustix::fs::CWD, p)?;

            let mut buf = [0; 128];
            file.read_exact(&mut buf[0..128])?;

            Ok(())
        }

        let err = inner("/this_should_not_exist").unwrap_err();
        println!("{}", err);

        match err {
            PagemapError::NotFound(Some(p)) => {
                assert_eq!(p, Path::new("/this_should_not_exist"));
            }
            x => panic!("Unexpected return value: {:?}", x),
        }

        // comm is at most 16 bytes, so this is a short read
        match inner("/proc/self/comm") {
            Err(PagemapError::Io(e, Some(p))) => {
                assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof);
                assert_eq!(p, Path::new("/proc/self/comm"));
            }
            x => panic!("Unexpected return value: {:?}", x),
        }
    }
}
