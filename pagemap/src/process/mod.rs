//! Access to the `/proc/<pid>/maps` and `/proc/<pid>/pagemap` files of a process.
//!
//! If procfs is mounted somewhere other than `/proc`, use
//! [`Process::new_with_root()`](struct.Process.html#method.new_with_root).

use super::*;

use rustix::fd::OwnedFd;
use rustix::fs::{Mode, OFlags};
use std::io::{BufRead, BufReader, SeekFrom};
use std::mem::size_of;


/// Represents a process in `/proc/<pid>`.
///
/// The directory is opened when the `Process` is created, so the files read later always belong to
/// the same process, even if its pid is reused.
#[derive(Debug)]
pub struct Process {
    fd: OwnedFd,
    pub pid: i32,
    pub(crate) root: PathBuf,
}

/// Methods for constructing a new `Process` object.
impl Process {
    /// Returns a `Process` based on a specified PID.
    ///
    /// This can fail if the process doesn't exist, or if you don't have permission to access it.
    pub fn new(pid: i32) -> PagemapResult<Process> {
        let root = PathBuf::from("/proc").join(pid.to_string());
        Self::new_with_root(root)
    }

    /// Returns a `Process` based on a specified `/proc/<pid>` path.
    pub fn new_with_root(root: PathBuf) -> PagemapResult<Process> {
        let flags = OFlags::PATH | OFlags::DIRECTORY | OFlags::CLOEXEC;
        let fd = wrap_io_error!(root, rustix::fs::openat(rustix::fs::CWD, &root, flags, Mode::empty()))?;

        let pidres = root
            .as_path()
            .components()
            .last()
            .and_then(|c| match c {
                std::path::Component::Normal(s) => Some(s),
                _ => None,
            })
            .and_then(|s| s.to_string_lossy().parse::<i32>().ok())
            .or_else(|| {
                rustix::fs::readlinkat(rustix::fs::CWD, &root, Vec::new())
                    .ok()
                    .and_then(|s| s.to_string_lossy().parse::<i32>().ok())
            });
        let pid = match pidres {
            Some(pid) => pid,
            None => return Err(PagemapError::NotFound(Some(root))),
        };

        Ok(Process { fd, pid, root })
    }

    /// Returns a `Process` for the currently running process.
    ///
    /// This is done by using the `/proc/self` symlink
    pub fn myself() -> PagemapResult<Process> {
        let root = PathBuf::from("/proc/self");
        Self::new_with_root(root)
    }
}

impl Process {
    /// Returns the process ID for this process.
    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Is this process still alive?
    pub fn is_alive(&self) -> bool {
        rustix::fs::statat(&self.fd, "maps", rustix::fs::AtFlags::empty()).is_ok()
    }

    /// The lines of `/proc/<pid>/maps`, one memory region per line, in ascending address order.
    ///
    /// The file is opened now, and read lazily.
    pub fn maps_lines(&self) -> PagemapResult<impl Iterator<Item = io::Result<String>>> {
        let file = FileWrapper::open_at(&self.root, &self.fd, "maps")?;
        Ok(BufReader::new(file).lines())
    }

    /// Returns a struct that can be used to access information in the `/proc/pid/pagemap` file.
    pub fn pagemap(&self) -> PagemapResult<PageMap> {
        let file = FileWrapper::open_at(&self.root, &self.fd, "pagemap")?;
        Ok(PageMap::from_file_wrapper(file))
    }

    /// Translates every region of this process, as a lazy sequence of pages.
    ///
    /// Every line of the maps file is translated, including `[vsyscall]` on kernels that show it.
    /// That region has no pagemap records, so the pass will end with a read error there.  Use
    /// [`TranslationEngine::new`] with a filtered [`maps_lines`](Self::maps_lines) to leave it out.
    pub fn translate(
        &self,
        geometry: PageGeometry,
    ) -> PagemapResult<TranslationEngine<impl Iterator<Item = io::Result<String>>, PageMap>> {
        Ok(TranslationEngine::new(self.maps_lines()?, self.pagemap()?, geometry))
    }
}

/// Page table entries from `/proc/<pid>/pagemap`.
///
/// This is a buffered, seekable reader over the file; hand it to a [`TranslationEngine`] to walk
/// whole regions, or use [`get_info`](Self::get_info) for a single page.
pub struct PageMap {
    reader: BufReader<FileWrapper>,
}

impl PageMap {
    pub(crate) fn from_file_wrapper(file: FileWrapper) -> Self {
        Self {
            reader: BufReader::new(file),
        }
    }

    /// Retrieves the page table entry for the page at index `page_index`.
    ///
    /// Some mappings are not accessible, and will return an Err: `vsyscall`
    ///
    /// A `page_index` whose record offset does not fit in a `u64` is a [`PagemapError::Seek`].
    pub fn get_info(&mut self, page_index: u64) -> PagemapResult<PagemapEntry> {
        let offset = match page_index.checked_mul(RECORD_SIZE) {
            Some(offset) => offset,
            None => {
                return Err(PagemapError::Seek {
                    requested: page_index.saturating_mul(RECORD_SIZE),
                    cause: SeekFailure::Io(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("page index {:#x} is past the end of the pagemap", page_index),
                    )),
                })
            }
        };
        seek_exact(&mut self.reader, offset)?;

        let mut info_bytes = [0; size_of::<u64>()];
        self.reader
            .read_exact(&mut info_bytes)
            .map_err(|cause| PagemapError::Read { offset, cause })?;
        Ok(PagemapEntry::from_ne_bytes(info_bytes))
    }
}

impl Read for PageMap {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Seek for PageMap {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.reader.seek(pos)
    }
}
