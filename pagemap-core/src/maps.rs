use crate::{PageGeometry, PagemapError, PagemapResult};

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// The `[start, end)` address interval at the start of a `/proc/<pid>/maps` line.
///
/// No check is made that `end > start`; see [`VirtualRange::is_degenerate`].
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualRange {
    /// First address in the region
    pub start: u64,
    /// One past the last address in the region
    pub end: u64,
}

impl VirtualRange {
    pub fn new(start: u64, end: u64) -> VirtualRange {
        VirtualRange { start, end }
    }

    /// Size of the region in bytes, or 0 if `end` is not after `start`.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A range is degenerate if it does not cover at least one whole page.
    pub fn is_degenerate(&self, geometry: PageGeometry) -> bool {
        self.len() < geometry.page_size()
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.start <= addr && addr < self.end
    }
}

impl FromStr for VirtualRange {
    type Err = PagemapError;

    /// Parses the leading `<hex>-<hex>` token of a maps line.  Everything after the first
    /// whitespace is ignored.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let malformed = || PagemapError::MalformedRange(line.to_string());

        let token = line.split_whitespace().next().ok_or_else(malformed)?;
        let (start, end) = token.split_once('-').ok_or_else(malformed)?;
        let start = u64::from_str_radix(start, 16).map_err(|_| malformed())?;
        let end = u64::from_str_radix(end, 16).map_err(|_| malformed())?;

        Ok(VirtualRange { start, end })
    }
}

/// What backs a memory mapping, from the last field of a maps line.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum MMapPath {
    /// The file that is backing the mapping.
    Path(PathBuf),
    /// The process's heap.
    Heap,
    /// The initial process's (also known as the main thread's) stack.
    Stack,
    /// A thread's stack (where the `<tid>` is a thread ID).  It corresponds to the
    /// `/proc/<pid>/task/<tid>/` path.
    ///
    /// (since Linux 3.4)
    TStack(u32),
    /// The virtual dynamically linked shared object.
    Vdso,
    /// Shared kernel variables
    Vvar,
    /// obsolete virtual syscalls, succeeded by vdso
    ///
    /// This region lies above the user address limit and has no pagemap records.
    Vsyscall,
    /// An anonymous mapping as obtained via mmap(2).
    Anonymous,
    /// Some other pseudo-path
    Other(String),
}

impl MMapPath {
    pub fn from(path: &str) -> PagemapResult<MMapPath> {
        Ok(match path.trim() {
            "" => MMapPath::Anonymous,
            "[heap]" => MMapPath::Heap,
            "[stack]" => MMapPath::Stack,
            "[vdso]" => MMapPath::Vdso,
            "[vvar]" => MMapPath::Vvar,
            "[vsyscall]" => MMapPath::Vsyscall,
            x if x.starts_with("[stack:") => {
                let tid = expect!(x.strip_prefix("[stack:").and_then(|s| s.strip_suffix(']')));
                MMapPath::TStack(from_str!(u32, tid))
            }
            x => match x.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                Some(name) => MMapPath::Other(name.to_string()),
                None => MMapPath::Path(PathBuf::from(x)),
            },
        })
    }

    /// Classifies the pathname field of a whole maps line.
    ///
    /// The pathname is the sixth space-separated field; lines with fewer fields are anonymous.
    pub fn from_maps_line(line: &str) -> PagemapResult<MMapPath> {
        let path = line.splitn(6, ' ').nth(5).unwrap_or("");
        MMapPath::from(path)
    }
}
