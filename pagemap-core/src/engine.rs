use crate::{PageGeometry, PagemapError, PagemapResult, ResolvedPage, SeekFailure, TranslationRequest, VirtualRange};
use crate::{PagemapEntry, RECORD_SIZE};

use std::io::{self, BufRead, Read, Seek, SeekFrom};
use std::iter::FusedIterator;
use std::mem::size_of;

/// A maps line being translated, and how far through it we are.
#[derive(Debug)]
struct Region {
    line: String,
    request: TranslationRequest,
    next_page: u64,
}

#[derive(Debug)]
enum State {
    ReadingRanges,
    ReadingRecords(Region),
    Done,
}

/// Translates every page of every region in a maps file, in order.
///
/// `lines` yields the lines of `/proc/<pid>/maps` (or anything in that format), and `table` is the
/// matching `/proc/<pid>/pagemap`.  The engine is an iterator of [`ResolvedPage`]s, one per
/// virtual page, grouped by region in the order the lines were given.
///
/// Regions smaller than a page are skipped.  Any other problem (an unparseable line, a seek that
/// does not land on the requested offset, a short read) is yielded once as an `Err`, after which
/// the iterator is exhausted.  Pages yielded before the error should not be treated as a complete
/// translation.
///
/// The engine owns `table` and relies on its file position between calls to `next`, so nothing
/// else should touch it while the engine is alive.
#[derive(Debug)]
pub struct TranslationEngine<L, T> {
    lines: L,
    table: T,
    geometry: PageGeometry,
    state: State,
}

impl<R: BufRead, T: Read + Seek> TranslationEngine<io::Lines<R>, T> {
    /// Reads maps lines from a `BufRead`.
    pub fn from_buf_read(maps: R, table: T, geometry: PageGeometry) -> Self {
        TranslationEngine::new(maps.lines(), table, geometry)
    }
}

impl<L, T> TranslationEngine<L, T>
where
    L: Iterator<Item = io::Result<String>>,
    T: Read + Seek,
{
    pub fn new(lines: L, table: T, geometry: PageGeometry) -> Self {
        TranslationEngine {
            lines,
            table,
            geometry,
            state: State::ReadingRanges,
        }
    }

    pub fn geometry(&self) -> PageGeometry {
        self.geometry
    }

    /// The maps line whose pages are currently being yielded.
    ///
    /// After `next` returns a page, this is the line that page came from.
    pub fn current_line(&self) -> Option<&str> {
        match &self.state {
            State::ReadingRecords(region) => Some(&region.line),
            _ => None,
        }
    }

    /// The request for the region returned by [`current_line`](Self::current_line).
    pub fn current_request(&self) -> Option<&TranslationRequest> {
        match &self.state {
            State::ReadingRecords(region) => Some(&region.request),
            _ => None,
        }
    }

    /// Pulls maps lines until one needs translating, and positions the table at its first record.
    ///
    /// Returns `Ok(false)` once the lines run out.
    fn next_region(&mut self) -> PagemapResult<bool> {
        for line in &mut self.lines {
            let line = line?;
            let range: VirtualRange = line.parse()?;
            log::trace!("range {:#x}-{:#x} ({:#x} bytes)", range.start, range.end, range.len());

            let request = match TranslationRequest::compute(range, self.geometry) {
                Some(request) => request,
                None => {
                    log::debug!(
                        "skipping {:#x}-{:#x}: smaller than a {:#x} byte page",
                        range.start,
                        range.end,
                        self.geometry.page_size()
                    );
                    continue;
                }
            };
            log::debug!(
                "translating {:#x}-{:#x}: {} pages at pagemap offset {:#x}",
                range.start,
                range.end,
                request.page_count,
                request.table_offset
            );

            seek_exact(&mut self.table, request.table_offset)?;
            self.state = State::ReadingRecords(Region {
                line,
                request,
                next_page: 0,
            });
            return Ok(true);
        }

        Ok(false)
    }

    fn step(&mut self) -> PagemapResult<Option<ResolvedPage>> {
        loop {
            if let State::ReadingRecords(region) = &mut self.state {
                if region.next_page < region.request.page_count {
                    let page_index = region.next_page;
                    let offset = region.request.record_offset(page_index);
                    let range_start = region.request.range.start;
                    region.next_page += 1;

                    let raw = read_record(&mut self.table, offset)?;
                    let page = ResolvedPage::decode(raw.0, page_index, range_start, self.geometry.page_size());
                    return Ok(Some(page));
                }
            }

            // either nothing has been read yet, or the current region is used up
            self.state = State::ReadingRanges;
            if !self.next_region()? {
                return Ok(None);
            }
        }
    }
}

/// Seeks to `offset`, failing unless the reported position is exactly `offset`.
///
/// Both failures are reported as [`PagemapError::Seek`].
pub fn seek_exact<T: Seek>(table: &mut T, offset: u64) -> PagemapResult<()> {
    match table.seek(SeekFrom::Start(offset)) {
        Ok(pos) if pos == offset => Ok(()),
        Ok(pos) => Err(PagemapError::Seek {
            requested: offset,
            cause: SeekFailure::Landed(pos),
        }),
        Err(e) => Err(PagemapError::Seek {
            requested: offset,
            cause: SeekFailure::Io(e),
        }),
    }
}

/// Reads one record from the current position; `offset` is that position, for error reporting.
fn read_record<T: Read>(table: &mut T, offset: u64) -> PagemapResult<PagemapEntry> {
    let mut info_bytes = [0; size_of::<u64>()];
    debug_assert_eq!(info_bytes.len() as u64, RECORD_SIZE);

    table
        .read_exact(&mut info_bytes)
        .map_err(|cause| PagemapError::Read { offset, cause })?;
    Ok(PagemapEntry::from_ne_bytes(info_bytes))
}

impl<L, T> Iterator for TranslationEngine<L, T>
where
    L: Iterator<Item = io::Result<String>>,
    T: Read + Seek,
{
    type Item = PagemapResult<ResolvedPage>;

    fn next(&mut self) -> Option<Self::Item> {
        if let State::Done = self.state {
            return None;
        }

        match self.step() {
            Ok(Some(page)) => Some(Ok(page)),
            Ok(None) => {
                self.state = State::Done;
                None
            }
            Err(e) => {
                log::debug!("translation stopped: {}", e);
                self.state = State::Done;
                Some(Err(e))
            }
        }
    }
}

impl<L, T> FusedIterator for TranslationEngine<L, T>
where
    L: Iterator<Item = io::Result<String>>,
    T: Read + Seek,
{
}
