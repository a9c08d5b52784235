use crate::{PageGeometry, VirtualRange};

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};
use std::mem::size_of;

/// Size in bytes of one `/proc/<pid>/pagemap` record.
pub const RECORD_SIZE: u64 = size_of::<u64>() as u64;

/// Where a region's records live in the pagemap, and how many of them there are.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct TranslationRequest {
    pub range: VirtualRange,
    /// Byte offset of the record for the first page of `range`
    pub table_offset: u64,
    /// Number of whole pages in `range`; always at least 1
    pub page_count: u64,
}

impl TranslationRequest {
    /// Plans the pagemap reads for `range`.
    ///
    /// Returns `None` when the range does not cover a whole page (guard pages, empty or reversed
    /// ranges).  That is not an error: there is simply nothing to translate, and the caller should
    /// move on to the next range.
    pub fn compute(range: VirtualRange, geometry: PageGeometry) -> Option<TranslationRequest> {
        if range.is_degenerate(geometry) {
            return None;
        }

        let page_count = range.len() >> geometry.page_shift();
        if page_count == 0 {
            return None;
        }

        // page_shift >= 3, so this cannot overflow
        let table_offset = geometry.page_index(range.start) * RECORD_SIZE;

        Some(TranslationRequest {
            range,
            table_offset,
            page_count,
        })
    }

    /// Byte offset of the record for the `page_index`-th page of the range.
    pub fn record_offset(&self, page_index: u64) -> u64 {
        self.table_offset + page_index * RECORD_SIZE
    }

    /// One past the last byte of the range's records.
    pub fn table_end(&self) -> u64 {
        self.record_offset(self.page_count)
    }
}
