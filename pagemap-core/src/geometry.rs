use crate::{PagemapError, PagemapResult, RECORD_SIZE};

#[cfg(feature = "serde1")]
use serde::Serialize;

/// The page size of the running system, and its base-2 logarithm.
///
/// All offset arithmetic in this crate goes through one of these.  It is built once (see
/// `pagemap::Detect` for reading it from the running kernel) and then passed around by value.
#[cfg_attr(feature = "serde1", derive(Serialize))]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct PageGeometry {
    page_size: u64,
    page_shift: u32,
}

impl PageGeometry {
    /// Smallest supported shift: a page must hold at least one pagemap record.
    pub const MIN_PAGE_SHIFT: u32 = RECORD_SIZE.trailing_zeros();
    /// Largest supported shift, so that a 31-bit frame number times the page size fits in a `u64`.
    pub const MAX_PAGE_SHIFT: u32 = 32;

    /// Validates `page_size` and derives the page shift from it.
    ///
    /// Fails with [`PagemapError::Configuration`] if `page_size` is not a power of two, or is
    /// outside `2^MIN_PAGE_SHIFT ..= 2^MAX_PAGE_SHIFT`.
    pub fn new(page_size: u64) -> PagemapResult<PageGeometry> {
        if !page_size.is_power_of_two() {
            return Err(PagemapError::Configuration(format!(
                "page size {} is not a power of two",
                page_size
            )));
        }
        let page_shift = page_size.trailing_zeros();
        if !(Self::MIN_PAGE_SHIFT..=Self::MAX_PAGE_SHIFT).contains(&page_shift) {
            return Err(PagemapError::Configuration(format!(
                "page size {:#x} is outside the supported range {:#x}..={:#x}",
                page_size,
                1u64 << Self::MIN_PAGE_SHIFT,
                1u64 << Self::MAX_PAGE_SHIFT
            )));
        }

        Ok(PageGeometry { page_size, page_shift })
    }

    /// Page size, in bytes.
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// `log2(page_size)`
    pub fn page_shift(&self) -> u32 {
        self.page_shift
    }

    /// The virtual page number containing `addr`.
    pub fn page_index(&self, addr: u64) -> u64 {
        addr >> self.page_shift
    }
}
