use crate::{classify, Pfn, Stripe};

use bitflags::bitflags;
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::mem::size_of;

const fn genmask(high: usize, low: usize) -> u64 {
    let mask_bits = size_of::<u64>() * 8;
    (!0 - (1 << low) + 1) & (!0 >> (mask_bits - 1 - high))
}

// source: include/linux/swap.h
const MAX_SWAPFILES_SHIFT: usize = 5;

/// Bits of the frame number used when computing a physical address.
///
/// The record carries a 55-bit frame number, but only the low 31 bits take part in
/// [`ResolvedPage::physical_addr`].  Frames at or above `2^31` (8 TiB with 4 KiB pages) alias
/// lower addresses.  The full number is still available from [`PagemapEntry::page_frame_number`].
pub const PFN_ADDRESS_MASK: u64 = genmask(30, 0);

bitflags! {
    /// Layout of a `/proc/<pid>/pagemap` record.
    ///
    /// source: Documentation/admin-guide/mm/pagemap.rst, fs/proc/task_mmu.c
    #[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PagemapFlags: u64 {
        /// Page frame number, if present
        const PFN = genmask(54, 0);
        /// Swap type, if swapped
        const SWAP_TYPE = genmask(MAX_SWAPFILES_SHIFT - 1, 0);
        /// Swap offset, if swapped
        const SWAP_OFFSET = genmask(54, MAX_SWAPFILES_SHIFT);
        /// PTE is soft-dirty (since Linux 3.11)
        const SOFT_DIRTY = 1 << 55;
        /// Page exclusively mapped (since Linux 4.2)
        const MMAP_EXCLUSIVE = 1 << 56;
        /// Page is file-page or shared-anon (since Linux 3.5)
        const FILE = 1 << 61;
        /// Page swapped
        const SWAP = 1 << 62;
        /// Page present
        const PRESENT = 1 << 63;
    }
}

/// One raw 64-bit record from `/proc/<pid>/pagemap`.
///
/// Every `u64` is a valid record; the accessors never fail.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct PagemapEntry(pub u64);

impl PagemapEntry {
    pub fn from_ne_bytes(bytes: [u8; size_of::<u64>()]) -> PagemapEntry {
        PagemapEntry(u64::from_ne_bytes(bytes))
    }

    pub fn flags(&self) -> PagemapFlags {
        PagemapFlags::from_bits_retain(self.0)
    }

    pub fn present(&self) -> bool {
        self.flags().contains(PagemapFlags::PRESENT)
    }

    pub fn swapped(&self) -> bool {
        self.flags().contains(PagemapFlags::SWAP)
    }

    pub fn file_or_shared_anon(&self) -> bool {
        self.flags().contains(PagemapFlags::FILE)
    }

    pub fn exclusive(&self) -> bool {
        self.flags().contains(PagemapFlags::MMAP_EXCLUSIVE)
    }

    pub fn soft_dirty(&self) -> bool {
        self.flags().contains(PagemapFlags::SOFT_DIRTY)
    }

    /// The full 55-bit frame number field.
    ///
    /// Only meaningful for present pages.  Unprivileged readers see 0 here (since Linux 4.2).
    pub fn page_frame_number(&self) -> Pfn {
        Pfn((self.flags() & PagemapFlags::PFN).bits())
    }

    /// Only meaningful for swapped pages.
    pub fn swap_type(&self) -> u64 {
        (self.flags() & PagemapFlags::SWAP_TYPE).bits()
    }

    /// Only meaningful for swapped pages.
    pub fn swap_offset(&self) -> u64 {
        (self.flags() & PagemapFlags::SWAP_OFFSET).bits() >> MAX_SWAPFILES_SHIFT
    }

    /// Physical byte address of the start of the page, from the low 31 bits of the frame number.
    pub fn physical_addr(&self, page_size: u64) -> u64 {
        (self.0 & PFN_ADDRESS_MASK).wrapping_mul(page_size)
    }
}

impl fmt::Display for PagemapEntry {
    /// 16 upper-case hex digits, most significant first
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0.to_be_bytes()))
    }
}

impl fmt::Debug for PagemapEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PagemapEntry({:#018x}, {:?})", self.0, self.flags())
    }
}

impl From<u64> for PagemapEntry {
    fn from(raw: u64) -> Self {
        PagemapEntry(raw)
    }
}

/// The translation of a single virtual page.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct ResolvedPage {
    pub virtual_addr: u64,
    pub present: bool,
    pub swapped: bool,
    pub file_or_shared_anon: bool,
    pub exclusive: bool,
    pub soft_dirty: bool,
    /// See [`PFN_ADDRESS_MASK`]
    pub physical_addr: u64,
    pub raw: PagemapEntry,
    pub stripe: Stripe,
}

impl ResolvedPage {
    /// Decodes the record for the `page_index`-th page of a region starting at `range_start`.
    ///
    /// Defined for every input.  Address arithmetic wraps instead of overflowing.
    pub fn decode(raw: u64, page_index: u64, range_start: u64, page_size: u64) -> ResolvedPage {
        let raw = PagemapEntry(raw);
        let physical_addr = raw.physical_addr(page_size);

        ResolvedPage {
            virtual_addr: range_start.wrapping_add(page_index.wrapping_mul(page_size)),
            present: raw.present(),
            swapped: raw.swapped(),
            file_or_shared_anon: raw.file_or_shared_anon(),
            exclusive: raw.exclusive(),
            soft_dirty: raw.soft_dirty(),
            physical_addr,
            raw,
            stripe: classify(physical_addr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_SIZE: u64 = 0x1000;

    fn flag_tuple(page: &ResolvedPage) -> [bool; 5] {
        [
            page.present,
            page.swapped,
            page.file_or_shared_anon,
            page.exclusive,
            page.soft_dirty,
        ]
    }

    #[test]
    fn test_genmask() {
        let mask = genmask(3, 1);
        assert_eq!(mask, 0b1110);

        let mask = genmask(3, 0);
        assert_eq!(mask, 0b1111);

        let mask = genmask(63, 62);
        assert_eq!(mask, 0b11 << 62);

        assert_eq!(PFN_ADDRESS_MASK, 0x7FFF_FFFF);
        assert_eq!(PagemapFlags::PFN.bits(), (1 << 55) - 1);
    }

    #[test]
    fn test_decode_zero() {
        let page = ResolvedPage::decode(0, 0, 0x1000, PAGE_SIZE);
        assert_eq!(flag_tuple(&page), [false; 5]);
        assert_eq!(page.physical_addr, 0);
        assert_eq!(page.virtual_addr, 0x1000);
        assert_eq!(page.stripe, Stripe(0));
    }

    #[test]
    fn test_decode_all_ones() {
        let page = ResolvedPage::decode(u64::MAX, 0, 0, PAGE_SIZE);
        assert_eq!(flag_tuple(&page), [true; 5]);
        assert_eq!(page.physical_addr, 0x7FFF_FFFF * PAGE_SIZE);
        assert_eq!(page.raw.page_frame_number(), Pfn((1 << 55) - 1));
        assert_eq!(page.stripe, classify(0x7FFF_FFFF * PAGE_SIZE));
    }

    #[test]
    fn test_flag_bits_are_independent() {
        let bits = [63u32, 62, 61, 56, 55];
        for (i, bit) in bits.iter().enumerate() {
            let mut expected = [false; 5];
            expected[i] = true;

            let page = ResolvedPage::decode(1u64 << *bit, 0, 0, PAGE_SIZE);
            assert_eq!(flag_tuple(&page), expected, "bit {}", bit);
            assert_eq!(page.physical_addr, 0, "bit {}", bit);

            // flipping the bit off again, on a record with everything else set
            let page = ResolvedPage::decode(u64::MAX ^ (1u64 << *bit), 0, 0, PAGE_SIZE);
            let expected: Vec<bool> = expected.iter().map(|b| !b).collect();
            assert_eq!(flag_tuple(&page).to_vec(), expected, "bit {}", bit);
        }
    }

    #[test]
    fn test_reserved_bits_are_ignored() {
        let page = ResolvedPage::decode(genmask(60, 57), 0, 0, PAGE_SIZE);
        assert_eq!(flag_tuple(&page), [false; 5]);
        assert_eq!(page.physical_addr, 0);
    }

    #[test]
    fn test_physical_addr_uses_31_bits() {
        let raw = (1 << 63) | 0x1234;
        let page = ResolvedPage::decode(raw, 0, 0, PAGE_SIZE);
        assert_eq!(page.physical_addr, 0x1234000);

        // bit 31 of the frame number does not reach the address
        let raw = (1 << 63) | (1 << 31) | 0x1234;
        let page = ResolvedPage::decode(raw, 0, 0, PAGE_SIZE);
        assert_eq!(page.physical_addr, 0x1234000);
        assert_eq!(page.raw.page_frame_number(), Pfn((1 << 31) | 0x1234));
    }

    #[test]
    fn test_virtual_addr() {
        let page = ResolvedPage::decode(0, 3, 0x7f00_0000_0000, PAGE_SIZE);
        assert_eq!(page.virtual_addr, 0x7f00_0000_3000);

        let page = ResolvedPage::decode(0, 1, 0x40_0000, 0x20_0000);
        assert_eq!(page.virtual_addr, 0x60_0000);
    }

    #[test]
    fn test_memory_page() {
        let pagemap_entry: u64 = 0b1000000110000000000000000000000000000000000000000000000000000011;
        let entry = PagemapEntry(pagemap_entry);
        assert!(entry
            .flags()
            .contains(PagemapFlags::PRESENT | PagemapFlags::MMAP_EXCLUSIVE | PagemapFlags::SOFT_DIRTY));
        assert!(!entry.swapped());
        assert_eq!(entry.page_frame_number(), Pfn(0b11));
    }

    #[test]
    fn test_swap_page() {
        let pagemap_entry: u64 = 0b1100000110000000000000000000000000000000000000000000000001100010;
        let entry = PagemapEntry(pagemap_entry);
        assert!(entry.swapped());
        assert!(entry
            .flags()
            .contains(PagemapFlags::PRESENT | PagemapFlags::MMAP_EXCLUSIVE | PagemapFlags::SOFT_DIRTY));
        assert_eq!(entry.swap_type(), 0b10);
        assert_eq!(entry.swap_offset(), 0b11);
    }

    #[test]
    fn test_display() {
        assert_eq!(PagemapEntry(0).to_string(), "0000000000000000");
        assert_eq!(PagemapEntry(0x8100_0000_0012_abcd).to_string(), "810000000012ABCD");
        assert_eq!(PagemapEntry(u64::MAX).to_string(), "FFFFFFFFFFFFFFFF");
    }

    #[cfg(feature = "serde1")]
    #[test]
    fn test_serde() {
        let page = ResolvedPage::decode((1 << 63) | 0x42, 2, 0x1000, PAGE_SIZE);
        let json = serde_json::to_string(&page).unwrap();
        let back: ResolvedPage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, page);
    }
}
