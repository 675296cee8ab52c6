//! Paged RAM: 4 KiB pages with per-page access rights, allocated lazily on
//! first write. Range operations walk page by page and report the base
//! address of the first violating page; a faulting operation changes nothing.

use crate::config::{PAGE_SIZE, RESERVED_PAGES};
use crate::types::PageAccess;
use std::collections::{HashMap, HashSet};

/// One entry of the serialized page map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageMapEntry {
    /// Base address of the page.
    pub address: u32,
    pub length: u32,
    pub access: PageAccess,
}

/// Sparse paged memory. Pages without backing storage read as zero when
/// their access rights allow reads at all; reads never allocate.
#[derive(Default)]
pub struct PagedRam {
    pages: HashMap<u32, Vec<u8>>,
    access: HashMap<u32, PageAccess>,
    /// Pages excluded from the serialized page map (argument-region padding).
    padding: HashSet<u32>,
    heap_pointer: u32,
}

impl PagedRam {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn page_index(address: u32) -> u32 {
        address / PAGE_SIZE
    }

    #[must_use]
    pub fn page_access(&self, page_index: u32) -> PageAccess {
        self.access.get(&page_index).copied().unwrap_or_default()
    }

    /// Check every page covered by `[address, address + size)` with `ok`;
    /// returns the base address of the first failing page.
    fn check_range(&self, address: u32, size: u32, ok: impl Fn(PageAccess) -> bool) -> Result<(), u32> {
        if size == 0 {
            return Ok(());
        }
        let end = u64::from(address) + u64::from(size); // exclusive
        let last_page = (((end - 1) / u64::from(PAGE_SIZE)) as u32).min(u32::MAX / PAGE_SIZE);
        for page in Self::page_index(address)..=last_page {
            if !ok(self.page_access(page)) {
                return Err(page * PAGE_SIZE);
            }
        }
        // A range running past the top of the address space wraps onto the
        // reserved bottom pages, which are never accessible.
        if end > 1 << 32 {
            return Err(0);
        }
        Ok(())
    }

    /// Err carries the first address whose page lacks read access.
    pub fn check_readable(&self, address: u32, size: u32) -> Result<(), u32> {
        self.check_range(address, size, PageAccess::allows_read)
    }

    /// Err carries the first address whose page lacks write access.
    pub fn check_writable(&self, address: u32, size: u32) -> Result<(), u32> {
        self.check_range(address, size, PageAccess::allows_write)
    }

    /// Read `count` bytes starting at `address`.
    pub fn read_octets(&self, address: u32, count: u32) -> Result<Vec<u8>, u32> {
        self.check_readable(address, count)?;
        let mut out = vec![0u8; count as usize];
        let mut filled = 0usize;
        let mut cursor = address;
        while filled < count as usize {
            let page = Self::page_index(cursor);
            let offset = (cursor % PAGE_SIZE) as usize;
            let in_page = (count as usize - filled).min(PAGE_SIZE as usize - offset);
            if let Some(bytes) = self.pages.get(&page) {
                out[filled..filled + in_page].copy_from_slice(&bytes[offset..offset + in_page]);
            }
            filled += in_page;
            cursor = cursor.wrapping_add(in_page as u32);
        }
        Ok(out)
    }

    /// Write `values` starting at `address`, allocating pages lazily.
    pub fn write_octets(&mut self, address: u32, values: &[u8]) -> Result<(), u32> {
        self.check_writable(address, values.len() as u32)?;
        self.copy_in(address, values);
        Ok(())
    }

    /// Write without an access check. Only for memory-image construction;
    /// execution goes through [`PagedRam::write_octets`].
    pub fn write_unchecked(&mut self, address: u32, values: &[u8]) {
        self.copy_in(address, values);
    }

    fn copy_in(&mut self, address: u32, values: &[u8]) {
        let mut written = 0usize;
        let mut cursor = address;
        while written < values.len() {
            let page = Self::page_index(cursor);
            let offset = (cursor % PAGE_SIZE) as usize;
            let in_page = (values.len() - written).min(PAGE_SIZE as usize - offset);
            let bytes = self
                .pages
                .entry(page)
                .or_insert_with(|| vec![0u8; PAGE_SIZE as usize]);
            bytes[offset..offset + in_page].copy_from_slice(&values[written..written + in_page]);
            written += in_page;
            cursor = cursor.wrapping_add(in_page as u32);
        }
    }

    /// Set the access rights of every page covered by the page-aligned range
    /// `[address, address + length)`. Padding pages keep their rights but are
    /// excluded from the serialized page map. The reserved pages at the
    /// bottom of the address space are never granted access.
    pub fn set_page_access_rights(
        &mut self,
        address: u32,
        length: u32,
        access: PageAccess,
        is_padding: bool,
    ) {
        debug_assert_eq!(address % PAGE_SIZE, 0, "address must be page-aligned");
        debug_assert_eq!(length % PAGE_SIZE, 0, "length must be page-aligned");
        if length == 0 {
            return;
        }
        let start = Self::page_index(address);
        let end = Self::page_index(address + (length - 1));
        for page in start..=end {
            if page < RESERVED_PAGES {
                continue;
            }
            self.access.insert(page, access);
            if is_padding {
                self.padding.insert(page);
            } else {
                self.padding.remove(&page);
            }
        }
    }

    /// Drop the backing storage of `count` pages from `start_page` so the
    /// range reads as zero again. Access rights are untouched.
    pub fn zero_pages(&mut self, start_page: u32, count: u32) {
        for page in start_page..start_page.saturating_add(count) {
            self.pages.remove(&page);
        }
    }

    /// Allocate and make writable `count` pages from `start_page` (SBRK).
    pub fn allocate_pages(&mut self, start_page: u32, count: u32) {
        for page in start_page..start_page + count {
            if page < RESERVED_PAGES {
                continue;
            }
            self.pages
                .entry(page)
                .or_insert_with(|| vec![0u8; PAGE_SIZE as usize]);
            self.access.insert(page, PageAccess::Write);
        }
        let end = (start_page + count) * PAGE_SIZE;
        if end > self.heap_pointer {
            self.heap_pointer = end;
        }
    }

    #[must_use]
    pub fn heap_pointer(&self) -> u32 {
        self.heap_pointer
    }

    pub fn set_heap_pointer(&mut self, value: u32) {
        self.heap_pointer = value;
    }

    /// Accessible pages in address order, excluding padding pages.
    #[must_use]
    pub fn page_map(&self) -> Vec<PageMapEntry> {
        let mut entries: Vec<PageMapEntry> = self
            .access
            .iter()
            .filter(|(page, access)| {
                **access != PageAccess::None && !self.padding.contains(page)
            })
            .map(|(page, access)| PageMapEntry {
                address: page * PAGE_SIZE,
                length: PAGE_SIZE,
                access: *access,
            })
            .collect();
        entries.sort_by_key(|e| e.address);
        entries
    }

    /// [`PagedRam::page_map`] plus each page's contents (zero-filled when the
    /// page was never written).
    #[must_use]
    pub fn page_map_with_contents(&self) -> Vec<(PageMapEntry, Vec<u8>)> {
        self.page_map()
            .into_iter()
            .map(|entry| {
                let contents = self.page_dump(entry.address / PAGE_SIZE);
                (entry, contents)
            })
            .collect()
    }

    /// Contents of one page (zero-filled when never written).
    #[must_use]
    pub fn page_dump(&self, page_index: u32) -> Vec<u8> {
        self.pages
            .get(&page_index)
            .cloned()
            .unwrap_or_else(|| vec![0u8; PAGE_SIZE as usize])
    }
}
