use anyhow::Result;

use crate::config::{
    PageAddr, CONTENT_SIZE, HDR_CATEGORY, HDR_GLOBAL_ADDR, HDR_IS_USED, PAGE_HEADER_SIZE,
    PAGE_SIZE, UINT_SIZE,
};
use crate::disk::Disk;
use crate::error::StorageError;

/// In-memory view of one page: a 24-byte header (use flag, category,
/// global address, all u64 big-endian) followed by the content region.
///
/// A page remembers where it was loaded from (file name and 1-based local
/// address; absent for a page that only exists in memory) and whether it
/// was modified since. Nothing is written back implicitly: `persist` must
/// be called before the page is dropped.
pub struct Page {
    data: [u8; PAGE_SIZE],
    file: Option<String>,
    local_addr: PageAddr,
    modified: bool,
}

impl Page {
    /// An all-zero page not attached to any physical page.
    pub fn new() -> Page {
        Page {
            data: [0u8; PAGE_SIZE],
            file: None,
            local_addr: 0,
            modified: true,
        }
    }

    /// Load a physical page. A failed read fails the construction, so
    /// every live `Page` is backed by bytes that were actually read.
    pub fn load(disk: &Disk, file: &str, local_addr: PageAddr) -> Result<Page> {
        let data = disk.read_page(file, local_addr)?;
        Ok(Page {
            data,
            file: Some(file.to_string()),
            local_addr,
            modified: false,
        })
    }

    pub fn is_used(&self) -> bool {
        self.get_uint(HDR_IS_USED) != 0
    }

    pub fn set_is_used(&mut self, used: bool) {
        self.put_uint(HDR_IS_USED, used as u64);
    }

    pub fn category(&self) -> u64 {
        self.get_uint(HDR_CATEGORY)
    }

    pub fn set_category(&mut self, category: u64) {
        self.put_uint(HDR_CATEGORY, category);
    }

    /// Disk-wide unique address, stamped at append time and immutable
    /// afterwards; the only field `reset` preserves.
    pub fn global_address(&self) -> PageAddr {
        self.get_uint(HDR_GLOBAL_ADDR)
    }

    fn set_global_address(&mut self, addr: PageAddr) {
        self.put_uint(HDR_GLOBAL_ADDR, addr);
    }

    /// 1-based position in the file, 0 for an in-memory-only page.
    pub fn local_address(&self) -> PageAddr {
        self.local_addr
    }

    /// The content region (everything after the header).
    pub fn content(&self) -> &[u8] {
        &self.data[PAGE_HEADER_SIZE..]
    }

    /// Copy `bytes` into the content region at `pos`.
    pub fn write_content(&mut self, bytes: &[u8], pos: usize) -> Result<()> {
        if pos + bytes.len() > CONTENT_SIZE {
            return Err(StorageError::ContentOverflow {
                pos,
                len: bytes.len(),
            }
            .into());
        }
        let start = PAGE_HEADER_SIZE + pos;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        self.modified = true;
        Ok(())
    }

    /// The u64 starting at content offset `pos`. Callers keep `pos`
    /// within the content region.
    pub fn read_uint_at(&self, pos: usize) -> u64 {
        self.get_uint(PAGE_HEADER_SIZE + pos)
    }

    /// Write the page back if it was modified. A page constructed in
    /// memory must be persisted with `persist_as` first.
    pub fn persist(&mut self, disk: &Disk) -> Result<()> {
        let file = match self.file.as_deref() {
            Some(f) if self.local_addr != 0 => f,
            _ => return Err(StorageError::InvalidPage.into()),
        };
        if self.modified {
            disk.write_page(file, self.local_addr, &self.data)?;
        }
        Ok(())
    }

    /// Bind the page to `file`/`local_addr` and write it there.
    pub fn persist_as(&mut self, disk: &Disk, file: &str, local_addr: PageAddr) -> Result<()> {
        self.file = Some(file.to_string());
        self.local_addr = local_addr;
        self.persist(disk)
    }

    /// The next page of the chain, or `None` at the end of the file.
    pub fn consecutive(&self, disk: &Disk) -> Result<Option<Page>> {
        let file = self.file.as_deref().ok_or(StorageError::InvalidPage)?;
        if self.local_addr >= disk.page_count(file) {
            return Ok(None);
        }
        Page::load(disk, file, self.local_addr + 1).map(Some)
    }

    /// The next page of the chain, appending a fresh one when the chain
    /// ends here. May fail with `DiskFull`.
    pub fn consecutive_or_append(&self, disk: &mut Disk) -> Result<Page> {
        let file = self.file.as_deref().ok_or(StorageError::InvalidPage)?;
        if self.local_addr >= disk.page_count(file) {
            disk.append_page(file)?;
        }
        Page::load(disk, file, self.local_addr + 1)
    }

    /// Index of the first free cell when the content region is read as an
    /// array of `cell_size`-byte cells, each starting with a u64 use mark.
    ///
    /// A page not marked used is treated as entirely free: it is reset
    /// (clearing leftover content, keeping the global address) and index 0
    /// is returned. Returns `None` when every cell is occupied.
    pub fn first_empty_cell_index(&mut self, cell_size: usize) -> Option<usize> {
        if !self.is_used() {
            self.reset();
            return Some(0);
        }
        (0..CONTENT_SIZE / cell_size).find(|&i| self.read_uint_at(i * cell_size) == 0)
    }

    /// Zero the whole page, preserving only the global address.
    pub fn reset(&mut self) {
        let addr = self.global_address();
        self.data = [0u8; PAGE_SIZE];
        self.set_global_address(addr);
    }

    /// Zero `len` content bytes starting at `pos`.
    pub fn reset_range(&mut self, pos: usize, len: usize) -> Result<()> {
        if pos + len > CONTENT_SIZE {
            return Err(StorageError::ContentOverflow { pos, len }.into());
        }
        let start = PAGE_HEADER_SIZE + pos;
        self.data[start..start + len].fill(0);
        self.modified = true;
        Ok(())
    }

    fn get_uint(&self, offs: usize) -> u64 {
        // unwrap is safe for a fixed-width slice
        u64::from_be_bytes(self.data[offs..offs + UINT_SIZE].try_into().unwrap())
    }

    fn put_uint(&mut self, offs: usize, value: u64) {
        self.data[offs..offs + UINT_SIZE].copy_from_slice(&value.to_be_bytes());
        self.modified = true;
    }
}
