// Page geometry. Every page is a 3-field header of 8-byte integers
// followed by the content region.
pub const PAGE_SIZE: usize = 2048;
pub const PAGE_HEADER_SIZE: usize = 3 * UINT_SIZE;
pub const CONTENT_SIZE: usize = PAGE_SIZE - PAGE_HEADER_SIZE;

// 64 bit on-disk integers, big-endian
pub const UINT_SIZE: usize = 8;

// Disk-wide capacity ceiling: 10 MiB of 2048-byte pages
pub const MAX_STORAGE_SIZE: u64 = 10 * 1024 * 1024;

// Page header field offsets
pub const HDR_IS_USED: usize = 0;
pub const HDR_CATEGORY: usize = 8;
pub const HDR_GLOBAL_ADDR: usize = 16;

// Page categories
pub const PAGE_CATEGORY_FIELD_NAMES: u64 = 1;
pub const PAGE_CATEGORY_TYPES: u64 = 2;
pub const PAGE_CATEGORY_DATA: u64 = 3;

// Catalog cell layout.
// Types file cell: [use_mark u64][name 32B NUL-padded][field_count u64][fields_page u64]
pub const TYPE_NAME_SIZE: usize = 32;
pub const TYPE_CELL_SIZE: usize = UINT_SIZE + TYPE_NAME_SIZE + 2 * UINT_SIZE;
pub const FIELD_NAME_SIZE: usize = 32;

// System catalog file names
pub const GENERAL_CATALOG_FILE: &str = "syscatalgen";
pub const TYPES_CATALOG_FILE: &str = "syscatalt";
pub const FIELDS_CATALOG_FILE: &str = "syscatalf";
pub const LOCK_FILE: &str = ".lock";

// 1-based position of a page within its file; 0 means the page only
// exists in memory. Global addresses are disk-wide and never reused.
pub type PageAddr = u64;

// Record field values are signed; field 0 is the primary key.
pub type FieldValue = i64;

/// Global and local address of one physical page, as returned by the
/// record operations. `(0, 0)` is never a valid pair for a persisted page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PagePos {
    pub global: PageAddr,
    pub local: PageAddr,
}
