use std::fs::File;
use std::path::Path;

use anyhow::Result;
use fs2::FileExt;

use crate::catalog::{self, TypeDesc};
use crate::config::{FieldValue, PagePos, LOCK_FILE, MAX_STORAGE_SIZE, PAGE_SIZE};
use crate::disk::Disk;
use crate::record;

#[derive(Copy, Clone, Debug)]
pub struct StoreConfig {
    /// Disk-wide storage ceiling in bytes; the page-count limit is derived
    /// from it.
    pub max_storage_size: u64,
}

impl Default for StoreConfig {
    fn default() -> StoreConfig {
        StoreConfig {
            max_storage_size: MAX_STORAGE_SIZE,
        }
    }
}

/// One session against a store directory.
///
/// Opening restores the global-address counter from the general catalog
/// and takes an exclusive lock on the directory; nothing else shares the
/// files while a `Store` is alive. The counter is only written back by
/// `close` — there is no implicit flush, so a session that is dropped
/// without closing leaves the on-disk counter stale.
pub struct Store {
    disk: Disk,
    _lock: File,
}

impl Store {
    pub fn open(dir: impl AsRef<Path>) -> Result<Store> {
        Self::open_with_config(dir, StoreConfig::default())
    }

    pub fn open_with_config(dir: impl AsRef<Path>, conf: StoreConfig) -> Result<Store> {
        let dir = dir.as_ref();
        let lock = File::create(dir.join(LOCK_FILE))?;
        lock.try_lock_exclusive()?;

        let mut disk = Disk::new(dir, conf.max_storage_size / PAGE_SIZE as u64);
        match catalog::load_page_counter(&disk) {
            Ok(addr) => disk.set_next_page_addr(addr),
            Err(err) => log::debug!("no general catalog yet, starting fresh: {err}"),
        }
        log::debug!("store opened, next page address {}", disk.next_page_addr());

        Ok(Store { disk, _lock: lock })
    }

    /// Flush the global-address counter into the general catalog and end
    /// the session. Fails on a directory that was never formatted.
    pub fn close(self) -> Result<()> {
        log::debug!("store closing, next page address {}", self.disk.next_page_addr());
        catalog::flush_page_counter(&self.disk)
    }

    /// Recreate the three system catalog files, one fresh page each.
    pub fn format(&mut self) -> Result<()> {
        catalog::format(&mut self.disk)
    }

    pub fn create_type(&mut self, name: &str, field_names: &[String]) -> Result<()> {
        catalog::create_type(&mut self.disk, name, field_names)
    }

    pub fn delete_type(&mut self, name: &str) -> Result<()> {
        catalog::delete_type(&mut self.disk, name)
    }

    pub fn list_types(&self) -> Result<Vec<TypeDesc>> {
        catalog::list_types(&self.disk, None)
    }

    pub fn create_record(&mut self, type_name: &str, values: &[FieldValue]) -> Result<PagePos> {
        record::create_record(&mut self.disk, type_name, values)
    }

    /// The general search/delete entry point: `key: None` matches every
    /// record, `delete` tombstones what matched.
    pub fn search_records(
        &mut self,
        type_name: &str,
        key: Option<FieldValue>,
        delete: bool,
    ) -> Result<(Vec<Vec<FieldValue>>, PagePos)> {
        record::search_records(&mut self.disk, type_name, key, delete)
    }

    /// First record with the given primary key, if any.
    pub fn search_record(
        &mut self,
        type_name: &str,
        key: FieldValue,
    ) -> Result<(Option<Vec<FieldValue>>, PagePos)> {
        let (mut records, pos) = self.search_records(type_name, Some(key), false)?;
        Ok((records.pop(), pos))
    }

    /// Tombstone the first record with the given primary key. Returns
    /// whether one was found and where.
    pub fn delete_record(&mut self, type_name: &str, key: FieldValue) -> Result<(bool, PagePos)> {
        let (records, pos) = self.search_records(type_name, Some(key), true)?;
        Ok((!records.is_empty(), pos))
    }

    /// Every live record of the type.
    pub fn list_records(&mut self, type_name: &str) -> Result<Vec<Vec<FieldValue>>> {
        Ok(self.search_records(type_name, None, false)?.0)
    }

    /// Sticky flag set once an append hits the storage ceiling.
    pub fn is_disk_full(&self) -> bool {
        self.disk.is_full()
    }
}
