use std::fs::{self, File, OpenOptions};
use std::io;
use std::io::Write;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

use anyhow::Result;

use crate::config::{PageAddr, HDR_GLOBAL_ADDR, PAGE_SIZE, UINT_SIZE};
use crate::error::StorageError;

/// Physical store: page-granular I/O against the flat files of one store
/// directory.
///
/// Also owns the session state the whole disk shares: the next global page
/// address and the sticky disk-full flag. The counter is persisted in the
/// general catalog by the catalog manager, not here.
pub struct Disk {
    dir: PathBuf,
    next_page_addr: PageAddr,
    max_page_count: u64,
    full: bool,
}

impl Disk {
    pub fn new(dir: impl Into<PathBuf>, max_page_count: u64) -> Disk {
        Disk {
            dir: dir.into(),
            next_page_addr: 1,
            max_page_count,
            full: false,
        }
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Read exactly one page at its 1-based local address.
    pub fn read_page(&self, file: &str, local_addr: PageAddr) -> Result<[u8; PAGE_SIZE]> {
        if local_addr == 0 {
            return Err(read_err(file, local_addr, bad_addr(local_addr)).into());
        }
        let f = File::open(self.path(file)).map_err(|e| read_err(file, local_addr, e))?;
        let mut data = [0u8; PAGE_SIZE];
        f.read_exact_at(&mut data, (local_addr - 1) * PAGE_SIZE as u64)
            .map_err(|e| read_err(file, local_addr, e))?;
        log::debug!(
            "reading page #{}:{} (file: {})",
            stamped_addr(&data),
            local_addr,
            file
        );
        Ok(data)
    }

    /// Overwrite one page in place. The file must already exist.
    pub fn write_page(&self, file: &str, local_addr: PageAddr, data: &[u8; PAGE_SIZE]) -> Result<()> {
        if local_addr == 0 {
            return Err(write_err(file, local_addr, bad_addr(local_addr)).into());
        }
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.path(file))
            .map_err(|e| write_err(file, local_addr, e))?;
        f.write_all_at(data, (local_addr - 1) * PAGE_SIZE as u64)
            .map_err(|e| write_err(file, local_addr, e))?;
        log::debug!(
            "writing page #{}:{} (file: {})",
            stamped_addr(data),
            local_addr,
            file
        );
        Ok(())
    }

    /// Append one zeroed page to the end of the file, stamping its header
    /// with the next global address. Fails with `DiskFull` once the
    /// disk-wide page ceiling is reached; the full flag stays set.
    pub fn append_page(&mut self, file: &str) -> Result<()> {
        if self.next_page_addr >= self.max_page_count {
            self.full = true;
            return Err(StorageError::DiskFull.into());
        }

        // the address is consumed even if the write below fails
        let addr = self.next_page_addr;
        self.next_page_addr += 1;

        let mut data = [0u8; PAGE_SIZE];
        data[HDR_GLOBAL_ADDR..HDR_GLOBAL_ADDR + UINT_SIZE].copy_from_slice(&addr.to_be_bytes());

        let local_addr = self.page_count(file) + 1;
        let mut f = OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.path(file))
            .map_err(|e| write_err(file, local_addr, e))?;
        f.write_all(&data).map_err(|e| write_err(file, local_addr, e))?;
        log::debug!("appending page #{addr}:{local_addr} (file: {file})");
        Ok(())
    }

    /// Number of whole pages in the file; 0 if the file does not exist.
    pub fn page_count(&self, file: &str) -> u64 {
        fs::metadata(self.path(file))
            .map(|m| m.len() / PAGE_SIZE as u64)
            .unwrap_or(0)
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn next_page_addr(&self) -> PageAddr {
        self.next_page_addr
    }

    /// Restore the counter from a persisted value. Used verbatim: stale
    /// values after a crash cause global-address reuse, see DESIGN.md.
    pub fn set_next_page_addr(&mut self, addr: PageAddr) {
        self.next_page_addr = addr;
    }
}

fn stamped_addr(data: &[u8; PAGE_SIZE]) -> PageAddr {
    // unwrap is safe for a fixed-width slice
    PageAddr::from_be_bytes(
        data[HDR_GLOBAL_ADDR..HDR_GLOBAL_ADDR + UINT_SIZE]
            .try_into()
            .unwrap(),
    )
}

fn bad_addr(local_addr: PageAddr) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("local address {local_addr} is out of range"),
    )
}

fn read_err(file: &str, local_addr: PageAddr, source: io::Error) -> StorageError {
    StorageError::ReadFailure {
        file: file.to_string(),
        local_addr,
        source,
    }
}

fn write_err(file: &str, local_addr: PageAddr, source: io::Error) -> StorageError {
    StorageError::WriteFailure {
        file: file.to_string(),
        local_addr,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_STORAGE_SIZE;

    fn disk(max_page_count: u64) -> (tempfile::TempDir, Disk) {
        let dir = tempfile::tempdir().unwrap();
        let disk = Disk::new(dir.path(), max_page_count);
        (dir, disk)
    }

    #[test]
    fn append_stamps_increasing_global_addrs() {
        let (_dir, mut disk) = disk(MAX_STORAGE_SIZE / PAGE_SIZE as u64);
        for expected in 1..=3u64 {
            disk.append_page("data").unwrap();
            let page = disk.read_page("data", expected).unwrap();
            assert_eq!(stamped_addr(&page), expected);
        }
        assert_eq!(disk.page_count("data"), 3);
        assert_eq!(disk.next_page_addr(), 4);
    }

    #[test]
    fn write_read_round_trip() {
        let (_dir, mut disk) = disk(16);
        disk.append_page("data").unwrap();
        disk.append_page("data").unwrap();

        let mut page = [0xabu8; PAGE_SIZE];
        page[0] = 7;
        disk.write_page("data", 2, &page).unwrap();
        assert_eq!(disk.read_page("data", 2).unwrap(), page);
        // page 1 untouched
        assert_eq!(stamped_addr(&disk.read_page("data", 1).unwrap()), 1);
    }

    #[test]
    fn read_fails_past_end_and_at_addr_zero() {
        let (_dir, mut disk) = disk(16);
        disk.append_page("data").unwrap();
        assert!(disk.read_page("data", 2).is_err());
        assert!(disk.read_page("data", 0).is_err());
        assert!(disk.read_page("nofile", 1).is_err());
    }

    #[test]
    fn page_count_is_zero_for_missing_file() {
        let (_dir, disk) = disk(16);
        assert_eq!(disk.page_count("nofile"), 0);
    }

    #[test]
    fn append_fails_with_disk_full_at_ceiling() {
        let (_dir, mut disk) = disk(3);
        disk.append_page("data").unwrap();
        disk.append_page("data").unwrap();
        assert!(!disk.is_full());

        let err = disk.append_page("data").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StorageError>(),
            Some(StorageError::DiskFull)
        ));
        assert!(disk.is_full());
        // the flag is sticky and the counter stops moving
        assert!(disk.append_page("data").is_err());
        assert_eq!(disk.next_page_addr(), 3);
        assert_eq!(disk.page_count("data"), 2);
    }
}
