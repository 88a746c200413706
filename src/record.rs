use anyhow::Result;

use crate::catalog;
use crate::config::{FieldValue, PagePos, CONTENT_SIZE, PAGE_CATEGORY_DATA, UINT_SIZE};
use crate::disk::Disk;
use crate::error::StorageError;
use crate::page::Page;

/// Store a record in the first free cell of the type's record file,
/// appending pages as needed. The cell size is derived from the number of
/// values supplied; whether it matches the declared field count is not
/// checked, and neither is primary-key uniqueness.
///
/// Returns the global and local address of the page that received the
/// record.
pub fn create_record(disk: &mut Disk, type_name: &str, values: &[FieldValue]) -> Result<PagePos> {
    let record_size = (values.len() + 1) * UINT_SIZE;
    if record_size > CONTENT_SIZE {
        return Err(StorageError::ConstraintViolation(format!(
            "a record of {} values does not fit in one page",
            values.len()
        ))
        .into());
    }

    let mut page = Page::load(disk, type_name, 1)?;
    let cell = loop {
        match page.first_empty_cell_index(record_size) {
            Some(i) => break i,
            None => page = page.consecutive_or_append(disk)?,
        }
    };

    let mut cell_bytes = vec![0u8; record_size];
    cell_bytes[..UINT_SIZE].copy_from_slice(&1u64.to_be_bytes());
    for (i, value) in values.iter().enumerate() {
        let start = (i + 1) * UINT_SIZE;
        cell_bytes[start..start + UINT_SIZE].copy_from_slice(&value.to_be_bytes());
    }
    page.write_content(&cell_bytes, cell * record_size)?;
    page.set_is_used(true);
    page.set_category(PAGE_CATEGORY_DATA);
    page.persist(disk)?;

    Ok(PagePos {
        global: page.global_address(),
        local: page.local_address(),
    })
}

/// Scan the type's record file for matching records.
///
/// A cell matches when its use mark is set and either `key` is `None`
/// (match everything) or its first field equals `key`. With a key the
/// scan stops at the first match. With `delete`, each match is
/// tombstoned and its page persisted on the spot.
///
/// Returns the matched records (field values only) and the address of
/// the last page a match was found on; `(0, 0)` when nothing matched.
/// Zero matches is not a failure.
pub fn search_records(
    disk: &mut Disk,
    type_name: &str,
    key: Option<FieldValue>,
    delete: bool,
) -> Result<(Vec<Vec<FieldValue>>, PagePos)> {
    let first = Page::load(disk, type_name, 1)?;

    let types = catalog::list_types(disk, Some(type_name))?;
    let desc = types
        .into_iter()
        .next()
        .ok_or_else(|| StorageError::NotFound(type_name.to_string()))?;
    let field_count = desc.field_names.len();
    let record_size = (field_count + 1) * UINT_SIZE;

    let mut records = Vec::new();
    let mut pos = PagePos::default();

    let mut page = Some(first);
    while let Some(mut p) = page {
        if p.is_used() {
            for i in 0..CONTENT_SIZE / record_size {
                let start = i * record_size;
                if p.read_uint_at(start) != 1 {
                    continue;
                }
                let values = decode_values(&p, start, field_count);
                if let Some(k) = key {
                    if values.first() != Some(&k) {
                        continue;
                    }
                }
                records.push(values);
                if delete {
                    p.write_content(&0u64.to_be_bytes(), start)?;
                    p.persist(disk)?;
                }
                pos = PagePos {
                    global: p.global_address(),
                    local: p.local_address(),
                };
                if key.is_some() {
                    return Ok((records, pos));
                }
            }
        }
        page = p.consecutive(disk)?;
    }
    Ok((records, pos))
}

fn decode_values(page: &Page, start: usize, field_count: usize) -> Vec<FieldValue> {
    let content = page.content();
    (0..field_count)
        .map(|j| {
            let at = start + (j + 1) * UINT_SIZE;
            // unwrap is safe for a fixed-width slice
            FieldValue::from_be_bytes(content[at..at + UINT_SIZE].try_into().unwrap())
        })
        .collect()
}
