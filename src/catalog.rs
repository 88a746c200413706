use std::fs;

use anyhow::Result;

use crate::config::{
    PageAddr, CONTENT_SIZE, FIELDS_CATALOG_FILE, FIELD_NAME_SIZE, GENERAL_CATALOG_FILE, LOCK_FILE,
    PAGE_CATEGORY_FIELD_NAMES, PAGE_CATEGORY_TYPES, TYPES_CATALOG_FILE, TYPE_CELL_SIZE,
    TYPE_NAME_SIZE, UINT_SIZE,
};
use crate::disk::Disk;
use crate::error::StorageError;
use crate::page::Page;

/// A catalog entry: a type and its field names, primary key first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDesc {
    pub name: String,
    pub field_names: Vec<String>,
}

// 56-byte cell of the types catalog.
struct TypeCell {
    use_mark: u64,
    name: String,
    field_count: u64,
    fields_page: PageAddr,
}

impl TypeCell {
    fn decode(cell: &[u8]) -> TypeCell {
        TypeCell {
            use_mark: uint(cell, 0),
            name: decode_name(&cell[UINT_SIZE..UINT_SIZE + TYPE_NAME_SIZE]),
            field_count: uint(cell, UINT_SIZE + TYPE_NAME_SIZE),
            fields_page: uint(cell, 2 * UINT_SIZE + TYPE_NAME_SIZE),
        }
    }
}

/// Register a new type: its field names on a dedicated page of the fields
/// catalog, a 56-byte cell in the types catalog, and a fresh record file
/// (one empty page) named after the type. The first field is the primary
/// key. Already-persisted pages are not rolled back if a later step fails.
pub fn create_type(disk: &mut Disk, name: &str, field_names: &[String]) -> Result<()> {
    if field_names.is_empty() {
        return Err(constraint("a type needs at least one field, the primary key"));
    }
    check_name(name, TYPE_NAME_SIZE, "type")?;
    check_file_name(name)?;
    for field in field_names {
        check_name(field, FIELD_NAME_SIZE, "field")?;
    }

    // field names go in first, one 32-byte slot each on the first unused
    // page of the fields catalog
    let mut fields_page = Page::load(disk, FIELDS_CATALOG_FILE, 1)?;
    while fields_page.is_used() {
        fields_page = fields_page.consecutive_or_append(disk)?;
    }
    fields_page.reset();
    for (i, field) in field_names.iter().enumerate() {
        fields_page.write_content(field.as_bytes(), i * FIELD_NAME_SIZE)?;
    }
    fields_page.set_is_used(true);
    fields_page.set_category(PAGE_CATEGORY_FIELD_NAMES);
    fields_page.persist(disk)?;
    let fields_page_addr = fields_page.local_address();

    // then the type cell, in the first free slot of the types chain
    let mut type_page = Page::load(disk, TYPES_CATALOG_FILE, 1)?;
    let cell = loop {
        match type_page.first_empty_cell_index(TYPE_CELL_SIZE) {
            Some(i) => break i,
            None => type_page = type_page.consecutive_or_append(disk)?,
        }
    };
    let start = cell * TYPE_CELL_SIZE;
    type_page.reset_range(start, TYPE_CELL_SIZE)?;
    type_page.write_content(&1u64.to_be_bytes(), start)?;
    type_page.write_content(name.as_bytes(), start + UINT_SIZE)?;
    type_page.write_content(
        &(field_names.len() as u64).to_be_bytes(),
        start + UINT_SIZE + TYPE_NAME_SIZE,
    )?;
    type_page.write_content(
        &fields_page_addr.to_be_bytes(),
        start + 2 * UINT_SIZE + TYPE_NAME_SIZE,
    )?;
    type_page.set_is_used(true);
    type_page.set_category(PAGE_CATEGORY_TYPES);
    type_page.persist(disk)?;

    // a record file for the type, truncating any leftover one
    let _ = fs::remove_file(disk.path(name));
    disk.append_page(name)
}

/// All registered types, or just the one named by `filter` (the scan stops
/// at the first match). An unformatted directory yields an empty list.
pub fn list_types(disk: &Disk, filter: Option<&str>) -> Result<Vec<TypeDesc>> {
    let mut types = Vec::new();

    let mut page = match Page::load(disk, TYPES_CATALOG_FILE, 1) {
        Ok(p) => Some(p),
        Err(err) => {
            log::debug!("types catalog not readable: {err}");
            return Ok(types);
        }
    };
    while let Some(p) = page {
        if p.is_used() {
            for i in 0..CONTENT_SIZE / TYPE_CELL_SIZE {
                let cell =
                    TypeCell::decode(&p.content()[i * TYPE_CELL_SIZE..(i + 1) * TYPE_CELL_SIZE]);
                if cell.use_mark != 1 {
                    continue;
                }
                if filter.is_some_and(|f| f != cell.name) {
                    continue;
                }
                let field_names = read_field_names(disk, cell.fields_page, cell.field_count)?;
                types.push(TypeDesc {
                    name: cell.name,
                    field_names,
                });
                if filter.is_some() {
                    return Ok(types);
                }
            }
        }
        page = p.consecutive(disk)?;
    }
    Ok(types)
}

/// Remove a type: its record file is deleted, its fields page is marked
/// unused, and its catalog cell becomes a tombstone.
pub fn delete_type(disk: &mut Disk, name: &str) -> Result<()> {
    let _ = fs::remove_file(disk.path(name));

    let Ok(first) = Page::load(disk, TYPES_CATALOG_FILE, 1) else {
        return Err(StorageError::NotFound(name.to_string()).into());
    };
    let mut page = Some(first);
    while let Some(mut p) = page {
        if p.is_used() {
            for i in 0..CONTENT_SIZE / TYPE_CELL_SIZE {
                let start = i * TYPE_CELL_SIZE;
                let cell = TypeCell::decode(&p.content()[start..start + TYPE_CELL_SIZE]);
                if cell.use_mark != 1 || cell.name != name {
                    continue;
                }
                let Ok(mut fields_page) = Page::load(disk, FIELDS_CATALOG_FILE, cell.fields_page)
                else {
                    return Err(StorageError::NotFound(name.to_string()).into());
                };
                fields_page.set_is_used(false);
                p.write_content(&0u64.to_be_bytes(), start)?;
                fields_page.persist(disk)?;
                p.persist(disk)?;
                return Ok(());
            }
        }
        page = p.consecutive(disk)?;
    }
    Err(StorageError::NotFound(name.to_string()).into())
}

/// Recreate the three system catalog files, each with a single fresh page.
pub fn format(disk: &mut Disk) -> Result<()> {
    const SYSTEM_FILES: [&str; 3] = [
        GENERAL_CATALOG_FILE,
        TYPES_CATALOG_FILE,
        FIELDS_CATALOG_FILE,
    ];
    for file in SYSTEM_FILES {
        let _ = fs::remove_file(disk.path(file));
    }
    for file in SYSTEM_FILES {
        disk.append_page(file)?;
    }
    Ok(())
}

/// The global-address counter persisted in the general catalog page.
pub fn load_page_counter(disk: &Disk) -> Result<PageAddr> {
    let page = Page::load(disk, GENERAL_CATALOG_FILE, 1)?;
    Ok(page.read_uint_at(0))
}

/// Save the session's counter into the general catalog page. Called on
/// clean shutdown; skipping it makes the next session reuse addresses.
pub fn flush_page_counter(disk: &Disk) -> Result<()> {
    let mut page = Page::load(disk, GENERAL_CATALOG_FILE, 1)?;
    page.write_content(&disk.next_page_addr().to_be_bytes(), 0)?;
    page.persist(disk)
}

fn read_field_names(disk: &Disk, addr: PageAddr, count: u64) -> Result<Vec<String>> {
    let page = Page::load(disk, FIELDS_CATALOG_FILE, addr)?;
    let count = (count as usize).min(CONTENT_SIZE / FIELD_NAME_SIZE);
    Ok((0..count)
        .map(|i| decode_name(&page.content()[i * FIELD_NAME_SIZE..(i + 1) * FIELD_NAME_SIZE]))
        .collect())
}

fn check_name(name: &str, max: usize, what: &str) -> Result<()> {
    if name.is_empty() || name.len() > max {
        return Err(constraint(format!(
            "{what} name must be 1..={max} bytes, got `{name}`"
        )));
    }
    Ok(())
}

// a type name doubles as a file name in the store directory
fn check_file_name(name: &str) -> Result<()> {
    if name.contains('/')
        || name.contains('\\')
        || [
            GENERAL_CATALOG_FILE,
            TYPES_CATALOG_FILE,
            FIELDS_CATALOG_FILE,
            LOCK_FILE,
        ]
        .contains(&name)
    {
        return Err(constraint(format!("`{name}` is not a valid type name")));
    }
    Ok(())
}

fn constraint(msg: impl Into<String>) -> anyhow::Error {
    StorageError::ConstraintViolation(msg.into()).into()
}

fn decode_name(slot: &[u8]) -> String {
    let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
    String::from_utf8_lossy(&slot[..end]).into_owned()
}

fn uint(cell: &[u8], pos: usize) -> u64 {
    // unwrap is safe for a fixed-width slice
    u64::from_be_bytes(cell[pos..pos + UINT_SIZE].try_into().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_name_stops_at_first_nul() {
        let mut slot = [0u8; 32];
        slot[..5].copy_from_slice(b"hello");
        assert_eq!(decode_name(&slot), "hello");
        assert_eq!(decode_name(&[0u8; 32]), "");
        // a full slot has no terminator
        assert_eq!(decode_name(&[b'x'; 32]), "x".repeat(32));
    }

    #[test]
    fn type_cell_decodes_its_fixed_layout() {
        let mut cell = [0u8; TYPE_CELL_SIZE];
        cell[..8].copy_from_slice(&1u64.to_be_bytes());
        cell[8..14].copy_from_slice(b"Person");
        cell[40..48].copy_from_slice(&2u64.to_be_bytes());
        cell[48..56].copy_from_slice(&7u64.to_be_bytes());

        let decoded = TypeCell::decode(&cell);
        assert_eq!(decoded.use_mark, 1);
        assert_eq!(decoded.name, "Person");
        assert_eq!(decoded.field_count, 2);
        assert_eq!(decoded.fields_page, 7);
    }
}
