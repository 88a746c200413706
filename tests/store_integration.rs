use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use recstore::{StorageError, Store, StoreConfig};

const RAND_SEED: u64 = 1804;
const PAGE_SIZE: u64 = 2048;

fn open_store(dir: &TempDir) -> Store {
    Store::open(dir.path()).unwrap()
}

fn formatted_store() -> (TempDir, Store) {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    store.format().unwrap();
    (dir, store)
}

fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn page_count(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len() / PAGE_SIZE).unwrap_or(0)
}

#[test]
fn format_initializes_empty_catalogs() {
    let (dir, store) = formatted_store();
    assert!(store.list_types().unwrap().is_empty());
    for file in ["syscatalgen", "syscatalt", "syscatalf"] {
        assert_eq!(page_count(&dir.path().join(file)), 1, "{file}");
    }
}

#[test]
fn create_type_registers_and_creates_record_file() {
    let (dir, mut store) = formatted_store();
    store.create_type("Person", &fields(&["id", "name"])).unwrap();

    let types = store.list_types().unwrap();
    assert_eq!(types.len(), 1);
    assert_eq!(types[0].name, "Person");
    assert_eq!(types[0].field_names, fields(&["id", "name"]));

    assert_eq!(page_count(&dir.path().join("Person")), 1);
}

#[test]
fn create_type_without_fields_fails_and_writes_nothing() {
    let (dir, mut store) = formatted_store();
    let err = store.create_type("Person", &[]).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StorageError>(),
        Some(StorageError::ConstraintViolation(_))
    ));

    assert!(store.list_types().unwrap().is_empty());
    assert_eq!(page_count(&dir.path().join("syscatalt")), 1);
    assert_eq!(page_count(&dir.path().join("syscatalf")), 1);
    assert!(!dir.path().join("Person").exists());
}

#[test]
fn over_long_names_are_rejected() {
    let (_dir, mut store) = formatted_store();
    let long = "x".repeat(33);
    assert!(store.create_type(&long, &fields(&["id"])).is_err());
    assert!(store.create_type("Person", &fields(&[&long])).is_err());
    assert!(store.list_types().unwrap().is_empty());
}

#[test]
fn create_and_search_record() {
    let (_dir, mut store) = formatted_store();
    store.create_type("Person", &fields(&["id", "age"])).unwrap();

    let pos = store.create_record("Person", &[1, 42]).unwrap();
    assert_eq!(pos.local, 1);
    assert_ne!(pos.global, 0);

    let (record, found_at) = store.search_record("Person", 1).unwrap();
    assert_eq!(record.unwrap(), vec![1, 42]);
    assert_eq!(found_at, pos);

    let (missing, missing_at) = store.search_record("Person", 9).unwrap();
    assert!(missing.is_none());
    assert_eq!((missing_at.global, missing_at.local), (0, 0));
}

#[test]
fn negative_values_round_trip() {
    let (_dir, mut store) = formatted_store();
    store.create_type("Account", &fields(&["id", "balance"])).unwrap();
    store.create_record("Account", &[-3, -1_000_000]).unwrap();

    let (record, _) = store.search_record("Account", -3).unwrap();
    assert_eq!(record.unwrap(), vec![-3, -1_000_000]);
}

#[test]
fn deleted_record_cell_is_reused() {
    let (_dir, mut store) = formatted_store();
    store.create_type("Person", &fields(&["id", "age"])).unwrap();

    let first = store.create_record("Person", &[1, 42]).unwrap();
    store.create_record("Person", &[2, 43]).unwrap();

    let (found, deleted_at) = store.delete_record("Person", 1).unwrap();
    assert!(found);
    assert_eq!(deleted_at, first);
    assert!(store.search_record("Person", 1).unwrap().0.is_none());

    // the tombstoned first cell is handed out again
    let reused = store.create_record("Person", &[3, 44]).unwrap();
    assert_eq!(reused, first);
    assert_eq!(
        store.list_records("Person").unwrap(),
        vec![vec![3, 44], vec![2, 43]]
    );
}

#[test]
fn delete_all_records_of_a_type() {
    let (_dir, mut store) = formatted_store();
    store.create_type("Person", &fields(&["id", "age"])).unwrap();
    for key in 0..3 {
        store.create_record("Person", &[key, key * 10]).unwrap();
    }

    let (deleted, _) = store.search_records("Person", None, true).unwrap();
    assert_eq!(deleted.len(), 3);
    assert!(store.list_records("Person").unwrap().is_empty());
}

#[test]
fn delete_type_removes_file_and_catalog_entries() {
    let (dir, mut store) = formatted_store();
    store.create_type("Person", &fields(&["id", "age"])).unwrap();
    store.create_type("Car", &fields(&["id", "wheels"])).unwrap();
    store.create_record("Person", &[1, 30]).unwrap();

    store.delete_type("Person").unwrap();
    assert!(!dir.path().join("Person").exists());

    let types = store.list_types().unwrap();
    assert_eq!(types.len(), 1);
    assert_eq!(types[0].name, "Car");

    let err = store.delete_type("Person").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StorageError>(),
        Some(StorageError::NotFound(_))
    ));

    // the tombstoned catalog cell is handed out to the next type
    store.create_type("Dog", &fields(&["id"])).unwrap();
    let names: Vec<_> = store.list_types().unwrap().into_iter().map(|t| t.name).collect();
    assert_eq!(names, ["Dog", "Car"]);
}

#[test]
fn searching_an_unknown_type_fails() {
    let (_dir, mut store) = formatted_store();
    assert!(store.search_record("Ghost", 1).is_err());
    assert!(store.create_record("Ghost", &[1]).is_err());
}

#[test]
fn listing_a_type_with_no_records_is_empty() {
    let (_dir, mut store) = formatted_store();
    store.create_type("Person", &fields(&["id"])).unwrap();
    assert!(store.list_records("Person").unwrap().is_empty());
}

#[test]
fn page_counter_survives_a_clean_shutdown() {
    let (dir, mut store) = formatted_store();
    store.create_type("Person", &fields(&["id", "age"])).unwrap();
    // format stamped pages 1..=3, the Person record file got page 4
    let pos = store.create_record("Person", &[1, 2]).unwrap();
    assert_eq!(pos.global, 4);
    store.close().unwrap();

    let mut store = open_store(&dir);
    // Car's field names need a second fields page (address 5), then its
    // record file gets address 6; a lost counter would hand out 1 again
    store.create_type("Car", &fields(&["id"])).unwrap();
    let pos = store.create_record("Car", &[9]).unwrap();
    assert_eq!(pos.global, 6);

    let (record, _) = store.search_record("Person", 1).unwrap();
    assert_eq!(record.unwrap(), vec![1, 2]);
}

#[test]
fn records_spill_onto_consecutive_pages() {
    let (dir, mut store) = formatted_store();
    store.create_type("Person", &fields(&["id", "val"])).unwrap();

    // 24-byte cells, 84 per page
    let mut rng = StdRng::seed_from_u64(RAND_SEED);
    let values: Vec<i64> = (0..200).map(|_| rng.gen_range(-1000..1000)).collect();
    for (key, &val) in values.iter().enumerate() {
        store.create_record("Person", &[key as i64, val]).unwrap();
    }

    assert_eq!(page_count(&dir.path().join("Person")), 3);
    assert_eq!(store.list_records("Person").unwrap().len(), 200);

    let (record, pos) = store.search_record("Person", 100).unwrap();
    assert_eq!(record.unwrap(), vec![100, values[100]]);
    assert_eq!(pos.local, 2);

    let (record, pos) = store.search_record("Person", 199).unwrap();
    assert_eq!(record.unwrap(), vec![199, values[199]]);
    assert_eq!(pos.local, 3);
}

#[test]
fn disk_full_is_sticky_and_partial_writes_stay() {
    let dir = TempDir::new().unwrap();
    let mut store = Store::open_with_config(
        dir.path(),
        StoreConfig {
            // room for the three catalog pages and nothing else
            max_storage_size: 4 * 2048,
        },
    )
    .unwrap();
    store.format().unwrap();
    assert!(!store.is_disk_full());

    // the type cell and fields page persist before the record file append
    // hits the ceiling; they are not rolled back
    let err = store.create_type("Person", &fields(&["id"])).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StorageError>(),
        Some(StorageError::DiskFull)
    ));
    assert!(store.is_disk_full());
    assert_eq!(store.list_types().unwrap()[0].name, "Person");

    assert!(store.create_type("Car", &fields(&["id"])).is_err());
    assert!(store.is_disk_full());
}

#[test]
fn a_store_directory_is_single_session() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();
    assert!(Store::open(dir.path()).is_err());
    drop(store);
    assert!(Store::open(dir.path()).is_ok());
}
