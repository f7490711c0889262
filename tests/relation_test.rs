//! Integration tests for heap relations

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use heapdb::buffer::BufferManager;
use heapdb::common::{DbConfig, DbError, PageId, RecordId};
use heapdb::heap::Relation;
use heapdb::storage::disk::DiskManager;
use heapdb::storage::page::DataPage;
use heapdb::tuple::{ColumnInfo, ColumnType};
use rand::Rng;
use tempfile::TempDir;

struct Db {
    dm: Arc<DiskManager>,
    bm: Arc<BufferManager>,
    _dir: TempDir,
}

fn open_db(page_size: usize, buffers: usize) -> Db {
    let dir = TempDir::new().unwrap();
    let config = DbConfig::new(dir.path())
        .with_page_size(page_size)
        .with_buffer_count(buffers);
    let dm = Arc::new(DiskManager::new(&config));
    dm.init().unwrap();
    let bm = Arc::new(BufferManager::from_config(&config, Arc::clone(&dm)));
    Db { dm, bm, _dir: dir }
}

fn id_name_columns() -> Vec<ColumnInfo> {
    vec![
        ColumnInfo::new("Id", ColumnType::Int),
        ColumnInfo::new("Name", ColumnType::Char(5)),
    ]
}

fn create(db: &Db, columns: Vec<ColumnInfo>) -> Relation {
    Relation::create("R", columns, Arc::clone(&db.dm), Arc::clone(&db.bm)).unwrap()
}

/// Walks a list from `head`, checking back links, and returns its pages.
fn walk(db: &Db, head: Option<PageId>) -> Vec<PageId> {
    let mut pages = Vec::new();
    let mut prev = None;
    let mut current = head;
    while let Some(page_id) = current {
        let guard = db.bm.read_page(page_id).unwrap();
        let page = DataPage::new(guard.data());
        assert_eq!(page.prev(), prev, "broken back link at {}", page_id);
        pages.push(page_id);
        prev = Some(page_id);
        current = page.next();
    }
    pages
}

fn assert_list_invariants(db: &Db, rel: &Relation) {
    let full = walk(db, rel.full_head().unwrap());
    let not_full = walk(db, rel.not_full_head().unwrap());

    for &page_id in &full {
        let guard = db.bm.read_page(page_id).unwrap();
        let page = DataPage::new(guard.data());
        assert_eq!(page.slot_count(), rel.slots_per_page());
        assert!(page.is_full(), "{} is on the full list but has room", page_id);
    }
    for &page_id in &not_full {
        let guard = db.bm.read_page(page_id).unwrap();
        let page = DataPage::new(guard.data());
        assert!(!page.is_full(), "{} is on the not-full list but full", page_id);
        assert!(!page.is_empty(), "{} is empty but still linked", page_id);
    }

    let all: HashSet<_> = full.iter().chain(&not_full).copied().collect();
    assert_eq!(all.len(), full.len() + not_full.len());
    assert!(!all.contains(&rel.header_page_id()));

    // Header plus data pages are exactly what the allocator has handed out.
    assert_eq!(db.dm.allocated_page_count(), 1 + all.len());
}

#[test]
fn test_relation_end_to_end_single_buffer() {
    let db = open_db(64, 1);
    let rel = create(&db, id_name_columns());
    assert_eq!(rel.record_size(), 9);
    assert_eq!(rel.slots_per_page(), 4);

    let r1 = rel.insert_record(&["1", "alice"]).unwrap();
    let r2 = rel.insert_record(&["2", "bob"]).unwrap();
    let r3 = rel.insert_record(&["3", "carl"]).unwrap();
    assert_eq!(r1.slot_idx, 0);
    assert_eq!(r2.slot_idx, 1);
    assert_eq!(r3.slot_idx, 2);

    assert_eq!(
        rel.get_all_records().unwrap(),
        vec![vec!["1", "alice"], vec!["2", "bob"], vec!["3", "carl"]]
    );

    rel.delete_record(r2).unwrap();
    assert_eq!(
        rel.get_all_records().unwrap(),
        vec![vec!["1", "alice"], vec!["3", "carl"]]
    );

    let free_before = db.dm.free_page_count();
    rel.delete_record(r1).unwrap();
    rel.delete_record(r3).unwrap();
    assert!(rel.get_all_records().unwrap().is_empty());
    assert!(rel.get_data_pages().unwrap().is_empty());
    assert_eq!(db.dm.free_page_count(), free_before + 1);
}

#[test]
fn test_relation_record_ids_allow_deleting_scanned_rows() {
    let db = open_db(64, 2);
    let rel = create(&db, id_name_columns());
    for i in 0..10 {
        rel.insert_record(&[i.to_string(), format!("n{}", i)]).unwrap();
    }

    for (rid, record) in rel.get_all_record_ids().unwrap() {
        let id: i32 = record[0].parse().unwrap();
        if id % 2 == 0 {
            rel.delete_record(rid).unwrap();
        }
    }

    let mut ids: Vec<i32> = rel
        .get_all_records()
        .unwrap()
        .iter()
        .map(|r| r[0].parse().unwrap())
        .collect();
    ids.sort();
    assert_eq!(ids, vec![1, 3, 5, 7, 9]);
    assert_list_invariants(&db, &rel);
}

#[test]
fn test_relation_pages_move_between_lists() {
    let db = open_db(64, 2);
    let rel = create(&db, id_name_columns());

    let rids: Vec<RecordId> = (0..8)
        .map(|i| rel.insert_record(&[i.to_string(), "x".to_string()]).unwrap())
        .collect();

    let first = rids[0].page_id;
    let second = rids[4].page_id;
    assert_ne!(first, second);
    assert_eq!(rel.not_full_head().unwrap(), None);
    assert_eq!(walk(&db, rel.full_head().unwrap()), vec![second, first]);

    // Freeing a slot on the tail of the full list moves it to not-full.
    rel.delete_record(rids[1]).unwrap();
    assert_eq!(walk(&db, rel.full_head().unwrap()), vec![second]);
    assert_eq!(rel.not_full_head().unwrap(), Some(first));

    // The next insert fills the hole.
    let rid = rel.insert_record(&["42", "y"]).unwrap();
    assert_eq!(rid, RecordId::new(first, 1));
    assert_eq!(rel.not_full_head().unwrap(), None);
    assert_list_invariants(&db, &rel);
}

#[test]
fn test_relation_empty_page_unlinked_from_middle_of_list() {
    let db = open_db(64, 3);
    let rel = create(&db, id_name_columns());

    let p1 = rel.add_data_page().unwrap();
    let p2 = rel.add_data_page().unwrap();
    let p3 = rel.add_data_page().unwrap();
    assert_eq!(walk(&db, rel.not_full_head().unwrap()), vec![p3, p2, p1]);

    let rid = rel.write_record_to_data_page(&["1", "a"], p2).unwrap();
    rel.write_record_to_data_page(&["2", "b"], p1).unwrap();
    rel.write_record_to_data_page(&["3", "c"], p3).unwrap();

    rel.delete_record(rid).unwrap();
    assert_eq!(walk(&db, rel.not_full_head().unwrap()), vec![p3, p1]);
    assert_list_invariants(&db, &rel);
}

#[test]
fn test_relation_all_column_types() {
    let db = open_db(256, 2);
    let columns = vec![
        ColumnInfo::new("I", ColumnType::Int),
        ColumnInfo::new("F", ColumnType::Float),
        ColumnInfo::new("C", ColumnType::Char(4)),
        ColumnInfo::new("V", ColumnType::VarChar(10)),
    ];
    let rel = create(&db, columns);

    rel.insert_record(&["-12", "0.5", "ab", "hello"]).unwrap();
    rel.insert_record(&["7", "-3.25", "wxyz", ""]).unwrap();

    assert_eq!(
        rel.get_all_records().unwrap(),
        vec![
            vec!["-12", "0.5", "ab", "hello"],
            vec!["7", "-3.25", "wxyz", ""],
        ]
    );

    assert!(matches!(
        rel.insert_record(&["1", "1", "toolong", ""]),
        Err(DbError::ValueTooLong { .. })
    ));
    assert!(matches!(
        rel.insert_record(&["x", "1", "", ""]),
        Err(DbError::TypeMismatch { .. })
    ));
    assert!(matches!(
        rel.insert_record(&["1", "1"]),
        Err(DbError::ArityMismatch { .. })
    ));
    assert_eq!(rel.get_all_records().unwrap().len(), 2);
}

#[test]
fn test_relation_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = DbConfig::new(dir.path()).with_page_size(128).with_buffer_count(2);
    let header;

    {
        let dm = Arc::new(DiskManager::new(&config));
        dm.init().unwrap();
        let bm = Arc::new(BufferManager::from_config(&config, Arc::clone(&dm)));
        let rel = Relation::create("R", id_name_columns(), Arc::clone(&dm), Arc::clone(&bm))
            .unwrap();
        for i in 0..30 {
            rel.insert_record(&[i.to_string(), "p".to_string()]).unwrap();
        }
        header = rel.header_page_id();
        bm.flush_all().unwrap();
        dm.finish().unwrap();
    }

    let dm = Arc::new(DiskManager::new(&config));
    dm.init().unwrap();
    let bm = Arc::new(BufferManager::from_config(&config, Arc::clone(&dm)));
    let rel = Relation::open("R", id_name_columns(), header, dm, bm).unwrap();

    let mut ids: Vec<i32> = rel
        .get_all_records()
        .unwrap()
        .iter()
        .map(|r| r[0].parse().unwrap())
        .collect();
    ids.sort();
    assert_eq!(ids, (0..30).collect::<Vec<_>>());
}

#[test]
fn test_relation_random_operations_keep_lists_consistent() {
    let db = open_db(64, 2);
    let rel = create(&db, id_name_columns());
    let mut rng = rand::thread_rng();
    let mut model: HashMap<RecordId, Vec<String>> = HashMap::new();

    for step in 0..400 {
        if !model.is_empty() && rng.gen_bool(0.45) {
            let idx = rng.gen_range(0..model.len());
            let rid = *model.keys().nth(idx).unwrap();
            rel.delete_record(rid).unwrap();
            model.remove(&rid);
        } else {
            let record = vec![step.to_string(), format!("s{}", step % 100)];
            let rid = rel.insert_record(&record).unwrap();
            assert!(model.insert(rid, record).is_none(), "rid {} reused while live", rid);
        }

        if step % 20 == 0 {
            assert_list_invariants(&db, &rel);
        }
    }

    assert_list_invariants(&db, &rel);
    let stored: HashMap<RecordId, Vec<String>> =
        rel.get_all_record_ids().unwrap().into_iter().collect();
    assert_eq!(stored, model);
}
