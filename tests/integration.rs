// End-to-end tests against the library API: tree structure invariants
// after mixed insertion orders, persistence across reopen, and journal
// recovery.

use littledb::btree::ROOT_PAGE_NUM;
use littledb::journal::Journal;
use littledb::node::{self, internal, leaf, NodeType, INVALID_PAGE_NUM};
use littledb::pager::{Pager, PAGE_SIZE};
use littledb::{DbError, Row, Table};

fn row(id: u32) -> Row {
    Row::new(id, &format!("user{id}"), &format!("person{id}@example.com"))
}

/// Walk the whole tree checking the structural invariants: in-leaf key
/// ordering, separator keys equal to subtree maxima, right-child keys
/// strictly above the last separator, and parent back-links. Returns the
/// subtree's keys in traversal order.
fn check_subtree(pager: &mut Pager, page_num: u32, expected_parent: Option<u32>) -> Vec<u32> {
    let data = pager.get_page(page_num).unwrap().data;

    match expected_parent {
        Some(parent) => {
            assert!(!node::is_root(&data), "non-root flag on page {page_num}");
            assert_eq!(
                node::parent(&data),
                parent,
                "parent link of page {page_num}"
            );
        }
        None => assert!(node::is_root(&data), "root flag on page {page_num}"),
    }

    match node::node_type(&data).unwrap() {
        NodeType::Leaf => {
            let keys: Vec<u32> = (0..leaf::num_cells(&data))
                .map(|i| leaf::key(&data, i))
                .collect();
            assert!(
                keys.windows(2).all(|w| w[0] < w[1]),
                "leaf keys out of order on page {page_num}: {keys:?}"
            );
            keys
        }
        NodeType::Internal => {
            let num_keys = internal::num_keys(&data);
            assert_ne!(internal::right_child(&data), INVALID_PAGE_NUM);

            let mut keys = Vec::new();
            for i in 0..num_keys {
                let child_page_num = internal::child(&data, i).unwrap();
                let child_keys = check_subtree(pager, child_page_num, Some(page_num));
                assert_eq!(
                    child_keys.last().copied(),
                    Some(internal::key(&data, i)),
                    "separator {i} of page {page_num} is not its subtree's max"
                );
                keys.extend(child_keys);
            }

            let right_keys = check_subtree(pager, internal::right_child(&data), Some(page_num));
            if num_keys > 0 {
                assert!(
                    right_keys.first().copied() > Some(internal::key(&data, num_keys - 1)),
                    "right child of page {page_num} overlaps the last separator"
                );
            }
            keys.extend(right_keys);

            assert!(
                keys.windows(2).all(|w| w[0] < w[1]),
                "subtree keys out of order under page {page_num}"
            );
            keys
        }
    }
}

fn check_tree(table: &mut Table) -> Vec<u32> {
    check_subtree(table.pager_mut(), ROOT_PAGE_NUM, None)
}

#[test]
fn test_ascending_inserts_keep_all_invariants() {
    let dir = tempfile::tempdir().unwrap();
    let mut table = Table::open(dir.path().join("test.db")).unwrap();

    let ids: Vec<u32> = (1..=60).collect();
    for &id in &ids {
        table.insert(&row(id)).unwrap();
        check_tree(&mut table);
    }

    assert_eq!(check_tree(&mut table), ids);
    let scanned: Vec<u32> = table.select().unwrap().iter().map(|r| r.id).collect();
    assert_eq!(scanned, ids);
}

#[test]
fn test_descending_inserts_keep_all_invariants() {
    let dir = tempfile::tempdir().unwrap();
    let mut table = Table::open(dir.path().join("test.db")).unwrap();

    for id in (1..=60).rev() {
        table.insert(&row(id)).unwrap();
        check_tree(&mut table);
    }

    let scanned: Vec<u32> = table.select().unwrap().iter().map(|r| r.id).collect();
    assert_eq!(scanned, (1..=60).collect::<Vec<u32>>());
}

#[test]
fn test_shuffled_inserts_keep_all_invariants() {
    let dir = tempfile::tempdir().unwrap();
    let mut table = Table::open(dir.path().join("test.db")).unwrap();

    // 37 is coprime with 64, so this visits every id in 1..=64 once.
    let ids: Vec<u32> = (0..64u32).map(|i| (i * 37) % 64 + 1).collect();
    for &id in &ids {
        table.insert(&row(id)).unwrap();
        check_tree(&mut table);
    }

    let scanned: Vec<u32> = table.select().unwrap().iter().map(|r| r.id).collect();
    assert_eq!(scanned, (1..=64).collect::<Vec<u32>>());
}

#[test]
fn test_rows_round_trip_through_the_tree() {
    let dir = tempfile::tempdir().unwrap();
    let mut table = Table::open(dir.path().join("test.db")).unwrap();

    let ids = [9u32, 2, 30, 14, 1, 25];
    for &id in &ids {
        table.insert(&row(id)).unwrap();
    }

    let rows = table.select().unwrap();
    let mut expected: Vec<u32> = ids.to_vec();
    expected.sort_unstable();
    for (got, id) in rows.iter().zip(&expected) {
        assert_eq!(got, &row(*id));
    }
}

#[test]
fn test_thirteen_rows_fit_in_one_leaf_and_the_fourteenth_splits() {
    let dir = tempfile::tempdir().unwrap();
    let mut table = Table::open(dir.path().join("test.db")).unwrap();

    for id in 1..=13 {
        table.insert(&row(id)).unwrap();
    }
    assert!(table.format_tree().unwrap().starts_with("- leaf (size 13)"));

    table.insert(&row(14)).unwrap();
    let tree = table.format_tree().unwrap();
    assert!(tree.starts_with("- internal (size 1)"));
    assert!(tree.contains("- key 7"));
}

#[test]
fn test_duplicate_insert_leaves_the_tree_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let mut table = Table::open(dir.path().join("test.db")).unwrap();

    for id in 1..=20 {
        table.insert(&row(id)).unwrap();
    }

    let num_pages = table.pager_mut().num_pages();
    let before: Vec<[u8; PAGE_SIZE]> = (0..num_pages)
        .map(|n| table.pager_mut().get_page(n).unwrap().data)
        .collect();

    let err = table.insert(&row(10)).unwrap_err();
    assert!(matches!(err, DbError::DuplicateKey));

    assert_eq!(table.pager_mut().num_pages(), num_pages);
    for (n, snapshot) in before.iter().enumerate() {
        let after = table.pager_mut().get_page(n as u32).unwrap().data;
        assert_eq!(&snapshot[..], &after[..], "page {n} changed");
    }
}

#[test]
fn test_close_reopen_close_reopen_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");

    let ids: Vec<u32> = (1..=40).collect();
    {
        let mut table = Table::open(&db_path).unwrap();
        for &id in &ids {
            table.insert(&row(id)).unwrap();
        }
    }

    let first_pass = {
        let mut table = Table::open(&db_path).unwrap();
        check_tree(&mut table);
        table.select().unwrap()
    };

    let second_pass = {
        let mut table = Table::open(&db_path).unwrap();
        table.select().unwrap()
    };

    assert_eq!(first_pass, second_pass);
    let scanned: Vec<u32> = first_pass.iter().map(|r| r.id).collect();
    assert_eq!(scanned, ids);
}

#[test]
fn test_journaled_table_flushes_and_removes_its_journal() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");

    {
        let mut table = Table::open_journaled(&db_path).unwrap();
        for id in 1..=20 {
            table.insert(&row(id)).unwrap();
        }
    }
    assert!(!dir.path().join("test.db-journal").exists());

    let mut table = Table::open(&db_path).unwrap();
    let scanned: Vec<u32> = table.select().unwrap().iter().map(|r| r.id).collect();
    assert_eq!(scanned, (1..=20).collect::<Vec<u32>>());
}

#[test]
fn test_leftover_journal_is_replayed_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");

    // State one: a single row, flushed.
    {
        let mut table = Table::open(&db_path).unwrap();
        table.insert(&row(1)).unwrap();
    }
    let page_with_one_row: Vec<u8> = std::fs::read(&db_path).unwrap();
    assert_eq!(page_with_one_row.len(), PAGE_SIZE);

    // State two: a second row lands in the file.
    {
        let mut table = Table::open(&db_path).unwrap();
        table.insert(&row(2)).unwrap();
    }

    // A journal left behind by an interrupted flush of state one.
    let mut journal = Journal::new(&db_path);
    journal.begin().unwrap();
    journal.record(0, &page_with_one_row).unwrap();
    drop(journal);

    // Opening replays the journaled image over the file.
    let mut table = Table::open(&db_path).unwrap();
    let scanned: Vec<u32> = table.select().unwrap().iter().map(|r| r.id).collect();
    assert_eq!(scanned, vec![1]);
    assert!(!dir.path().join("test.db-journal").exists());
}
