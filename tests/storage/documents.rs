//! Collection document lifecycle tests
//!
//! Insert, read, update, delete and scan, including behavior after reopen.

use crate::common::*;
use docstore::prelude::*;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Barrier};
use std::thread;

// =============================================================================
// ROUND TRIP
// =============================================================================

#[test]
fn test_insert_read_roundtrip() {
    let temp_dir = temp_dir();
    let docs = Collection::open(temp_dir.path().join("docs"), small_collection()).unwrap();

    let ids: Vec<_> = (0..100).map(|i| docs.insert(&doc(i)).unwrap()).collect();
    for (i, id) in ids.iter().enumerate() {
        let room = docs.read(*id).unwrap();
        assert_eq!(room.len(), 2 * doc(i as u64).len());
        assert_eq!(trim_padding(&room), doc(i as u64).as_slice());
    }
}

#[test]
fn test_empty_payload() {
    let temp_dir = temp_dir();
    let docs = Collection::open(temp_dir.path().join("docs"), small_collection()).unwrap();

    let empty = docs.insert(b"").unwrap();
    let next = docs.insert(b"after").unwrap();

    assert_eq!(trim_padding(&docs.read(empty).unwrap()), b"");
    assert_eq!(trim_padding(&docs.read(next).unwrap()), b"after");
}

#[test]
fn test_read_unknown_id() {
    let temp_dir = temp_dir();
    let docs = Collection::open(temp_dir.path().join("docs"), small_collection()).unwrap();
    let id = docs.insert(b"only").unwrap();

    assert!(docs.read(RecordId::from_raw(id.as_u64() + 1)).is_none());
    assert!(docs.read(RecordId::from_raw(1 << 40)).is_none());
}

// =============================================================================
// UPDATE / DELETE
// =============================================================================

#[test]
fn test_update_in_place_keeps_id() {
    let temp_dir = temp_dir();
    let docs = Collection::open(temp_dir.path().join("docs"), small_collection()).unwrap();

    let id = docs.insert(b"abc").unwrap();
    let same = docs.update(id, b"abcdef").unwrap();

    assert_eq!(same, id);
    assert_eq!(trim_padding(&docs.read(id).unwrap()), b"abcdef");
}

#[test]
fn test_update_shrinking_payload_rewrites_padding() {
    let temp_dir = temp_dir();
    let docs = Collection::open(temp_dir.path().join("docs"), small_collection()).unwrap();

    let id = docs.insert(b"abcdef").unwrap();
    docs.update(id, b"xy").unwrap();

    assert_eq!(trim_padding(&docs.read(id).unwrap()), b"xy");
}

#[test]
fn test_update_outgrowing_room_moves_record() {
    let temp_dir = temp_dir();
    let docs = Collection::open(temp_dir.path().join("docs"), small_collection()).unwrap();

    let id = docs.insert(b"abc").unwrap();
    let moved = docs.update(id, b"abcdefg").unwrap();

    assert_ne!(moved, id);
    assert!(docs.read(id).is_none());
    assert_eq!(trim_padding(&docs.read(moved).unwrap()), b"abcdefg");
    assert!(matches!(docs.update(id, b"x"), Err(Error::NotFound(_))));
}

#[test]
fn test_update_too_large_leaves_record() {
    let temp_dir = temp_dir();
    let options = small_collection().with_max_room(64);
    let docs = Collection::open(temp_dir.path().join("docs"), options).unwrap();

    let id = docs.insert(b"small").unwrap();
    let err = docs.update(id, &[b'z'; 40]).unwrap_err();

    assert!(matches!(err, Error::DocTooLarge { max: 64, requested: 80 }));
    assert_eq!(trim_padding(&docs.read(id).unwrap()), b"small");
    assert!(matches!(docs.insert(&[b'z'; 33]), Err(Error::DocTooLarge { .. })));
}

#[test]
fn test_delete_idempotent() {
    let temp_dir = temp_dir();
    let docs = Collection::open(temp_dir.path().join("docs"), small_collection()).unwrap();

    let id = docs.insert(b"gone soon").unwrap();
    let kept = docs.insert(b"kept").unwrap();

    assert!(docs.delete(id).unwrap());
    assert!(!docs.delete(id).unwrap());
    assert!(docs.read(id).is_none());
    assert_eq!(trim_padding(&docs.read(kept).unwrap()), b"kept");
}

// =============================================================================
// SCAN
// =============================================================================

#[test]
fn test_for_all_skips_deleted() {
    let temp_dir = temp_dir();
    let docs = Collection::open(temp_dir.path().join("docs"), small_collection()).unwrap();

    let ids: Vec<_> = (0..10).map(|i| docs.insert(&doc(i)).unwrap()).collect();
    for id in ids.iter().step_by(2) {
        docs.delete(*id).unwrap();
    }

    let mut seen = Vec::new();
    let stats = docs.for_all(|id, room| {
        seen.push((id, trim_padding(room).to_vec()));
        true
    });

    assert_eq!(stats.visited, 5);
    assert!(!stats.has_issues());
    let expected: Vec<_> = (1..10).step_by(2).map(|i| (ids[i], doc(i as u64))).collect();
    assert_eq!(seen, expected);
}

#[test]
fn test_for_all_stops_early() {
    let temp_dir = temp_dir();
    let docs = Collection::open(temp_dir.path().join("docs"), small_collection()).unwrap();
    for i in 0..10 {
        docs.insert(&doc(i)).unwrap();
    }

    let mut count = 0;
    docs.for_all(|_, _| {
        count += 1;
        count < 3
    });
    assert_eq!(count, 3);
}

#[test]
fn test_visitor_may_update() {
    let temp_dir = temp_dir();
    let docs = Collection::open(temp_dir.path().join("docs"), small_collection()).unwrap();
    for i in 0..5 {
        docs.insert(format!("v{}", i).as_bytes()).unwrap();
    }

    docs.for_all(|id, _| {
        docs.update(id, b"w").unwrap();
        true
    });

    let mut rooms = Vec::new();
    docs.for_all(|_, room| {
        rooms.push(trim_padding(room).to_vec());
        true
    });
    assert_eq!(rooms, vec![b"w".to_vec(); 5]);
}

// =============================================================================
// GROWTH / PERSISTENCE
// =============================================================================

#[test]
fn test_growth_keeps_capacity_aligned() {
    let temp_dir = temp_dir();
    let docs = Collection::open(temp_dir.path().join("docs"), small_collection()).unwrap();

    let mut ids = Vec::new();
    for i in 0..500 {
        ids.push(docs.insert(&doc(i)).unwrap());
        assert!(docs.used_size() <= docs.capacity());
    }

    assert!(docs.capacity() > 4096);
    assert_eq!(docs.capacity() % 4096, 0);
    assert_eq!(trim_padding(&docs.read(ids[0]).unwrap()), doc(0).as_slice());
    assert_eq!(trim_padding(&docs.read(ids[499]).unwrap()), doc(499).as_slice());
}

#[test]
fn test_reopen_recovers_documents() {
    let temp_dir = temp_dir();
    let path = temp_dir.path().join("docs");

    let docs = Collection::open(&path, small_collection()).unwrap();
    let ids: Vec<_> = (0..200).map(|i| docs.insert(&doc(i)).unwrap()).collect();
    docs.delete(ids[10]).unwrap();
    let moved = docs.update(ids[20], &[b'm'; 200]).unwrap();
    let used = docs.used_size();
    docs.close().unwrap();

    let docs = Collection::open(&path, small_collection()).unwrap();
    assert_eq!(docs.used_size(), used);
    assert!(docs.read(ids[10]).is_none());
    assert!(docs.read(ids[20]).is_none());
    assert_eq!(trim_padding(&docs.read(moved).unwrap()), &[b'm'; 200][..]);
    assert_eq!(trim_padding(&docs.read(ids[199]).unwrap()), doc(199).as_slice());

    let next = docs.insert(b"appended").unwrap();
    assert_eq!(next.as_u64(), used);
    assert_eq!(docs.for_all(|_, _| true).visited, 200);
}

// =============================================================================
// CONCURRENCY
// =============================================================================

#[test]
fn test_concurrent_insert_read_update() {
    let temp_dir = temp_dir();
    let docs = Arc::new(Collection::open(temp_dir.path().join("docs"), small_collection()).unwrap());
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4u64)
        .map(|t| {
            let docs = Arc::clone(&docs);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut mine = HashMap::new();
                for i in 0..200u64 {
                    let n = t * 1000 + i;
                    let id = docs.insert(&doc(n)).unwrap();
                    mine.insert(id, doc(n));
                    if i % 10 == 0 {
                        let body = format!("updated-{}", n).into_bytes();
                        let id = docs.update(id, &body).unwrap();
                        mine.retain(|_, v| *v != doc(n));
                        mine.insert(id, body);
                    }
                }
                mine
            })
        })
        .collect();

    let mut all = HashMap::new();
    for h in handles {
        all.extend(h.join().unwrap());
    }
    assert_eq!(all.len(), 800);
    for (id, body) in &all {
        assert_eq!(trim_padding(&docs.read(*id).unwrap()), body.as_slice());
    }
    assert_eq!(docs.for_all(|_, _| true).visited, 800);
}

// =============================================================================
// PROPERTIES
// =============================================================================

fn filled_room(payload: &[u8], fill: u8) -> Vec<u8> {
    let room = (payload.len() * 2).max(1);
    let mut bytes = payload.to_vec();
    bytes.resize(room, fill);
    bytes
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_documents_survive_reopen(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..24),
        fills in prop::collection::vec(any::<Option<u8>>(), 24),
    ) {
        let temp_dir = temp_dir();
        let path = temp_dir.path().join("docs");

        let docs = Collection::open(&path, small_collection()).unwrap();
        let mut expected = Vec::new();
        for (payload, fill) in payloads.iter().zip(&fills) {
            let id = docs.insert(payload).unwrap();
            // Some records get their whole room rewritten, zeros included
            let stored = match fill {
                Some(byte) => {
                    let body = filled_room(payload, *byte);
                    prop_assert_eq!(docs.update(id, &body).unwrap(), id);
                    body
                }
                None => filled_room(payload, b' '),
            };
            expected.push((id, stored));
        }
        let used = docs.used_size();
        docs.close().unwrap();

        let docs = Collection::open(&path, small_collection()).unwrap();
        prop_assert_eq!(docs.used_size(), used);
        for (id, stored) in &expected {
            prop_assert_eq!(docs.read(*id).unwrap(), stored.clone());
        }

        let next = docs.insert(b"next").unwrap();
        prop_assert_eq!(next.as_u64(), used);
        let stats = docs.for_all(|_, _| true);
        prop_assert_eq!(stats.visited, expected.len() as u64 + 1);
        prop_assert_eq!(docs.corruption_events(), 0);
    }
}
