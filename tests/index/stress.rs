//! Concurrent put/get stress tests
//!
//! The full-size scenario maps two million sequential keys to themselves and
//! reads every one back from several threads at once.

use crate::common::*;
use docstore::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const KEYS: u64 = 2_000_000;
const THREADS: u64 = 8;

fn options() -> HashTableOptions {
    HashTableOptions::new(18, 16)
}

#[test]
fn test_two_million_keys_concurrent_get() {
    let temp_dir = temp_dir();
    let index = Arc::new(HashTable::open(temp_dir.path().join("index"), options()).unwrap());

    for key in 0..KEYS {
        index.put(key, key).unwrap();
    }

    let barrier = Arc::new(Barrier::new(THREADS as usize));
    let bad = Arc::new(AtomicU64::new(0));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let index = Arc::clone(&index);
            let barrier = Arc::clone(&barrier);
            let bad = Arc::clone(&bad);
            thread::spawn(move || {
                barrier.wait();
                let mut key = t;
                while key < KEYS {
                    let found = index.get(key, 0, |_, _| true).unwrap();
                    if found != [(key, key)] {
                        bad.fetch_add(1, Ordering::Relaxed);
                    }
                    key += THREADS;
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(bad.load(Ordering::Relaxed), 0);
    assert_eq!(index.corruption_events(), 0);
}

#[test]
fn test_concurrent_put_while_reading() {
    let temp_dir = temp_dir();
    let options = small_hash_table().with_growth(GrowthPolicy::fixed(4096));
    let index = Arc::new(HashTable::open(temp_dir.path().join("index"), options).unwrap());
    let barrier = Arc::new(Barrier::new(6));

    let writers: Vec<_> = (0..4u64)
        .map(|t| {
            let index = Arc::clone(&index);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..500u64 {
                    let key = i * 4 + t;
                    index.put(key, key).unwrap();
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..2u64)
        .map(|_| {
            let index = Arc::clone(&index);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for key in 0..2_000u64 {
                    // Either not there yet or there exactly once
                    let found = index.get(key, 0, |_, _| true).unwrap();
                    assert!(found.is_empty() || found == [(key, key)]);
                }
            })
        })
        .collect();

    for h in writers.into_iter().chain(readers) {
        h.join().unwrap();
    }
    for key in 0..2_000u64 {
        assert_eq!(index.values(key).unwrap(), vec![key]);
    }
    assert_eq!(index.get_all(0).unwrap().len(), 2_000);
    assert_eq!(index.corruption_events(), 0);
}
