//! Persisted storage config tests

use crate::common::*;
use docstore::prelude::*;
use docstore::CONFIG_FILE_NAME;
use std::fs;

#[test]
fn test_defaults_written_and_read_back() {
    let temp_dir = temp_dir();
    let dir = temp_dir.path().join("db");

    let written = StorageConfig::create_or_read(&dir).unwrap();
    assert!(dir.join(CONFIG_FILE_NAME).exists());
    assert_eq!(written, StorageConfig::default());

    let read = StorageConfig::create_or_read(&dir).unwrap();
    assert_eq!(read, written);
}

#[test]
fn test_partial_file_falls_back_to_defaults() {
    let temp_dir = temp_dir();
    fs::write(
        temp_dir.path().join(CONFIG_FILE_NAME),
        r#"{"hash_bits": 4, "per_bucket": 3}"#,
    )
    .unwrap();

    let config = StorageConfig::create_or_read(temp_dir.path()).unwrap();
    assert_eq!(config.hash_bits, 4);
    assert_eq!(config.per_bucket, 3);
    assert_eq!(config.doc_max_room, StorageConfig::default().doc_max_room);
}

#[test]
fn test_zero_value_rejected() {
    let temp_dir = temp_dir();
    fs::write(temp_dir.path().join(CONFIG_FILE_NAME), r#"{"per_bucket": 0}"#).unwrap();

    let err = StorageConfig::create_or_read(temp_dir.path()).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
}

#[test]
fn test_malformed_file_rejected() {
    let temp_dir = temp_dir();
    fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "not json").unwrap();

    let err = StorageConfig::create_or_read(temp_dir.path()).unwrap_err();
    assert!(matches!(err, Error::Serialization(_)));
}

#[test]
fn test_config_drives_structures() {
    let temp_dir = temp_dir();
    fs::write(
        temp_dir.path().join(CONFIG_FILE_NAME),
        r#"{"doc_max_room": 100, "col_file_growth": 8192, "hash_bits": 3, "per_bucket": 2, "ht_file_growth": 2048}"#,
    )
    .unwrap();
    let config = StorageConfig::create_or_read(temp_dir.path()).unwrap();

    let docs = Collection::open(temp_dir.path().join("docs"), config.collection_options()).unwrap();
    assert_eq!(docs.capacity(), 8192);
    assert_eq!(docs.max_room(), 100);
    assert!(matches!(docs.insert(&[b'a'; 51]), Err(Error::DocTooLarge { .. })));

    let index = HashTable::open(temp_dir.path().join("index"), config.hash_table_options()).unwrap();
    assert_eq!(index.initial_buckets(), 8);
    assert_eq!(index.capacity(), 2048);
}
