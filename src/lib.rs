//! # Docstore
//!
//! Embedded document storage built on memory-mapped files.
//!
//! Docstore keeps two kinds of on-disk structures, both of which grow in
//! place and survive reopening:
//!
//! - [`Collection`] - variable-length documents in padded records, addressed
//!   by their byte offset ([`RecordId`])
//! - [`HashTable`] - a persistent multimap from `u64` keys to `u64` values,
//!   typically field hashes to record ids
//!
//! ## Quick Start
//!
//! ```ignore
//! use docstore::prelude::*;
//!
//! let config = StorageConfig::create_or_read("./my-db".as_ref())?;
//! let docs = Collection::open("./my-db/docs", config.collection_options())?;
//! let by_name = HashTable::open("./my-db/by-name", config.hash_table_options())?;
//!
//! let id = docs.insert(br#"{"name":"Alice"}"#)?;
//! by_name.put(hash_str("Alice"), id.as_u64())?;
//!
//! for (_, raw) in by_name.get(hash_str("Alice"), 0, |_, _| true)? {
//!     let doc = docs.read(RecordId::from_raw(raw));
//! }
//! ```
//!
//! ## Crates
//!
//! | Crate | Contents |
//! |-------|----------|
//! | `docstore-core` | errors, options, persisted config |
//! | `docstore-storage` | mapped files, byte formats, collections |
//! | `docstore-concurrency` | per-bucket lock registry |
//! | `docstore-index` | hash table, key hashing |

#![warn(missing_docs)]

pub mod prelude;

pub use docstore_concurrency::{BucketLockRegistry, LockMode};
pub use docstore_core::{
    CollectionOptions, CorruptionCounter, Error, GrowthPolicy, HashTableOptions, Result,
    StorageConfig, CONFIG_FILE_NAME,
};
pub use docstore_index::{hash_bytes, hash_str, smear, HashTable};
pub use docstore_storage::{trim_padding, Collection, MappedFile, RecordId, ScanStats};

/// Byte formats of collection and hash files
pub use docstore_storage::format;
