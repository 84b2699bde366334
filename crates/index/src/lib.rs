//! Index layer for docstore
//!
//! This crate implements lookup structures over stored documents:
//! - HashTable: persistent chained multimap from `u64` keys to `u64` values
//! - hash: helpers turning field values into well-spread keys

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod hash;
pub mod hash_table;

pub use hash::{hash_bytes, hash_str, smear};
pub use hash_table::HashTable;
