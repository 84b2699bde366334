//! Index Integration Tests
//!
//! Tests for hash table files through the public API: multimap semantics,
//! chain growth, persistence, partitioned scans, concurrent access, and use
//! as a secondary index over a collection.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test index
//! cargo test --release --test index stress::
//! ```

#[path = "../common/mod.rs"]
mod common;

mod stress;
