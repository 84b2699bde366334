//! Convenient imports for Docstore.
//!
//! ```ignore
//! use docstore::prelude::*;
//!
//! let docs = Collection::open("./docs", CollectionOptions::default())?;
//! ```

// Structures
pub use crate::{Collection, HashTable, RecordId, ScanStats};

// Options and config
pub use crate::{CollectionOptions, GrowthPolicy, HashTableOptions, StorageConfig};

// Error handling
pub use crate::{Error, Result};

// Helpers
pub use crate::{hash_bytes, hash_str, trim_padding};
