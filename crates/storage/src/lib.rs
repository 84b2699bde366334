//! Storage layer for docstore
//!
//! This crate implements the file-backed structures:
//! - MappedFile: growable memory-mapped file with append-point tracking
//! - Collection: padded variable-length records addressed by offset
//! - format: byte-exact layouts of records, buckets and varint slots

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collection;
pub mod format;
pub mod mapped;

pub use collection::{Collection, RecordId, ScanStats};
pub use format::trim_padding;
pub use mapped::{MappedFile, BOUNDARY_WINDOW};
