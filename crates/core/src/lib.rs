//! Core types for docstore
//!
//! This crate defines the types shared by every storage structure:
//! - Error: error taxonomy and `Result` alias
//! - GrowthPolicy, CollectionOptions, HashTableOptions: open-time options
//! - StorageConfig: persisted tuning file of a database directory
//! - CorruptionCounter: count of skipped corrupt regions

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod corruption;
pub mod error;

pub use config::{
    CollectionOptions, GrowthPolicy, HashTableOptions, StorageConfig, CONFIG_FILE_NAME,
};
pub use corruption::CorruptionCounter;
pub use error::{Error, Result};
