//! Concurrency layer for docstore
//!
//! This crate implements fine-grained locking for on-disk structures:
//! - BucketLockRegistry: lazily created per-bucket reader-writer locks
//! - RegistryGuard: whole-structure exclusion for maintenance operations

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod registry;

pub use registry::{
    BucketGuard, BucketLockRegistry, ExclusiveGuard, LockMode, RegistryGuard, SharedGuard,
    DEFAULT_SHARDS,
};
