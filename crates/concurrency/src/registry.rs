//! Per-bucket reader-writer locks.
//!
//! A [`BucketLockRegistry`] maps a bucket (or any `u64` key) to its own
//! `RwLock`, created on first use and kept for the registry's lifetime.
//!
//! # Design
//!
//! - Fixed shard count: each shard is an `RwLock<FxHashMap<u64, Arc<RwLock<()>>>>`.
//!   Finding a lock only touches one shard, so unrelated buckets never
//!   contend on the map itself.
//! - Lookups take the shard's read side; only the first access to a bucket
//!   takes the write side to insert.
//! - Guards are owned (`Arc`-backed), so callers can hold a bucket lock
//!   without borrowing the registry.
//! - Locks are never removed. Memory grows with the number of distinct
//!   buckets touched, which a hash table bounds by its bucket count.
//!
//! # Thread Safety
//!
//! [`BucketLockRegistry::lock_all`] takes every shard's write lock, then every
//! bucket lock. Callers must not hold a bucket guard while calling it, and
//! must not hold one bucket guard while acquiring another if `lock_all` may
//! run concurrently.

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock, RwLockWriteGuard};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

/// Default number of registry shards
pub const DEFAULT_SHARDS: usize = 32;

/// Owned shared guard on one bucket
pub type SharedGuard = ArcRwLockReadGuard<RawRwLock, ()>;

/// Owned exclusive guard on one bucket
pub type ExclusiveGuard = ArcRwLockWriteGuard<RawRwLock, ()>;

type BucketLock = Arc<RwLock<()>>;
type Shard = RwLock<FxHashMap<u64, BucketLock>>;

/// Access mode for [`BucketLockRegistry::lock`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Many holders at once
    Shared,
    /// One holder, excludes shared holders
    Exclusive,
}

/// A held bucket lock of either mode
pub enum BucketGuard {
    /// Shared access
    Shared(SharedGuard),
    /// Exclusive access
    Exclusive(ExclusiveGuard),
}

impl BucketGuard {
    /// Mode this guard was taken in
    pub fn mode(&self) -> LockMode {
        match self {
            BucketGuard::Shared(_) => LockMode::Shared,
            BucketGuard::Exclusive(_) => LockMode::Exclusive,
        }
    }
}

/// Sharded, lazily populated map from bucket id to reader-writer lock
pub struct BucketLockRegistry {
    shards: Box<[Shard]>,
}

impl BucketLockRegistry {
    /// Registry with [`DEFAULT_SHARDS`] shards
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Registry with `shards` shards (at least one)
    pub fn with_shards(shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| RwLock::new(FxHashMap::default()))
            .collect();
        BucketLockRegistry { shards }
    }

    /// Number of shards
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Number of bucket locks created so far
    pub fn lock_count(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    /// Shard holding `id`: a MurmurHash3 mixing step, then modulo
    #[inline]
    fn shard_index(&self, id: u64) -> usize {
        let code = id.wrapping_mul(0xcc9e_2d51);
        let mixed = code.rotate_left(15).wrapping_mul(0x1b87_3593);
        (mixed % self.shards.len() as u64) as usize
    }

    fn lock_for(&self, id: u64) -> BucketLock {
        let shard = &self.shards[self.shard_index(id)];
        if let Some(lock) = shard.read().get(&id) {
            return Arc::clone(lock);
        }
        let mut map = shard.write();
        Arc::clone(map.entry(id).or_insert_with(|| Arc::new(RwLock::new(()))))
    }

    /// Block until `id` is held shared
    pub fn shared(&self, id: u64) -> SharedGuard {
        self.lock_for(id).read_arc()
    }

    /// Block until `id` is held exclusively
    pub fn exclusive(&self, id: u64) -> ExclusiveGuard {
        self.lock_for(id).write_arc()
    }

    /// Take `id` exclusively if nobody holds it
    pub fn try_exclusive(&self, id: u64) -> Option<ExclusiveGuard> {
        self.lock_for(id).try_write_arc()
    }

    /// Block until `id` is held in `mode`
    pub fn lock(&self, id: u64, mode: LockMode) -> BucketGuard {
        match mode {
            LockMode::Shared => BucketGuard::Shared(self.shared(id)),
            LockMode::Exclusive => BucketGuard::Exclusive(self.exclusive(id)),
        }
    }

    /// Hold every shard and every bucket lock until the guard drops.
    ///
    /// New buckets cannot be registered while the guard lives, so it
    /// excludes all other access through this registry.
    pub fn lock_all(&self) -> RegistryGuard<'_> {
        let shards: Vec<_> = self.shards.iter().map(|shard| shard.write()).collect();
        let buckets: Vec<_> = shards
            .iter()
            .flat_map(|map| map.values())
            .map(|lock| lock.write_arc())
            .collect();
        debug!("Locked all {} bucket locks", buckets.len());
        RegistryGuard {
            buckets,
            _shards: shards,
        }
    }
}

impl Default for BucketLockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Every lock of a registry, released on drop
pub struct RegistryGuard<'a> {
    buckets: Vec<ExclusiveGuard>,
    _shards: Vec<RwLockWriteGuard<'a, FxHashMap<u64, BucketLock>>>,
}

impl RegistryGuard<'_> {
    /// Bucket locks held
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
