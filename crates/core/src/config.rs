//! Tuning parameters for collection and hash table files.
//!
//! ## Design
//!
//! Two layers of configuration exist:
//!
//! - Per-structure options ([`CollectionOptions`], [`HashTableOptions`]) passed to
//!   `open`. These are plain values with presets, never read from disk.
//! - [`StorageConfig`], the persisted tuning file (`data-config.json`) a database
//!   directory carries so every process opening it agrees on layout parameters.
//!
//! Growth sizes only change how much zero-filled capacity a file carries.
//! Record and bucket offsets do not depend on them, so they can be retuned
//! between runs. `hash_bits` and `per_bucket` are part of the hash file layout
//! and must never change for an existing file.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Name of the persisted config file inside a database directory
pub const CONFIG_FILE_NAME: &str = "data-config.json";

const MIB: u64 = 1024 * 1024;

/// Capacity at which growth switches to the large increment
pub const DEFAULT_GROWTH_THRESHOLD: u64 = 128 * MIB;

/// Minimum step used once a file is past the threshold
pub const DEFAULT_LARGE_INCREMENT: u64 = 64 * MIB;

// ============================================================================
// Growth Policy
// ============================================================================

/// Size-tiered file growth.
///
/// Below `threshold` a file grows by `increment`. At or above it, by
/// `large_increment` rounded up to a multiple of `increment`, so capacity
/// always stays a whole multiple of the base increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrowthPolicy {
    /// Base growth step in bytes
    pub increment: u64,
    /// Capacity at which the large step takes over
    pub threshold: u64,
    /// Growth step for large files
    pub large_increment: u64,
}

impl GrowthPolicy {
    /// Policy with the given base increment and default tiers
    pub fn new(increment: u64) -> Self {
        GrowthPolicy {
            increment,
            threshold: DEFAULT_GROWTH_THRESHOLD,
            large_increment: DEFAULT_LARGE_INCREMENT,
        }
    }

    /// Single-tier policy: always grow by `increment`
    pub fn fixed(increment: u64) -> Self {
        GrowthPolicy {
            increment,
            threshold: u64::MAX,
            large_increment: increment,
        }
    }

    /// Number of bytes to add to a file whose capacity is `capacity`
    pub fn increment_for(&self, capacity: u64) -> u64 {
        if capacity < self.threshold || self.large_increment <= self.increment {
            return self.increment;
        }
        let steps = (self.large_increment + self.increment - 1) / self.increment;
        steps.saturating_mul(self.increment)
    }

    /// Reject policies that could never grow a file
    pub fn validate(&self) -> Result<()> {
        if self.increment == 0 {
            return Err(Error::InvalidConfig(
                "growth increment must be at least 1 byte".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Collection Options
// ============================================================================

/// Options for opening a collection file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionOptions {
    /// Growth policy of the backing file
    pub growth: GrowthPolicy,
    /// Maximum room a single record may occupy
    pub max_room: u64,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        CollectionOptions {
            growth: GrowthPolicy::new(32 * MIB),
            max_room: 2 * MIB,
        }
    }
}

impl CollectionOptions {
    /// Small files that grow often - for tests and tiny collections
    pub fn small() -> Self {
        CollectionOptions {
            growth: GrowthPolicy::fixed(4096),
            max_room: 1024,
        }
    }

    /// Override the maximum record room
    pub fn with_max_room(mut self, max_room: u64) -> Self {
        self.max_room = max_room;
        self
    }

    /// Override the growth policy
    pub fn with_growth(mut self, growth: GrowthPolicy) -> Self {
        self.growth = growth;
        self
    }

    /// Check options before opening
    pub fn validate(&self) -> Result<()> {
        self.growth.validate()?;
        if self.max_room == 0 {
            return Err(Error::InvalidConfig("max_room must be at least 1".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// Hash Table Options
// ============================================================================

/// Options for opening a hash table file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashTableOptions {
    /// Number of low key bits selecting the head bucket
    pub hash_bits: u32,
    /// Entry slots per bucket
    pub per_bucket: u64,
    /// Growth policy of the backing file
    pub growth: GrowthPolicy,
}

impl Default for HashTableOptions {
    fn default() -> Self {
        HashTableOptions {
            hash_bits: 16,
            per_bucket: 16,
            growth: GrowthPolicy::new(16 * MIB),
        }
    }
}

impl HashTableOptions {
    /// Options with the given layout and a default growth policy
    pub fn new(hash_bits: u32, per_bucket: u64) -> Self {
        HashTableOptions {
            hash_bits,
            per_bucket,
            ..Default::default()
        }
    }

    /// Tiny layout that chains almost immediately - for tests
    pub fn small() -> Self {
        HashTableOptions {
            hash_bits: 2,
            per_bucket: 2,
            growth: GrowthPolicy::fixed(1024),
        }
    }

    /// Override the growth policy
    pub fn with_growth(mut self, growth: GrowthPolicy) -> Self {
        self.growth = growth;
        self
    }

    /// Check options before opening
    ///
    /// `hash_bits` is capped at 48 so the head bucket count stays addressable.
    pub fn validate(&self) -> Result<()> {
        if self.hash_bits == 0 || self.hash_bits > 48 {
            return Err(Error::InvalidConfig(format!(
                "hash_bits must be between 1 and 48, got {}",
                self.hash_bits
            )));
        }
        if self.per_bucket == 0 {
            return Err(Error::InvalidConfig(
                "per_bucket must be at least 1".to_string(),
            ));
        }
        self.growth.validate()
    }
}

// ============================================================================
// Persisted Config
// ============================================================================

/// Persisted tuning parameters of a database directory.
///
/// Missing fields fall back to their defaults when read, so older config
/// files keep working as fields are added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Maximum room of a single record
    pub doc_max_room: u64,
    /// Base growth increment of collection files
    pub col_file_growth: u64,
    /// Entry slots per hash bucket
    pub per_bucket: u64,
    /// Base growth increment of hash table files
    pub ht_file_growth: u64,
    /// Hash bits of every hash table
    pub hash_bits: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            doc_max_room: 2 * MIB,
            col_file_growth: 32 * MIB,
            per_bucket: 16,
            ht_file_growth: 16 * MIB,
            hash_bits: 16,
        }
    }
}

impl StorageConfig {
    /// Read `data-config.json` from `dir`, writing defaults first if absent.
    ///
    /// Creates `dir` when it does not exist yet.
    pub fn create_or_read(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(CONFIG_FILE_NAME);

        if !path.exists() {
            let config = StorageConfig::default();
            fs::write(&path, serde_json::to_vec_pretty(&config)?)?;
            info!("Wrote default storage config to {}", path.display());
            return Ok(config);
        }

        let bytes = fs::read(&path)?;
        let config: StorageConfig = serde_json::from_slice(&bytes)?;
        config.validate()?;
        debug!("Loaded storage config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Reject zero-valued parameters
    pub fn validate(&self) -> Result<()> {
        let zero = [
            ("doc_max_room", self.doc_max_room),
            ("col_file_growth", self.col_file_growth),
            ("per_bucket", self.per_bucket),
            ("ht_file_growth", self.ht_file_growth),
            ("hash_bits", u64::from(self.hash_bits)),
        ]
        .into_iter()
        .find(|(_, value)| *value == 0);

        match zero {
            Some((name, _)) => Err(Error::InvalidConfig(format!("{} must not be zero", name))),
            None => Ok(()),
        }
    }

    /// Collection options derived from this config
    pub fn collection_options(&self) -> CollectionOptions {
        CollectionOptions {
            growth: GrowthPolicy::new(self.col_file_growth),
            max_room: self.doc_max_room,
        }
    }

    /// Hash table options derived from this config
    pub fn hash_table_options(&self) -> HashTableOptions {
        HashTableOptions {
            hash_bits: self.hash_bits,
            per_bucket: self.per_bucket,
            growth: GrowthPolicy::new(self.ht_file_growth),
        }
    }
}
