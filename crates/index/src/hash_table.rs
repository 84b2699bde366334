//! Static hash table of `u64` key-value pairs.
//!
//! The table is a multimap persisted as fixed-size buckets in a
//! [`MappedFile`]. The first `2^hash_bits` buckets are chain heads, picked by
//! the low bits of the key. A head that fills up gets a new bucket appended
//! to the file and linked from the tail of its chain. Buckets are never
//! removed; [`HashTable::clear`] is the only way to shrink the file.
//!
//! ## Probing
//!
//! Within a chain, slots are probed in order: bucket by bucket, slot by slot.
//!
//! - `put` writes into the first slot that is not valid, whether it was never
//!   written or removed earlier.
//! - `get` and `remove` skip removed slots and stop at the first slot that was
//!   never written (validity, key and value all zero). Nothing past that slot
//!   has ever been written, because `put` fills slots in probe order.
//! - With a limit, the leftmost matches in probe order win.
//!
//! Removing an entry whose key and value are both zero turns it into a
//! never-written slot, which hides entries after it from `get` until a later
//! `put` fills the slot again. Keys are expected to be hashed values, so
//! `(0, 0)` pairs are rare; the layout is kept as-is for file compatibility.
//!
//! ## Locking
//!
//! | Lock          | Mode                                  | Protects                  |
//! |---------------|---------------------------------------|---------------------------|
//! | `file`        | shared for every operation, exclusive for growth and clear | the mapping |
//! | bucket locks  | shared for get, exclusive for put/remove and linking | one bucket |
//! | `grow_lock`   | exclusive                             | appending buckets         |
//!
//! Lock order: `grow_lock`, then `file`, then bucket locks. A traversal holds
//! at most one bucket lock, releasing it before moving down the chain, so a
//! concurrent reader may or may not see a bucket appended mid-walk.
//!
//! ## Corruption
//!
//! A chain link pointing backwards (a loop) or outside the allocated bucket
//! range ends the chain early, and an entry whose key or value slot cannot be
//! decoded is skipped. Both are logged at error level and counted in
//! [`HashTable::corruption_events`].

use docstore_concurrency::{BucketLockRegistry, LockMode};
use docstore_core::{CorruptionCounter, HashTableOptions, Result};
use docstore_storage::format::{
    decode_entry, decode_link, encode_entry, encode_link, BucketLayout, Entry, VarintError,
    ENTRY_INVALID, ENTRY_SIZE, ENTRY_VALID, SLOT_SIZE,
};
use docstore_storage::MappedFile;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

enum Probe {
    Continue,
    Stop,
}

/// A chained, fixed-geometry hash table file
///
/// # Thread Safety
///
/// All operations except `close` take `&self`. Puts and removes on
/// different buckets run in parallel; gets on the same bucket share it.
pub struct HashTable {
    path: PathBuf,
    file: RwLock<MappedFile>,
    layout: BucketLayout,
    num_buckets: AtomicU64,
    grow_lock: Mutex<()>,
    locks: Arc<BucketLockRegistry>,
    corruption: CorruptionCounter,
}

impl HashTable {
    /// Open or create the hash table file at `path`
    pub fn open(path: impl AsRef<Path>, options: HashTableOptions) -> Result<Self> {
        Self::open_with_registry(path, options, Arc::new(BucketLockRegistry::new()))
    }

    /// Open with a caller-supplied lock registry
    pub fn open_with_registry(
        path: impl AsRef<Path>,
        options: HashTableOptions,
        locks: Arc<BucketLockRegistry>,
    ) -> Result<Self> {
        options.validate()?;
        let path = path.as_ref().to_path_buf();
        let layout = BucketLayout::new(options.hash_bits, options.per_bucket);
        let bucket_size = layout.bucket_size();
        let initial = layout.initial_buckets();

        let mut file = MappedFile::open(&path, options.growth)?;
        file.set_used(0);
        file.ensure_capacity(initial * bucket_size)?;

        let table = HashTable {
            path,
            file: RwLock::new(file),
            layout,
            num_buckets: AtomicU64::new(initial),
            grow_lock: Mutex::new(()),
            locks,
            corruption: CorruptionCounter::new(),
        };

        // Every bucket that fits in the file is a candidate; the longest
        // chain decides how many are actually in use
        let num_buckets = {
            let file = table.file.read();
            let upper = file.capacity() / bucket_size;
            (0..initial)
                .map(|head| table.last_bucket(&file, head, upper) + 1)
                .fold(initial, u64::max)
        };
        table.num_buckets.store(num_buckets, Ordering::Release);
        table.file.read().set_used(num_buckets * bucket_size);

        info!(
            "{} has {} initial buckets, {} buckets, and {} bytes out of {} bytes in use",
            table.path.display(),
            initial,
            num_buckets,
            table.used_size(),
            table.capacity()
        );
        Ok(table)
    }

    /// Head bucket of `key`
    #[inline]
    pub fn hash_key(&self, key: u64) -> u64 {
        self.layout.hash_key(key)
    }

    /// Buckets allocated, heads included
    pub fn num_buckets(&self) -> u64 {
        self.num_buckets.load(Ordering::Acquire)
    }

    /// Number of head buckets
    pub fn initial_buckets(&self) -> u64 {
        self.layout.initial_buckets()
    }

    /// Bucket geometry
    pub fn layout(&self) -> BucketLayout {
        self.layout
    }

    /// Lock registry shared by this table
    pub fn registry(&self) -> &Arc<BucketLockRegistry> {
        &self.locks
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes occupied by allocated buckets
    pub fn used_size(&self) -> u64 {
        self.file.read().used()
    }

    /// Capacity of the backing file
    pub fn capacity(&self) -> u64 {
        self.file.read().capacity()
    }

    /// Corruption events seen so far
    pub fn corruption_events(&self) -> u64 {
        self.corruption.count()
    }

    // ========================================================================
    // Chains
    // ========================================================================

    /// Bucket linked from `bucket`, or `None` at the end of the chain.
    ///
    /// A link that points backwards or outside `initial..num_buckets` is
    /// treated as the end of the chain and counted as corruption.
    fn next_bucket(&self, file: &MappedFile, bucket: u64, num_buckets: u64) -> Option<u64> {
        if bucket >= num_buckets {
            return None;
        }
        let offset = self.layout.bucket_offset(bucket);
        let next = match file.read_at(offset, SLOT_SIZE).map(decode_link)? {
            Ok(next) => next,
            Err(fault) => {
                let total = self.corruption.record();
                error!(
                    "Unreadable bucket link in {} at bucket no.{}, address {}: {} ({} corruption events so far)",
                    self.path.display(),
                    bucket,
                    offset,
                    fault,
                    total
                );
                return None;
            }
        };

        if next == 0 {
            None
        } else if next <= bucket {
            let total = self.corruption.record();
            error!(
                "Bucket loop in {} at bucket no.{}, address {} ({} corruption events so far)",
                self.path.display(),
                bucket,
                offset,
                total
            );
            None
        } else if next >= num_buckets || next < self.layout.initial_buckets() {
            let total = self.corruption.record();
            error!(
                "Bad bucket reference in {}: {} is out of range {} - {} ({} corruption events so far)",
                self.path.display(),
                next,
                self.layout.initial_buckets(),
                num_buckets,
                total
            );
            None
        } else {
            Some(next)
        }
    }

    /// Last bucket of the chain starting at `bucket`
    fn last_bucket(&self, file: &MappedFile, bucket: u64, num_buckets: u64) -> u64 {
        let mut current = bucket;
        while let Some(next) = self.next_bucket(file, current, num_buckets) {
            current = next;
        }
        current
    }

    /// Append a bucket to the chain of `head`
    fn grow(&self, head: u64) -> Result<()> {
        let _grow = self.grow_lock.lock();
        let bucket_size = self.layout.bucket_size();

        let needs_room = !self.file.read().has_room(bucket_size);
        if needs_room {
            self.file.write().ensure_capacity(bucket_size)?;
        }

        let file = self.file.read();
        let new_bucket = self.num_buckets();
        let tail = self.last_bucket(&file, head, new_bucket);

        // Space past the append point may hold buckets from an abandoned chain
        // SAFETY: no link points at `new_bucket` yet, and `grow_lock` keeps
        // other growers away from it
        unsafe {
            file.fill_at(self.layout.bucket_offset(new_bucket), bucket_size as usize, 0)?;
        }
        file.set_used((new_bucket + 1) * bucket_size);
        self.num_buckets.store(new_bucket + 1, Ordering::Release);

        let _tail = self.locks.exclusive(tail);
        // SAFETY: link bytes of `tail` are covered by its exclusive lock
        unsafe {
            file.write_at(self.layout.bucket_offset(tail), &encode_link(new_bucket))?;
        }
        debug!(
            "{}: linked bucket {} after bucket {} (head {})",
            self.path.display(),
            new_bucket,
            tail,
            head
        );
        Ok(())
    }

    fn report_bad_entry(&self, bucket: u64, slot: u64, fault: VarintError) {
        let total = self.corruption.record();
        error!(
            "Unreadable entry in {} at bucket no.{}, slot {}: {} ({} corruption events so far)",
            self.path.display(),
            bucket,
            slot,
            fault,
            total
        );
    }

    /// Walk the chain of `head` in probe order, stopping at the first
    /// never-written slot or when `visit` says so.
    ///
    /// `visit` receives each readable entry and its file offset while the
    /// entry's bucket is locked in `mode`.
    fn probe_chain<F>(&self, file: &MappedFile, head: u64, mode: LockMode, mut visit: F) -> Result<()>
    where
        F: FnMut(u64, &Entry) -> Result<Probe>,
    {
        let mut bucket = head;
        loop {
            let guard = self.locks.lock(bucket, mode);
            for slot in 0..self.layout.per_bucket() {
                let offset = self.layout.entry_offset(bucket, slot);
                let entry = match file.read_at(offset, ENTRY_SIZE as usize).map(decode_entry) {
                    Some(Ok(entry)) => entry,
                    Some(Err(fault)) => {
                        self.report_bad_entry(bucket, slot, fault);
                        continue;
                    }
                    None => return Ok(()),
                };
                if entry.is_unused() {
                    return Ok(());
                }
                if let Probe::Stop = visit(offset, &entry)? {
                    return Ok(());
                }
            }
            let next = self.next_bucket(file, bucket, self.num_buckets());
            drop(guard);
            match next {
                Some(next) => bucket = next,
                None => return Ok(()),
            }
        }
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Add `(key, value)`. Duplicates are kept.
    pub fn put(&self, key: u64, value: u64) -> Result<()> {
        let head = self.hash_key(key);
        let entry = encode_entry(key, value);

        loop {
            {
                let file = self.file.read();
                let mut bucket = head;
                loop {
                    let guard = self.locks.exclusive(bucket);
                    for slot in 0..self.layout.per_bucket() {
                        let offset = self.layout.entry_offset(bucket, slot);
                        if file.byte_at(offset) != Some(ENTRY_VALID) {
                            // SAFETY: the slot is inside `bucket`, locked exclusively
                            unsafe { file.write_at(offset, &entry)? };
                            return Ok(());
                        }
                    }
                    let next = self.next_bucket(&file, bucket, self.num_buckets());
                    drop(guard);
                    match next {
                        Some(next) => bucket = next,
                        None => break,
                    }
                }
            }
            self.grow(head)?;
        }
    }

    /// Entries with `key` for which `filter` holds, leftmost first.
    ///
    /// Returns at most `limit` pairs; `limit == 0` means no limit.
    pub fn get<F>(&self, key: u64, limit: usize, mut filter: F) -> Result<Vec<(u64, u64)>>
    where
        F: FnMut(u64, u64) -> bool,
    {
        let mut found = Vec::new();
        let file = self.file.read();
        self.probe_chain(&file, self.hash_key(key), LockMode::Shared, |_, entry| {
            if entry.valid && entry.key == key && filter(entry.key, entry.value) {
                found.push((entry.key, entry.value));
                if found.len() == limit {
                    return Ok(Probe::Stop);
                }
            }
            Ok(Probe::Continue)
        })?;
        Ok(found)
    }

    /// Values stored under `key`, unfiltered
    pub fn values(&self, key: u64) -> Result<Vec<u64>> {
        Ok(self
            .get(key, 0, |_, _| true)?
            .into_iter()
            .map(|(_, value)| value)
            .collect())
    }

    /// Remove entries with `key` for which `filter` holds, leftmost first.
    ///
    /// Removes at most `limit` entries (`0` means no limit) and returns how
    /// many were removed.
    pub fn remove<F>(&self, key: u64, limit: usize, mut filter: F) -> Result<usize>
    where
        F: FnMut(u64, u64) -> bool,
    {
        let mut removed = 0;
        let file = self.file.read();
        self.probe_chain(&file, self.hash_key(key), LockMode::Exclusive, |offset, entry| {
            if entry.valid && entry.key == key && filter(entry.key, entry.value) {
                // SAFETY: the entry's bucket is locked exclusively
                unsafe { file.set_byte(offset, ENTRY_INVALID)? };
                removed += 1;
                if removed == limit {
                    return Ok(Probe::Stop);
                }
            }
            Ok(Probe::Continue)
        })?;
        Ok(removed)
    }

    fn collect_heads(&self, heads: std::ops::Range<u64>, limit: usize) -> Result<Vec<(u64, u64)>> {
        let mut found = Vec::new();
        let file = self.file.read();
        for head in heads {
            self.probe_chain(&file, head, LockMode::Shared, |_, entry| {
                if entry.valid {
                    found.push((entry.key, entry.value));
                    if found.len() == limit {
                        return Ok(Probe::Stop);
                    }
                }
                Ok(Probe::Continue)
            })?;
            if limit != 0 && found.len() >= limit {
                break;
            }
        }
        Ok(found)
    }

    /// Every valid entry, chain by chain from head 0.
    ///
    /// Returns at most `limit` pairs; `limit == 0` means no limit.
    pub fn get_all(&self, limit: usize) -> Result<Vec<(u64, u64)>> {
        self.collect_heads(0..self.initial_buckets(), limit)
    }

    /// Head range `[start, end)` of partition `part` out of `total`.
    ///
    /// Heads are split into `total` contiguous ranges whose sizes differ by
    /// at most one; the first `initial_buckets % total` ranges are larger.
    /// An invalid partition yields an empty range.
    pub fn partition_range(&self, part: u64, total: u64) -> (u64, u64) {
        if total == 0 || part >= total {
            return (0, 0);
        }
        let initial = self.initial_buckets();
        let per_part = initial / total;
        let left_over = initial % total;
        let start = part * per_part + part.min(left_over);
        let end = start + per_part + u64::from(part < left_over);
        (start, end)
    }

    /// Every valid entry of the chains whose heads fall in partition `part`
    pub fn get_partition(&self, part: u64, total: u64) -> Result<Vec<(u64, u64)>> {
        let (start, end) = self.partition_range(part, total);
        self.collect_heads(start..end, 0)
    }

    /// Drop every entry and chained bucket, keeping only empty heads
    pub fn clear(&self) -> Result<()> {
        let _grow = self.grow_lock.lock();
        let mut file = self.file.write();
        let _all = self.locks.lock_all();

        let initial = self.layout.initial_buckets();
        let heads_size = initial * self.layout.bucket_size();
        file.clear()?;
        file.ensure_capacity(heads_size)?;
        file.set_used(heads_size);
        self.num_buckets.store(initial, Ordering::Release);

        info!("Cleared {}, {} head buckets remain", self.path.display(), initial);
        Ok(())
    }

    /// Synchronize the file with the device
    pub fn flush(&self) -> Result<()> {
        self.file.read().flush()
    }

    /// Flush and close
    pub fn close(self) -> Result<()> {
        self.file.into_inner().close()
    }
}
