//! Growable memory-mapped file.
//!
//! A [`MappedFile`] owns a file handle, its mapping and two sizes:
//! `capacity` (mapped length, always equal to the file length) and `used`
//! (the append point, everything past it is zero-filled free space).
//!
//! ## Design
//!
//! - Growth extends the file with `set_len` (zero-filled), maps the new length,
//!   and only then replaces the old mapping. A failure at any step leaves the
//!   previous mapping installed and the structure usable.
//! - Growth takes `&mut self`. Structures wrap the file in a
//!   `parking_lot::RwLock` and take the write side to grow, so no reader can
//!   hold a reference into a mapping that is being replaced.
//! - Reads are range-checked and return borrowed slices. Writes go through raw
//!   pointers from `&self`, so several threads can write disjoint ranges under
//!   a shared lock. Those writers are `unsafe`: the caller must hold whatever
//!   lock covers the range being written.
//!
//! ## Used-Size Recovery
//!
//! On reopen the append point is not stored anywhere. It is located by
//! bisection for the first offset followed by [`BOUNDARY_WINDOW`] zero bytes.
//! This assumes live data never contains a zero run that long and never ends
//! in a zero byte. Neither holds in general, so collections walk their record
//! headers and hash files their bucket chains, and use this estimate only as
//! a fallback.

use docstore_core::{Error, GrowthPolicy, Result};
use memmap2::{MmapOptions, MmapRaw};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Zero bytes that mark the start of free space when recovering `used`
pub const BOUNDARY_WINDOW: usize = 128;

/// A growable, memory-mapped backing file
///
/// # Thread Safety
///
/// `MappedFile` is `Send + Sync`. Reads through `&self` are safe as long as
/// no overlapping write happens concurrently; the owning structure enforces
/// that with its own locks. Growth and clearing need `&mut self`.
#[derive(Debug)]
pub struct MappedFile {
    path: PathBuf,
    file: File,
    map: MmapRaw,
    used: AtomicU64,
    capacity: u64,
    growth: GrowthPolicy,
}

impl MappedFile {
    /// Open `path`, creating it if missing.
    ///
    /// An empty file is grown by one increment. A non-empty file is mapped
    /// as-is and its append point recovered by bisection.
    pub fn open(path: impl AsRef<Path>, growth: GrowthPolicy) -> Result<Self> {
        growth.validate()?;
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let mut len = file.metadata()?.len();
        if len == 0 {
            len = growth.increment_for(0);
            file.set_len(len)?;
            debug!("Created {} with {} bytes", path.display(), len);
        }

        let map = map_file(&file, len)?;
        let mut mapped = MappedFile {
            path,
            file,
            map,
            used: AtomicU64::new(0),
            capacity: len,
            growth,
        };
        let used = locate_used(mapped.bytes(0, len as usize));
        mapped.used = AtomicU64::new(used);

        info!(
            "{} has {} bytes out of {} bytes in use",
            mapped.path.display(),
            used,
            len
        );
        Ok(mapped)
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append point: bytes before it hold live data
    #[inline]
    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    /// Mapped length, equal to the file length
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Growth policy in effect
    pub fn growth(&self) -> GrowthPolicy {
        self.growth
    }

    /// True if `more` bytes fit past the append point without growing
    #[inline]
    pub fn has_room(&self, more: u64) -> bool {
        self.used().saturating_add(more) <= self.capacity
    }

    /// Move the append point forward by `n`, returning its previous value.
    ///
    /// Callers serialize appends themselves and check `has_room` first.
    pub fn advance(&self, n: u64) -> u64 {
        self.used.fetch_add(n, Ordering::AcqRel)
    }

    /// Set the append point
    pub fn set_used(&self, used: u64) {
        self.used.store(used.min(self.capacity), Ordering::Release);
    }

    /// Grow until `more` bytes fit past the append point.
    ///
    /// Grows one tier increment at a time. On error the file keeps its
    /// previous length and mapping.
    pub fn ensure_capacity(&mut self, more: u64) -> Result<()> {
        let needed = self
            .used()
            .checked_add(more)
            .ok_or_else(|| Error::Io(io::Error::new(io::ErrorKind::InvalidInput, "size overflow")))?;

        while needed > self.capacity {
            let step = self.growth.increment_for(self.capacity);
            let new_len = self.capacity.saturating_add(step);
            self.remap(new_len)?;
            info!("{} has grown {} bytes to {}", self.path.display(), step, new_len);
        }
        Ok(())
    }

    fn remap(&mut self, new_len: u64) -> Result<()> {
        let old_len = self.capacity;
        self.file.set_len(new_len)?;
        match map_file(&self.file, new_len) {
            Ok(map) => {
                self.map = map;
                self.capacity = new_len;
                Ok(())
            }
            Err(e) => {
                // Old mapping is still installed; put the length back to match it
                let _ = self.file.set_len(old_len);
                Err(e)
            }
        }
    }

    /// Borrow `len` bytes at `offset`, or `None` if out of the mapped range
    pub fn read_at(&self, offset: u64, len: usize) -> Option<&[u8]> {
        let end = offset.checked_add(len as u64)?;
        if end > self.capacity {
            return None;
        }
        Some(self.bytes(offset as usize, len))
    }

    /// Byte at `offset`, or `None` if out of range
    #[inline]
    pub fn byte_at(&self, offset: u64) -> Option<u8> {
        self.read_at(offset, 1).map(|b| b[0])
    }

    /// The live region `[0, used)`
    pub fn used_bytes(&self) -> &[u8] {
        self.bytes(0, self.used() as usize)
    }

    fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        if len == 0 {
            return &[];
        }
        // SAFETY: callers checked `offset + len <= capacity == map.len()`
        unsafe { std::slice::from_raw_parts(self.map.as_ptr().add(offset), len) }
    }

    fn check_range(&self, offset: u64, len: usize) -> Result<usize> {
        match offset.checked_add(len as u64) {
            Some(end) if end <= self.capacity => Ok(offset as usize),
            _ => Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "write of {} bytes at {} exceeds capacity {} of {}",
                    len,
                    offset,
                    self.capacity,
                    self.path.display()
                ),
            ))),
        }
    }

    /// Copy `data` into the mapping at `offset`.
    ///
    /// # Safety
    ///
    /// The caller must hold the lock that covers `[offset, offset + data.len())`
    /// so no other thread reads or writes that range concurrently.
    pub unsafe fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        let start = self.check_range(offset, data.len())?;
        ptr::copy_nonoverlapping(data.as_ptr(), self.map.as_mut_ptr().add(start), data.len());
        Ok(())
    }

    /// Fill `len` bytes at `offset` with `byte`.
    ///
    /// # Safety
    ///
    /// Same contract as [`write_at`](Self::write_at).
    pub unsafe fn fill_at(&self, offset: u64, len: usize, byte: u8) -> Result<()> {
        let start = self.check_range(offset, len)?;
        ptr::write_bytes(self.map.as_mut_ptr().add(start), byte, len);
        Ok(())
    }

    /// Overwrite one byte.
    ///
    /// # Safety
    ///
    /// Same contract as [`write_at`](Self::write_at).
    pub unsafe fn set_byte(&self, offset: u64, byte: u8) -> Result<()> {
        self.write_at(offset, &[byte])
    }

    /// Synchronize the mapping with the device
    pub fn flush(&self) -> Result<()> {
        self.map.flush()?;
        Ok(())
    }

    /// Discard all data: truncate to zero, then grow by one increment.
    ///
    /// The old mapping stays installed until the new one exists. After each
    /// step `capacity` only covers the part of it the file still backs, so a
    /// failure leaves an empty but consistent file.
    pub fn clear(&mut self) -> Result<()> {
        let len = self.growth.increment_for(0);
        let mapped = self.capacity;

        self.file.set_len(0)?;
        self.capacity = 0;
        self.used.store(0, Ordering::Release);

        self.file.set_len(len)?;
        self.capacity = len.min(mapped);

        self.map = map_file(&self.file, len)?;
        self.capacity = len;
        info!("Cleared {}, now {} bytes", self.path.display(), len);
        Ok(())
    }

    /// Flush, unmap and close
    pub fn close(self) -> Result<()> {
        self.flush()?;
        debug!("Closed {}", self.path.display());
        Ok(())
    }
}

fn map_file(file: &File, len: u64) -> Result<MmapRaw> {
    let len = usize::try_from(len).map_err(|_| {
        Error::Io(io::Error::new(io::ErrorKind::InvalidInput, "file too large to map"))
    })?;
    Ok(MmapOptions::new().len(len).map_raw(file)?)
}

/// First offset `p` such that the window after `p` is all zero.
///
/// Assumes the predicate is monotonic: false inside live data, true in the
/// zero-filled tail.
fn locate_used(bytes: &[u8]) -> u64 {
    let zero_from = |p: usize| {
        let end = (p + BOUNDARY_WINDOW).min(bytes.len());
        bytes[p..end].iter().all(|&b| b == 0)
    };

    let (mut lo, mut hi) = (0usize, bytes.len());
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if zero_from(mid) {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    lo as u64
}
