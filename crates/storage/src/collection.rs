//! Document collection file.
//!
//! Stores opaque payloads as padded records in a [`MappedFile`]. A record's
//! byte offset is its [`RecordId`]. Records get twice their payload length as
//! room, so later updates that do not outgrow the room happen in place.
//! Deleted records are only flagged; their space is never reused.
//!
//! ## Read Policy
//!
//! [`Collection::read`] and [`Collection::for_all`] hand out the full room,
//! padding included. Callers that want the bare payload use
//! [`trim_padding`](crate::format::trim_padding), which strips trailing
//! spaces (so payloads that themselves end in spaces lose them).
//!
//! ## Locking
//!
//! | Lock          | Held by                          | Protects                    |
//! |---------------|----------------------------------|-----------------------------|
//! | `insert_lock` | insert                           | the append point            |
//! | `update_lock` | read/scan (shared), update/delete (exclusive) | bytes of existing records |
//! | `file`        | everything (shared), growth (exclusive) | the mapping itself   |
//!
//! Lock order is `update_lock`, then `insert_lock`, then `file`. A moving
//! update holds `update_lock` across its insert, so readers never see the
//! record missing from both places.

use crate::format::{
    encode_header, end_of_records, next_record_boundary, parse_header, RecordHeader, INVALID, PADDING,
    RECORD_HEADER_SIZE,
};
use crate::mapped::MappedFile;
use docstore_core::{CollectionOptions, CorruptionCounter, Error, Result};
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Offset of a record, used as its identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(u64);

impl RecordId {
    /// Wrap a raw offset (e.g. one stored in an index)
    pub fn from_raw(offset: u64) -> Self {
        RecordId(offset)
    }

    /// Raw offset
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<RecordId> for u64 {
    fn from(id: RecordId) -> u64 {
        id.0
    }
}

/// Outcome of a full scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Valid records passed to the visitor
    pub visited: u64,
    /// Corrupt regions skipped by resynchronizing
    pub corrupt_regions: u64,
}

impl ScanStats {
    /// Human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "Scan complete: {} records visited, {} corrupt regions skipped",
            self.visited, self.corrupt_regions
        )
    }

    /// True if the scan skipped any data
    pub fn has_issues(&self) -> bool {
        self.corrupt_regions > 0
    }
}

enum ScanStep {
    Record(RecordHeader),
    Resync(usize),
}

/// A collection file of padded records
///
/// # Thread Safety
///
/// All operations take `&self` and may be called from many threads.
/// Inserts serialize against each other; reads run concurrently with
/// each other and with inserts; updates and deletes exclude reads.
pub struct Collection {
    path: PathBuf,
    file: RwLock<MappedFile>,
    insert_lock: Mutex<()>,
    update_lock: RwLock<()>,
    max_room: u64,
    corruption: CorruptionCounter,
}

impl Collection {
    /// Open or create the collection file at `path`.
    ///
    /// The append point is the end of the last record, found by walking
    /// headers from the start of the file. Records that fill their room with
    /// trailing zeros defeat the mapped file's zero-run bisection, so its
    /// estimate is only used when the walk runs into a corrupt header.
    pub fn open(path: impl AsRef<Path>, options: CollectionOptions) -> Result<Self> {
        options.validate()?;
        let path = path.as_ref().to_path_buf();
        let file = MappedFile::open(&path, options.growth)?;

        let estimate = file.used();
        let whole = file.read_at(0, file.capacity() as usize).unwrap_or_default();
        let used = match end_of_records(whole, options.max_room) {
            Ok(end) => end as u64,
            Err((at, fault)) => {
                warn!(
                    "Record walk of {} stopped at {}: {}, taking append point {}",
                    path.display(),
                    at,
                    fault,
                    estimate.max(at as u64)
                );
                estimate.max(at as u64)
            }
        };
        file.set_used(used);

        info!(
            "Opened collection {} ({} of {} bytes used)",
            path.display(),
            file.used(),
            file.capacity()
        );
        Ok(Collection {
            path,
            file: RwLock::new(file),
            insert_lock: Mutex::new(()),
            update_lock: RwLock::new(()),
            max_room: options.max_room,
            corruption: CorruptionCounter::new(),
        })
    }

    fn room_for(&self, payload: &[u8]) -> Result<u64> {
        let requested = (payload.len() as u64).saturating_mul(2).max(1);
        if requested > self.max_room {
            return Err(Error::DocTooLarge {
                max: self.max_room,
                requested,
            });
        }
        Ok(requested)
    }

    /// Insert a payload, returning its id.
    ///
    /// Reserves twice the payload length (at least one byte) as room.
    /// Fails with `DocTooLarge` before touching the file if that exceeds
    /// the maximum room.
    pub fn insert(&self, payload: &[u8]) -> Result<RecordId> {
        let room = self.room_for(payload)?;
        let span = RECORD_HEADER_SIZE as u64 + room;

        let _insert = self.insert_lock.lock();
        let file = {
            let file = self.file.read();
            if file.has_room(span) {
                file
            } else {
                drop(file);
                let mut file = self.file.write();
                file.ensure_capacity(span)?;
                RwLockWriteGuard::downgrade(file)
            }
        };

        let id = file.used();
        // SAFETY: bytes past the append point are only touched by inserts,
        // which `insert_lock` serializes
        unsafe {
            file.write_at(id, &encode_header(true, room))?;
            write_body(&file, id, room, payload)?;
        }
        file.advance(span);
        Ok(RecordId(id))
    }

    fn live_header(&self, file: &MappedFile, id: RecordId) -> Option<RecordHeader> {
        let at = usize::try_from(id.0).ok()?;
        match parse_header(file.used_bytes(), at, self.max_room) {
            Ok(header) if header.valid => Some(header),
            Ok(_) => None,
            Err(fault) => {
                debug!("No record at {} in {}: {}", id, self.path.display(), fault);
                None
            }
        }
    }

    /// Read a record's full room, padding included.
    ///
    /// Returns `None` if `id` is out of range or not a live record.
    pub fn read(&self, id: RecordId) -> Option<Vec<u8>> {
        let _read = self.update_lock.read();
        let file = self.file.read();
        let header = self.live_header(&file, id)?;
        let start = id.0 + RECORD_HEADER_SIZE as u64;
        file.read_at(start, header.room as usize).map(<[u8]>::to_vec)
    }

    /// Replace a record's payload, returning its (possibly new) id.
    ///
    /// Rewrites in place when the payload fits the existing room. Otherwise
    /// the payload is inserted anew and the old record deleted only once the
    /// insert succeeded, so a failed growth leaves the old record intact.
    pub fn update(&self, id: RecordId, payload: &[u8]) -> Result<RecordId> {
        let _write = self.update_lock.write();
        {
            let file = self.file.read();
            let header = self.live_header(&file, id).ok_or(Error::NotFound(id.0))?;

            if payload.len() as u64 <= header.room {
                // SAFETY: exclusive update lock covers every existing record
                unsafe { write_body(&file, id.0, header.room, payload)? };
                return Ok(id);
            }
            debug!("Record {} outgrew its room of {} bytes, moving", id, header.room);
        }

        let moved = self.insert(payload)?;
        let file = self.file.read();
        // SAFETY: as above
        unsafe { file.set_byte(id.0, INVALID)? };
        Ok(moved)
    }

    /// Delete a record. Returns false if there was no live record at `id`.
    pub fn delete(&self, id: RecordId) -> Result<bool> {
        let _write = self.update_lock.write();
        let file = self.file.read();
        if self.live_header(&file, id).is_none() {
            return Ok(false);
        }
        // SAFETY: exclusive update lock covers every existing record
        unsafe { file.set_byte(id.0, INVALID)? };
        Ok(true)
    }

    /// Visit every live record in file order until `visit` returns false.
    ///
    /// Locks are taken per record and released before `visit` runs, so the
    /// visitor may call back into the collection. A corrupt header is
    /// logged, counted, and skipped by resynchronizing on the next offset
    /// where a well-formed header starts.
    pub fn for_all<F>(&self, mut visit: F) -> ScanStats
    where
        F: FnMut(RecordId, &[u8]) -> bool,
    {
        let mut stats = ScanStats::default();
        let mut room = Vec::new();
        let mut at = 0usize;

        loop {
            let step = {
                let _read = self.update_lock.read();
                let file = self.file.read();
                let bytes = file.used_bytes();
                if at >= bytes.len() {
                    break;
                }
                match parse_header(bytes, at, self.max_room) {
                    Ok(header) => {
                        if header.valid {
                            room.clear();
                            room.extend_from_slice(&bytes[at + RECORD_HEADER_SIZE..at + header.span()]);
                        }
                        ScanStep::Record(header)
                    }
                    Err(fault) => {
                        stats.corrupt_regions += 1;
                        let total = self.corruption.record();
                        error!(
                            "Corrupt record at {} in {}: {} ({} corruption events so far)",
                            at,
                            self.path.display(),
                            fault,
                            total
                        );
                        match next_record_boundary(bytes, at + 1, self.max_room) {
                            Some(next) => ScanStep::Resync(next),
                            None => break,
                        }
                    }
                }
            };

            match step {
                ScanStep::Record(header) => {
                    if header.valid {
                        stats.visited += 1;
                        if !visit(RecordId(at as u64), &room) {
                            break;
                        }
                    }
                    at += header.span();
                }
                ScanStep::Resync(next) => {
                    debug!("Resuming scan of {} at {}", self.path.display(), next);
                    at = next;
                }
            }
        }

        if stats.has_issues() {
            info!("{}: {}", self.path.display(), stats.summary());
        }
        stats
    }

    /// Synchronize the file with the device
    pub fn flush(&self) -> Result<()> {
        self.file.read().flush()
    }

    /// Flush and close
    pub fn close(self) -> Result<()> {
        self.file.into_inner().close()
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append point of the backing file
    pub fn used_size(&self) -> u64 {
        self.file.read().used()
    }

    /// Capacity of the backing file
    pub fn capacity(&self) -> u64 {
        self.file.read().capacity()
    }

    /// Maximum room of a single record
    pub fn max_room(&self) -> u64 {
        self.max_room
    }

    /// Corruption events seen by scans of this collection
    pub fn corruption_events(&self) -> u64 {
        self.corruption.count()
    }
}

/// Write payload and padding of the record at `id`.
///
/// # Safety
///
/// Caller holds a lock excluding other access to the record's room.
unsafe fn write_body(file: &MappedFile, id: u64, room: u64, payload: &[u8]) -> Result<()> {
    let start = id + RECORD_HEADER_SIZE as u64;
    file.write_at(start, payload)?;
    file.fill_at(
        start + payload.len() as u64,
        (room - payload.len() as u64) as usize,
        PADDING,
    )
}
