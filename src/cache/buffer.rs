/*!
 * Buffers
 *
 * A buffer slot holds one cached disk block. Slot metadata is guarded by the
 * lock of the bucket the slot currently lives in; the fields the global LRU
 * scan reads without that lock are atomics and are re-checked under it. The
 * payload is guarded by the slot's sleeplock.
 */

use super::disk::{BlockDevice, Transfer};
use super::BufferCache;
use crate::core::halt::halt;
use crate::core::limits::{BSIZE, NO_DEVICE};
use crate::core::sync::Sleeplock;
use crate::core::types::{BlockNo, DeviceId, Tick};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Contents of one disk block
pub type BlockData = [u8; BSIZE];

/// Identity of a cached block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockKey {
    pub dev: DeviceId,
    pub blockno: BlockNo,
}

impl BlockKey {
    pub const fn new(dev: DeviceId, blockno: BlockNo) -> Self {
        Self { dev, blockno }
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dev, self.blockno)
    }
}

/// Index of a buffer slot in the cache's fixed pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufId(pub(super) usize);

impl BufId {
    pub const fn index(self) -> usize {
        self.0
    }
}

pub(super) struct BufSlot {
    dev: AtomicU32,
    blockno: AtomicU32,
    /// Holders plus pins
    refcnt: AtomicU32,
    /// Bucket whose list the slot is on
    bucket: AtomicUsize,
    /// Payload matches the disk
    valid: AtomicBool,
    last_used: AtomicU64,
    pub(super) content: Sleeplock<BlockData>,
}

impl BufSlot {
    /// Unkeyed slot parked in `bucket`
    pub fn new(blockno: BlockNo, bucket: usize) -> Self {
        Self {
            dev: AtomicU32::new(NO_DEVICE),
            blockno: AtomicU32::new(blockno),
            refcnt: AtomicU32::new(0),
            bucket: AtomicUsize::new(bucket),
            valid: AtomicBool::new(false),
            last_used: AtomicU64::new(0),
            content: Sleeplock::new("buffer", [0; BSIZE]),
        }
    }

    pub fn key(&self) -> BlockKey {
        BlockKey::new(
            self.dev.load(Ordering::Relaxed),
            self.blockno.load(Ordering::Relaxed),
        )
    }

    pub fn refcnt(&self) -> u32 {
        self.refcnt.load(Ordering::Acquire)
    }

    pub fn bucket(&self) -> usize {
        self.bucket.load(Ordering::Acquire)
    }

    pub fn last_used(&self) -> Tick {
        self.last_used.load(Ordering::Relaxed)
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Caller holds the bucket lock
    pub fn acquire_ref(&self) {
        self.refcnt.fetch_add(1, Ordering::AcqRel);
    }

    /// Caller holds the bucket lock; `None` if the count was already zero
    pub fn release_ref(&self) -> Option<u32> {
        let count = self.refcnt();
        let remaining = count.checked_sub(1)?;
        self.refcnt.store(remaining, Ordering::Release);
        Some(remaining)
    }

    /// Bind an unreferenced slot to `key` with one reference.
    /// Caller holds the lock of the bucket the slot is on.
    pub fn rekey(&self, key: BlockKey) {
        self.dev.store(key.dev, Ordering::Relaxed);
        self.blockno.store(key.blockno, Ordering::Relaxed);
        self.valid.store(false, Ordering::Release);
        self.refcnt.store(1, Ordering::Release);
    }

    /// Caller holds the source and destination bucket locks
    pub fn move_to(&self, bucket: usize) {
        self.bucket.store(bucket, Ordering::Release);
    }

    /// Caller holds the content lock
    pub fn mark_valid(&self) {
        self.valid.store(true, Ordering::Release);
    }

    pub fn touch(&self, now: Tick) {
        self.last_used.store(now, Ordering::Relaxed);
    }
}

/// A buffer whose content lock is held by the calling thread.
///
/// Obtained from [`BufferCache::get`] or [`BufferCache::read`]. Releasing it,
/// explicitly or by dropping it, gives up the content lock and the reference.
/// Every payload access re-checks that the calling thread is the holder.
pub struct BufGuard<'a, D: BlockDevice> {
    pub(super) cache: &'a BufferCache<D>,
    pub(super) id: BufId,
}

impl<'a, D: BlockDevice> BufGuard<'a, D> {
    pub fn id(&self) -> BufId {
        self.id
    }

    pub fn key(&self) -> BlockKey {
        self.slot().key()
    }

    pub fn blockno(&self) -> BlockNo {
        self.key().blockno
    }

    pub fn is_valid(&self) -> bool {
        self.slot().is_valid()
    }

    pub fn data(&self) -> &BlockData {
        self.assert_held("data");
        // Safety: this thread holds the content lock until `self` is consumed
        unsafe { &*self.slot().content.data_ptr() }
    }

    pub fn data_mut(&mut self) -> &mut BlockData {
        self.assert_held("data");
        // Safety: this thread holds the content lock until `self` is consumed
        unsafe { &mut *self.slot().content.data_ptr() }
    }

    /// Write the payload through to disk
    pub fn write(&mut self) {
        let cache = self.cache;
        cache.write(self)
    }

    /// Keep the block cached after release (see [`BufferCache::pin`])
    pub fn pin(&self) {
        self.cache.pin(self)
    }

    pub fn release(self) {
        let this = ManuallyDrop::new(self);
        this.cache.release_slot(this.id);
    }

    pub(super) fn slot(&self) -> &BufSlot {
        &self.cache.slots[self.id.0]
    }

    pub(super) fn assert_held(&self, subsystem: &str) {
        if !self.slot().content.holding() {
            halt(subsystem, format_args!("buffer {} not locked by caller", self.key()));
        }
    }

    /// Mark valid after a fill from disk; caller holds the content lock
    pub(super) fn fill_from_disk(&mut self) {
        let (cache, key) = (self.cache, self.key());
        cache.disk.transfer(key, self.data_mut(), Transfer::Read);
        self.slot().mark_valid();
    }
}

impl<D: BlockDevice> Drop for BufGuard<'_, D> {
    fn drop(&mut self) {
        if std::thread::panicking() && !self.slot().content.holding() {
            return;
        }
        self.cache.release_slot(self.id);
    }
}

impl<D: BlockDevice> fmt::Debug for BufGuard<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufGuard")
            .field("id", &self.id)
            .field("key", &self.key())
            .finish()
    }
}
