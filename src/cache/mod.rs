/*!
 * Buffer Cache
 *
 * A fixed pool of block buffers shared by every CPU, sharded into hash
 * buckets by block number so lookups of unrelated blocks never contend.
 *
 * ## Lookup (`get`)
 *
 * - Lock the target bucket and scan it; a hit takes a reference
 * - A miss recycles the least recently used idle buffer of the same bucket
 * - With none left there, the whole pool is scanned for the least recently
 *   used idle buffer, which is claimed under its own bucket's lock and
 *   migrated into the target bucket
 *
 * The target bucket stays locked from the scan until the new binding is
 * linked in, so two threads can never bind the same block to two buffers.
 * The second lock is only ever tried, never waited on; a busy victim bucket
 * drops everything and starts the lookup over.
 *
 * ## Content
 *
 * Each buffer's payload sits behind a sleeplock, taken after every bucket
 * lock is released. The returned [`BufGuard`] holds it until release.
 */

mod bucket;
mod buffer;
pub mod disk;
pub mod types;

pub use buffer::{BlockData, BlockKey, BufGuard, BufId};
pub use disk::{BlockDevice, RamDisk, Transfer};
pub use types::CacheStats;

use crate::core::config::CacheConfig;
use crate::core::errors::ConfigError;
use crate::core::halt::halt;
use crate::core::limits::NO_DEVICE;
use crate::core::sync::Spinlock;
use crate::core::types::{BlockNo, DeviceId, Tick};
use bucket::{Bucket, Links};
use buffer::BufSlot;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use tracing::{debug, info, instrument, trace};

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    recycled: AtomicU64,
    stolen: AtomicU64,
    retries: AtomicU64,
    disk_reads: AtomicU64,
    disk_writes: AtomicU64,
}

/// Outcome of one locked pass over the buckets
enum Lookup {
    Hit(usize),
    Recycled(usize),
    Stolen(usize),
    /// The victim's bucket was busy or the victim was taken first
    Retry,
}

/// Bucketed LRU buffer cache in front of a block device
pub struct BufferCache<D: BlockDevice> {
    disk: D,
    slots: Box<[BufSlot]>,
    links: Links,
    buckets: Box<[Spinlock<Bucket>]>,
    ticks: AtomicU64,
    counters: Counters,
}

impl<D: BlockDevice> BufferCache<D> {
    /// Build the pool with every buffer unbound. Buffer `i` starts in bucket
    /// `(i + 1) % nbucket`.
    #[instrument(skip_all, fields(nbuf = config.nbuf, nbucket = config.nbucket))]
    pub fn new(config: &CacheConfig, disk: D) -> Result<Self, ConfigError> {
        config.validate()?;

        let links = Links::new(config.nbuf, config.nbucket);
        let mut buckets: Box<[Spinlock<Bucket>]> = (0..config.nbucket)
            .map(|index| Spinlock::new("bcache.bucket", Bucket::new(&links, index)))
            .collect();

        let slots: Box<[BufSlot]> = (0..config.nbuf)
            .map(|index| {
                let home = (index + 1) % config.nbucket;
                buckets[home].get_mut().push_front(&links, index);
                BufSlot::new(home as BlockNo, home)
            })
            .collect();

        info!(
            buffers = config.nbuf,
            buckets = config.nbucket,
            "Buffer cache initialized"
        );
        Ok(Self {
            disk,
            slots,
            links,
            buckets,
            ticks: AtomicU64::new(0),
            counters: Counters::default(),
        })
    }

    /// Return the buffer bound to `(dev, blockno)` with its content locked,
    /// binding an idle buffer if the block is not cached. The payload is not
    /// read from disk; see [`BufferCache::read`].
    ///
    /// May suspend the caller on the content lock. Halts when every buffer is
    /// referenced.
    pub fn get(&self, dev: DeviceId, blockno: BlockNo) -> BufGuard<'_, D> {
        if dev == NO_DEVICE {
            halt("bget", format_args!("device {dev} is reserved for unbound buffers"));
        }
        let key = BlockKey::new(dev, blockno);

        let index = loop {
            match self.lookup(key) {
                Lookup::Hit(index) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    trace!(%key, buf = index, "bget: hit");
                    break index;
                }
                Lookup::Recycled(index) => {
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    self.counters.recycled.fetch_add(1, Ordering::Relaxed);
                    trace!(%key, buf = index, "bget: recycled in bucket");
                    break index;
                }
                Lookup::Stolen(index) => {
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    self.counters.stolen.fetch_add(1, Ordering::Relaxed);
                    debug!(%key, buf = index, "bget: migrated from another bucket");
                    break index;
                }
                Lookup::Retry => {
                    self.counters.retries.fetch_add(1, Ordering::Relaxed);
                    thread::yield_now();
                }
            }
        };

        self.claim(index)
    }

    fn lookup(&self, key: BlockKey) -> Lookup {
        let target = self.bucket_of(key.blockno);
        let mut bucket = self.buckets[target].lock();

        if let Some(index) = bucket
            .iter(&self.links)
            .find(|&index| self.slots[index].key() == key)
        {
            self.slots[index].acquire_ref();
            return Lookup::Hit(index);
        }

        if let Some(index) = self.least_recent(bucket.iter(&self.links)) {
            self.slots[index].rekey(key);
            return Lookup::Recycled(index);
        }

        // Every buffer in the target bucket is referenced and stays so while
        // we hold its lock, so only other buckets are candidates.
        let candidates = (0..self.slots.len()).filter(|&index| self.slots[index].bucket() != target);
        let Some(index) = self.least_recent(candidates) else {
            halt("bget", "no buffers");
        };

        let slot = &self.slots[index];
        let home = slot.bucket();
        if home == target {
            return Lookup::Retry;
        }
        let Some(mut victim) = self.buckets[home].try_lock() else {
            return Lookup::Retry;
        };
        if slot.refcnt() != 0 || slot.bucket() != home {
            return Lookup::Retry;
        }

        victim.unlink(&self.links, index);
        slot.rekey(key);
        slot.move_to(target);
        bucket.push_front(&self.links, index);
        Lookup::Stolen(index)
    }

    /// Least recently used unreferenced slot; ties go to the lowest index
    fn least_recent(&self, candidates: impl Iterator<Item = usize>) -> Option<usize> {
        candidates
            .filter(|&index| self.slots[index].refcnt() == 0)
            .min_by_key(|&index| (self.slots[index].last_used(), index))
    }

    /// Take the content lock of a referenced slot; no spinlock may be held
    fn claim(&self, index: usize) -> BufGuard<'_, D> {
        let slot = &self.slots[index];
        slot.content.lock_unguarded();
        slot.touch(self.tick());
        BufGuard {
            cache: self,
            id: BufId(index),
        }
    }

    /// Return a locked buffer holding the current contents of the block
    pub fn read(&self, dev: DeviceId, blockno: BlockNo) -> BufGuard<'_, D> {
        let mut buf = self.get(dev, blockno);
        if !buf.is_valid() {
            buf.fill_from_disk();
            self.counters.disk_reads.fetch_add(1, Ordering::Relaxed);
        }
        buf
    }

    /// Write a buffer's payload to disk. Halts unless the caller holds it.
    pub fn write(&self, buf: &mut BufGuard<'_, D>) {
        if !std::ptr::eq(buf.cache, self) {
            halt("bwrite", "buffer belongs to another cache");
        }
        buf.assert_held("bwrite");

        let key = buf.key();
        self.disk.transfer(key, buf.data_mut(), Transfer::Write);
        self.counters.disk_writes.fetch_add(1, Ordering::Relaxed);
        trace!(%key, "bwrite");
    }

    /// Give up a buffer: unlock its content and drop the caller's reference.
    /// Equivalent to dropping the guard.
    pub fn release(&self, buf: BufGuard<'_, D>) {
        buf.release()
    }

    fn release_slot(&self, id: BufId) {
        let slot = &self.slots[id.0];
        if !slot.content.holding() {
            halt("brelse", format_args!("buffer {} not locked by caller", slot.key()));
        }
        slot.content.unlock();

        // A referenced buffer cannot migrate, so its bucket is stable here
        let _bucket = self.buckets[slot.bucket()].lock();
        if slot.release_ref().is_none() {
            halt("brelse", format_args!("buffer {} has no references", slot.key()));
        }
    }

    /// Take an extra reference so the block stays cached after the holder
    /// releases it. Halts unless the caller holds the buffer.
    pub fn pin(&self, buf: &BufGuard<'_, D>) {
        buf.assert_held("bpin");
        let slot = buf.slot();
        let _bucket = self.buckets[slot.bucket()].lock();
        slot.acquire_ref();
        trace!(key = %slot.key(), "bpin");
    }

    /// Drop a reference taken by [`BufferCache::pin`]. Halts if the buffer has
    /// no references left.
    pub fn unpin(&self, id: BufId) {
        let slot = &self.slots[id.0];
        let home = slot.bucket();
        let _bucket = self.buckets[home].lock();
        if slot.bucket() != home || slot.release_ref().is_none() {
            halt("bunpin", format_args!("buffer {} is not pinned", slot.key()));
        }
        trace!(key = %slot.key(), "bunpin");
    }

    /// Buffer currently bound to `key`, if any
    pub fn resident(&self, key: BlockKey) -> Option<BufId> {
        let bucket = self.buckets[self.bucket_of(key.blockno)].lock();
        bucket
            .iter(&self.links)
            .find(|&index| self.slots[index].key() == key)
            .map(BufId)
    }

    /// Holders plus pins of a buffer
    pub fn refcount(&self, id: BufId) -> u32 {
        self.slots[id.0].refcnt()
    }

    pub fn nbuf(&self) -> usize {
        self.slots.len()
    }

    pub fn nbucket(&self) -> usize {
        self.buckets.len()
    }

    pub fn disk(&self) -> &D {
        &self.disk
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            nbuf: self.nbuf(),
            nbucket: self.nbucket(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            recycled: self.counters.recycled.load(Ordering::Relaxed),
            stolen: self.counters.stolen.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            disk_reads: self.counters.disk_reads.load(Ordering::Relaxed),
            disk_writes: self.counters.disk_writes.load(Ordering::Relaxed),
            referenced: self.slots.iter().filter(|slot| slot.refcnt() > 0).count(),
        }
    }

    #[inline]
    fn bucket_of(&self, blockno: BlockNo) -> usize {
        blockno as usize % self.buckets.len()
    }

    fn tick(&self) -> Tick {
        self.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }
}
