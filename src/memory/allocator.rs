/*!
 * Physical Page Allocator
 *
 * Hands out whole 4096-byte frames for user memory, kernel stacks, page-table
 * pages and pipe buffers.
 *
 * ## Allocation Path
 *
 * - Pop from the calling CPU's free list (no cross-CPU contention)
 * - On an empty list, visit the other CPUs one at a time and steal the first
 *   free frame; never more than one list lock is held
 * - Exhaustion is an ordinary condition and returns `None`
 *
 * ## Sharing
 *
 * Every frame carries a reference count. `increment_ref` lets a second address
 * space map the frame without copying; `free` only recycles the frame once the
 * last reference is gone.
 */

use super::frame::{FrameNumber, PhysAddr};
use super::free_list::FreeList;
use super::physmem::PhysicalMemory;
use super::refcount::RefCountTable;
use super::traits::PageAllocator;
use super::types::{AllocatorStats, FrameError, FrameResult};
use crate::core::config::MemoryConfig;
use crate::core::errors::ConfigError;
use crate::core::halt::halt;
use crate::core::limits::{ALLOC_JUNK, FREE_JUNK, PGSIZE};
use crate::core::sync::{cpu, Spinlock};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, instrument, trace, warn};

#[derive(Debug, Default)]
struct Counters {
    allocations: AtomicU64,
    frees: AtomicU64,
    steals: AtomicU64,
    failures: AtomicU64,
}

/// Per-CPU physical frame allocator with shared reference counts
pub struct FrameAllocator {
    memory: PhysicalMemory,
    free_lists: Box<[Spinlock<FreeList>]>,
    refcounts: RefCountTable,
    counters: Counters,
}

impl FrameAllocator {
    /// Carve `[page_round_up(kernel_end), phys_top)` into frames and free each
    /// one on the calling (boot) CPU.
    #[instrument(skip_all, fields(ncpu = config.ncpu))]
    pub fn new(config: &MemoryConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let start = config.frame_start().ok_or_else(|| {
            ConfigError::Invalid("kernel_end cannot be rounded up to a page".into())
        })?;
        let nframes = config.frame_count();
        let allocator = Self {
            memory: PhysicalMemory::new(start, nframes),
            free_lists: (0..config.ncpu)
                .map(|_| Spinlock::new("kmem", FreeList::new()))
                .collect(),
            refcounts: RefCountTable::new(nframes),
            counters: Counters::default(),
        };

        allocator.free_range();

        info!(
            start = %allocator.memory.base(),
            end = %allocator.memory.end(),
            frames = nframes,
            boot_cpu = %cpu::current(),
            "Physical page allocator initialized"
        );
        Ok(allocator)
    }

    fn free_range(&self) {
        for index in 0..self.memory.frame_count() {
            let frame = FrameNumber::new(index);
            self.refcounts.set(frame, 1);
            self.free(self.memory.addr_of(frame));
        }
        // Boot-time frees are not workload frees
        self.counters.frees.store(0, Ordering::Relaxed);
    }

    /// Allocate one frame, filled with `ALLOC_JUNK`, with reference count 1
    pub fn allocate(&self) -> Option<PhysAddr> {
        let home = self.home_cpu();
        let local = self.free_lists[home].lock().pop(&self.memory);

        let Some(frame) = local.or_else(|| self.steal(home)) else {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            warn!(cpu = home, "kalloc: out of physical memory");
            return None;
        };

        // Safety: the frame left every free list above, so we own it
        unsafe { self.memory.fill(frame, ALLOC_JUNK) };
        self.refcounts.set(frame, 1);
        self.counters.allocations.fetch_add(1, Ordering::Relaxed);

        let pa = self.memory.addr_of(frame);
        trace!(%pa, cpu = home, "kalloc");
        Some(pa)
    }

    /// Take a frame from the first other CPU with one to spare
    fn steal(&self, home: usize) -> Option<FrameNumber> {
        let ncpu = self.free_lists.len();
        (1..ncpu).map(|k| (home + k) % ncpu).find_map(|victim| {
            let frame = self.free_lists[victim].lock().pop(&self.memory)?;
            self.counters.steals.fetch_add(1, Ordering::Relaxed);
            debug!(from = victim, to = home, "kalloc: stole frame");
            Some(frame)
        })
    }

    /// Drop one reference to `pa`; the last reference returns it to the
    /// calling CPU's free list.
    ///
    /// Halts on a misaligned or unmanaged address, or on a frame with no
    /// references left.
    pub fn free(&self, pa: PhysAddr) {
        let frame = self.frame_number(pa).unwrap_or_else(|err| halt("kfree", err));

        match self.refcounts.decrement(frame) {
            None => halt("kfree", format_args!("frame {pa} has no references")),
            Some(0) => {}
            Some(remaining) => {
                trace!(%pa, remaining, "kfree: frame still shared");
                return;
            }
        }

        // Safety: the last reference is gone, the frame is ours until pushed
        unsafe { self.memory.fill(frame, FREE_JUNK) };
        let home = self.home_cpu();
        self.free_lists[home].lock().push(&self.memory, frame);
        self.counters.frees.fetch_add(1, Ordering::Relaxed);
        trace!(%pa, cpu = home, "kfree");
    }

    /// Current reference count of an allocated or free frame
    pub fn ref_count(&self, pa: PhysAddr) -> FrameResult<u32> {
        let frame = self.frame_number(pa)?;
        Ok(self.refcounts.get(frame))
    }

    /// Add a reference for an additional mapping; returns the new count
    pub fn increment_ref(&self, pa: PhysAddr) -> FrameResult<u32> {
        let frame = self.frame_number(pa)?;
        self.refcounts
            .increment(frame)
            .ok_or(FrameError::NotAllocated(pa))
    }

    /// Resolve a write to a possibly shared frame.
    ///
    /// An exclusively owned frame is returned as is. A shared one is copied into
    /// a fresh frame and the caller's reference to the original is dropped.
    /// Returns `None`, keeping the original reference, if no frame is free.
    pub fn copy_on_write(&self, pa: PhysAddr) -> Option<PhysAddr> {
        let frame = self
            .frame_number(pa)
            .unwrap_or_else(|err| halt("copy_on_write", err));

        match self.refcounts.get(frame) {
            0 => halt("copy_on_write", format_args!("frame {pa} is not allocated")),
            1 => return Some(pa),
            _ => {}
        }

        let copy = self.allocate()?;
        let copy_frame = self
            .frame_number(copy)
            .unwrap_or_else(|err| halt("copy_on_write", err));
        // Safety: we own `copy` and hold a reference on `frame`
        unsafe { self.memory.copy(frame, copy_frame) };
        self.free(pa);

        debug!(from = %pa, to = %copy, "copy-on-write: frame copied");
        Some(copy)
    }

    /// Pointer to the first byte of a frame in simulated RAM.
    ///
    /// Only the owner of an allocated frame may read or write through it.
    pub fn frame_ptr(&self, pa: PhysAddr) -> FrameResult<*mut u8> {
        let frame = self.frame_number(pa)?;
        Ok(self.memory.frame_ptr(frame))
    }

    fn frame_number(&self, pa: PhysAddr) -> FrameResult<FrameNumber> {
        if !pa.is_page_aligned() {
            return Err(FrameError::Misaligned(pa));
        }

        let (start, end) = (self.memory.base(), self.memory.end());
        if pa < start || pa >= end {
            return Err(FrameError::OutOfRange {
                addr: pa,
                start,
                end,
            });
        }

        Ok(FrameNumber::new(
            ((pa.as_u64() - start.as_u64()) / PGSIZE as u64) as usize,
        ))
    }

    #[inline]
    fn home_cpu(&self) -> usize {
        cpu::current().index() % self.free_lists.len()
    }

    pub fn ncpu(&self) -> usize {
        self.free_lists.len()
    }

    pub fn total_frames(&self) -> usize {
        self.memory.frame_count()
    }

    /// Managed range as `[start, end)`
    pub fn range(&self) -> (PhysAddr, PhysAddr) {
        (self.memory.base(), self.memory.end())
    }

    /// Free frames across all CPUs, counted one list at a time
    pub fn free_frames(&self) -> usize {
        self.free_lists.iter().map(|list| list.lock().len()).sum()
    }

    /// Free memory in bytes
    pub fn free_bytes(&self) -> usize {
        self.free_frames() * PGSIZE
    }

    pub fn stats(&self) -> AllocatorStats {
        let per_cpu_free: Vec<usize> = self
            .free_lists
            .iter()
            .map(|list| list.lock().len())
            .collect();

        AllocatorStats {
            total_frames: self.total_frames(),
            free_frames: per_cpu_free.iter().sum(),
            per_cpu_free,
            allocations: self.counters.allocations.load(Ordering::Relaxed),
            frees: self.counters.frees.load(Ordering::Relaxed),
            steals: self.counters.steals.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }
}

impl PageAllocator for FrameAllocator {
    fn allocate(&self) -> Option<PhysAddr> {
        FrameAllocator::allocate(self)
    }

    fn free(&self, pa: PhysAddr) {
        FrameAllocator::free(self, pa)
    }

    fn ref_count(&self, pa: PhysAddr) -> FrameResult<u32> {
        FrameAllocator::ref_count(self, pa)
    }

    fn increment_ref(&self, pa: PhysAddr) -> FrameResult<u32> {
        FrameAllocator::increment_ref(self, pa)
    }
}
