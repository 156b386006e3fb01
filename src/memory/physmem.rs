/*!
 * Simulated Physical Memory
 *
 * A fixed arena of page-aligned frames standing in for RAM between the end of
 * the kernel image and PHYSTOP. The arena never moves or resizes, so frame
 * pointers stay valid for the allocator's lifetime.
 */

use super::frame::{FrameNumber, PhysAddr};
use crate::core::limits::PGSIZE;
use std::cell::UnsafeCell;
use std::ptr;

#[repr(C, align(4096))]
struct FrameCell(UnsafeCell<[u8; PGSIZE]>);

/// Link value stored in a free frame's first word; 0 terminates the list
const NIL: u64 = 0;

pub(crate) struct PhysicalMemory {
    base: PhysAddr,
    frames: Box<[FrameCell]>,
}

// Safety: frame contents are owned either by one free list (under its lock) or
// by the single holder of an allocated frame
unsafe impl Sync for PhysicalMemory {}
unsafe impl Send for PhysicalMemory {}

impl PhysicalMemory {
    pub fn new(base: PhysAddr, nframes: usize) -> Self {
        debug_assert!(base.is_page_aligned());
        let frames = (0..nframes)
            .map(|_| FrameCell(UnsafeCell::new([0; PGSIZE])))
            .collect();
        Self { base, frames }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn base(&self) -> PhysAddr {
        self.base
    }

    /// Exclusive end of the arena
    pub fn end(&self) -> PhysAddr {
        self.base.add((self.frames.len() * PGSIZE) as u64)
    }

    pub fn addr_of(&self, frame: FrameNumber) -> PhysAddr {
        self.base.add((frame.index() * PGSIZE) as u64)
    }

    pub fn frame_ptr(&self, frame: FrameNumber) -> *mut u8 {
        self.frames[frame.index()].0.get().cast()
    }

    /// Overwrite a whole frame with `byte`.
    ///
    /// # Safety
    /// The caller must own the frame (popped, or about to be pushed).
    pub unsafe fn fill(&self, frame: FrameNumber, byte: u8) {
        ptr::write_bytes(self.frame_ptr(frame), byte, PGSIZE);
    }

    /// Copy the contents of `from` into `to`.
    ///
    /// # Safety
    /// The caller must own `to` and hold a reference on `from`.
    pub unsafe fn copy(&self, from: FrameNumber, to: FrameNumber) {
        ptr::copy_nonoverlapping(self.frame_ptr(from), self.frame_ptr(to), PGSIZE);
    }

    /// Read the free-list link embedded in a free frame.
    ///
    /// # Safety
    /// The frame must be on a free list whose lock the caller holds.
    pub unsafe fn read_link(&self, frame: FrameNumber) -> Option<FrameNumber> {
        let raw = self.frame_ptr(frame).cast::<u64>().read();
        (raw != NIL).then(|| FrameNumber::new((raw - 1) as usize))
    }

    /// Store the free-list link in a frame's first word.
    ///
    /// # Safety
    /// The caller must own the frame and hold the lock of the list it joins.
    pub unsafe fn write_link(&self, frame: FrameNumber, next: Option<FrameNumber>) {
        let raw = next.map_or(NIL, |n| n.index() as u64 + 1);
        self.frame_ptr(frame).cast::<u64>().write(raw);
    }
}
