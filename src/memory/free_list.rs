/*!
 * Per-CPU Free List
 * Intrusive LIFO stack of free frames, linked through the frames themselves
 */

use super::frame::FrameNumber;
use super::physmem::PhysicalMemory;

/// Head of one CPU's free list. Lives inside that CPU's spinlock, so holding
/// `&mut FreeList` means holding the lock.
#[derive(Debug, Default)]
pub(super) struct FreeList {
    head: Option<FrameNumber>,
    len: usize,
}

impl FreeList {
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Push a frame the caller owns
    pub fn push(&mut self, memory: &PhysicalMemory, frame: FrameNumber) {
        // Safety: the caller owns `frame` and we hold this list's lock
        unsafe { memory.write_link(frame, self.head) };
        self.head = Some(frame);
        self.len += 1;
    }

    pub fn pop(&mut self, memory: &PhysicalMemory) -> Option<FrameNumber> {
        let frame = self.head?;
        // Safety: `frame` is on this list and we hold its lock
        self.head = unsafe { memory.read_link(frame) };
        self.len -= 1;
        Some(frame)
    }
}
