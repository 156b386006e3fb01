/*!
 * Frame Reference Counts
 *
 * One counter per managed frame behind a single spinlock. A count of zero
 * means the frame may sit on a free list; allocation sets it to one.
 */

use super::frame::FrameNumber;
use crate::core::sync::Spinlock;

pub(super) struct RefCountTable {
    counts: Spinlock<Box<[u32]>>,
}

impl RefCountTable {
    pub fn new(nframes: usize) -> Self {
        Self {
            counts: Spinlock::new("kref", vec![0; nframes].into_boxed_slice()),
        }
    }

    pub fn get(&self, frame: FrameNumber) -> u32 {
        self.counts.lock()[frame.index()]
    }

    pub fn set(&self, frame: FrameNumber, count: u32) {
        self.counts.lock()[frame.index()] = count;
    }

    /// Add a reference to a frame that already has one; `None` if it is free
    pub fn increment(&self, frame: FrameNumber) -> Option<u32> {
        let mut counts = self.counts.lock();
        let count = &mut counts[frame.index()];
        if *count == 0 {
            return None;
        }
        *count += 1;
        Some(*count)
    }

    /// Drop a reference and return what remains; `None` if it was already zero
    pub fn decrement(&self, frame: FrameNumber) -> Option<u32> {
        let mut counts = self.counts.lock();
        let count = &mut counts[frame.index()];
        *count = count.checked_sub(1)?;
        Some(*count)
    }
}
