/*!
 * Memory Traits
 * Interface the virtual-memory layer consumes
 */

use super::frame::PhysAddr;
use super::types::FrameResult;

/// Physical frame allocator interface
pub trait PageAllocator: Send + Sync {
    /// Allocate one frame; `None` when physical memory is exhausted
    fn allocate(&self) -> Option<PhysAddr>;

    /// Drop one reference to a frame, recycling it with the last one
    fn free(&self, pa: PhysAddr);

    /// Current reference count of a frame
    fn ref_count(&self, pa: PhysAddr) -> FrameResult<u32>;

    /// Add a reference for an additional mapping; returns the new count
    fn increment_ref(&self, pa: PhysAddr) -> FrameResult<u32>;

    /// Map an allocated frame into one more address space without copying
    fn share(&self, pa: PhysAddr) -> FrameResult<u32> {
        self.increment_ref(pa)
    }
}
