/*!
 * Memory Module
 * Physical page-frame allocation with per-CPU free lists and shared
 * reference counts
 */

mod allocator;
mod frame;
mod free_list;
mod physmem;
mod refcount;
pub mod traits;
pub mod types;

// Re-export for convenience
pub use allocator::FrameAllocator;
pub use frame::{FrameNumber, PhysAddr};
pub use traits::*;
pub use types::*;
