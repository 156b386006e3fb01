/*!
 * AI-OS Memory Core
 * Buffer cache and physical page allocator exposed as a library
 */

pub mod cache;
pub mod core;
pub mod kernel;
pub mod memory;
pub mod monitoring;

// Re-exports
pub use cache::{BlockDevice, BlockKey, BufGuard, BufId, BufferCache, CacheStats, RamDisk};
pub use crate::core::{
    CacheConfig, ConfigError, CpuId, DiskConfig, KernelConfig, KernelError, KernelResult,
    MemoryConfig,
};
pub use kernel::{Kernel, KernelStats};
pub use memory::{AllocatorStats, FrameAllocator, FrameError, PageAllocator, PhysAddr};
pub use monitoring::init_tracing;
