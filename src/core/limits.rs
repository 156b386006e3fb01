/*!
 * System Limits and Constants
 *
 * Centralized location for the fixed configuration of the memory-resource core.
 * Organized by subsystem; runtime-tunable values have a matching field in
 * `core::config` that defaults to the constant here.
 *
 * - Performance-critical constants are marked with [PERF]
 * - Values inherited from the classic xv6 layout are marked with [XV6-COMPAT]
 */

// =============================================================================
// CPU LIMITS
// =============================================================================

/// Maximum number of CPUs the kernel can drive
/// [XV6-COMPAT]
pub const NCPU: usize = 8;

// =============================================================================
// BUFFER CACHE
// =============================================================================

/// Size of one disk block (and of a buffer payload) in bytes
/// [XV6-COMPAT]
pub const BSIZE: usize = 1024;

/// Max number of blocks any file-system operation writes
pub const MAXOPBLOCKS: usize = 10;

/// Number of buffers in the block cache
/// Sized for three concurrent maximal operations
pub const NBUF: usize = MAXOPBLOCKS * 3;

/// Number of cache buckets
/// Prime, so sequential block numbers spread evenly
/// [PERF] One spinlock per bucket
pub const NBUCKET: usize = 13;

/// Device id stamped on buffers that hold no block yet
pub const NO_DEVICE: u32 = u32::MAX;

// =============================================================================
// PHYSICAL MEMORY
// =============================================================================

/// Page (frame) size in bytes
pub const PGSIZE: usize = 4096;

/// Base of the physical RAM window
/// [XV6-COMPAT] qemu -machine virt places RAM here
pub const KERNBASE: u64 = 0x8000_0000;

/// Top of managed physical memory (128MB of RAM)
/// [XV6-COMPAT]
pub const PHYSTOP: u64 = KERNBASE + 128 * 1024 * 1024;

/// Default end of the kernel image used when no linker symbol is available (2MB)
pub const DEFAULT_KERNEL_END: u64 = KERNBASE + 2 * 1024 * 1024;

/// Default top of simulated RAM (16MB window, 14MB of frames)
pub const DEFAULT_PHYS_TOP: u64 = KERNBASE + 16 * 1024 * 1024;

/// Byte written over a frame when it is handed out
/// Catches reads of uninitialised memory
pub const ALLOC_JUNK: u8 = 0x05;

/// Byte written over a frame when it goes back on a free list
/// Catches dangling references
pub const FREE_JUNK: u8 = 0x01;

// =============================================================================
// SYNCHRONIZATION
// =============================================================================

/// Tight spin iterations before a spinlock starts yielding the thread
/// [PERF] Hosted CPUs are threads and can be descheduled while holding a lock
pub const SPIN_BEFORE_YIELD: u32 = 64;
