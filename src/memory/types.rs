/*!
 * Memory Types
 * Errors and statistics for the physical page allocator
 */

use super::frame::PhysAddr;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Frame operation result
pub type FrameResult<T> = Result<T, FrameError>;

/// Frame addressing errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum FrameError {
    #[error("Frame address {0} is not page aligned")]
    #[diagnostic(
        code(memory::misaligned),
        help("Frame addresses are multiples of 4096 returned by allocate().")
    )]
    Misaligned(PhysAddr),

    #[error("Frame address {addr} outside managed range [{start}, {end})")]
    #[diagnostic(
        code(memory::out_of_range),
        help("Only memory between the end of the kernel image and PHYSTOP is managed.")
    )]
    OutOfRange {
        addr: PhysAddr,
        start: PhysAddr,
        end: PhysAddr,
    },

    #[error("Frame {0} is not allocated")]
    #[diagnostic(
        code(memory::not_allocated),
        help("Only allocated frames (reference count > 0) can gain references.")
    )]
    NotAllocated(PhysAddr),
}

/// Allocator statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorStats {
    pub total_frames: usize,
    pub free_frames: usize,
    /// Free frames on each CPU's list
    pub per_cpu_free: Vec<usize>,
    pub allocations: u64,
    pub frees: u64,
    /// Allocations served from another CPU's list
    pub steals: u64,
    /// Allocations that found every list empty
    pub failures: u64,
}

impl AllocatorStats {
    pub fn allocated_frames(&self) -> usize {
        self.total_frames - self.free_frames
    }
}
