/*!
 * Core Types
 * Common types used across the memory-resource core
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Device identifier type
pub type DeviceId = u32;

/// Block number on a device
pub type BlockNo = u32;

/// Logical timestamp (monotonic access counter)
pub type Tick = u64;

/// Common result type for kernel operations
pub type KernelResult<T> = Result<T, super::errors::KernelError>;

/// Identity of a simulated CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CpuId(pub usize);

impl CpuId {
    /// The CPU that boots the kernel
    pub const BOOT: CpuId = CpuId(0);

    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu{}", self.0)
    }
}
