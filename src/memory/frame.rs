/*!
 * Frame Addressing
 * Typed physical addresses and frame numbers
 */

use crate::core::limits::PGSIZE;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical address
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhysAddr(u64);

impl PhysAddr {
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_page_aligned(self) -> bool {
        self.0 % PGSIZE as u64 == 0
    }

    /// Next page boundary at or above this address; `None` past the top of
    /// the address space
    #[inline]
    pub const fn checked_page_round_up(self) -> Option<Self> {
        match page_round_up(self.0) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    #[inline]
    pub const fn page_round_down(self) -> Self {
        Self(self.0 & !(PGSIZE as u64 - 1))
    }

    /// Address `bytes` above this one
    #[inline]
    pub const fn add(self, bytes: u64) -> Self {
        Self(self.0 + bytes)
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr(0x{:x})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl fmt::LowerHex for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Round `addr` up to the next page boundary
pub(crate) const fn page_round_up(addr: u64) -> Option<u64> {
    let page = PGSIZE as u64;
    match addr.checked_add(page - 1) {
        Some(end) => Some(end & !(page - 1)),
        None => None,
    }
}

/// Index of a frame within the managed range
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameNumber(usize);

impl FrameNumber {
    #[inline]
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}
