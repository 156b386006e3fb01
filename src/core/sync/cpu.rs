/*!
 * CPU Identity
 *
 * Simulated CPUs are OS threads bound to a `CpuId`. Each thread also carries
 * the interrupt-off depth that spinlocks push and pop, and a unique owner token
 * that locks record as their holder.
 */

use crate::core::types::CpuId;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: Cell<CpuId> = const { Cell::new(CpuId::BOOT) };
    static NOFF: Cell<u32> = const { Cell::new(0) };
    static TOKEN: u64 = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
}

/// CPU the calling thread runs on. Unbound threads run on the boot CPU.
#[inline]
pub fn current() -> CpuId {
    CURRENT.with(Cell::get)
}

/// Bind the calling thread to `cpu` until the returned guard is dropped
pub fn bind(cpu: CpuId) -> CpuBinding {
    let previous = CURRENT.with(|c| c.replace(cpu));
    CpuBinding { previous }
}

/// Restores the previous binding on drop
#[must_use = "the binding is undone when the guard is dropped"]
pub struct CpuBinding {
    previous: CpuId,
}

impl Drop for CpuBinding {
    fn drop(&mut self) {
        CURRENT.with(|c| c.set(self.previous));
    }
}

/// Enter a no-preemption section. Nests.
#[inline]
pub fn push_off() {
    NOFF.with(|n| n.set(n.get() + 1));
}

/// Leave a no-preemption section
#[inline]
pub fn pop_off() {
    NOFF.with(|n| {
        let depth = n.get();
        if depth == 0 {
            crate::core::halt::halt("pop_off", "not in a no-preemption section");
        }
        n.set(depth - 1);
    });
}

/// Number of spinlocks the calling thread currently holds
#[inline]
pub fn intr_depth() -> u32 {
    NOFF.with(Cell::get)
}

/// Unique non-zero token for the calling thread
#[inline]
pub fn thread_token() -> u64 {
    TOKEN.with(|t| *t)
}
