/*!
 * Spinlock
 *
 * Non-blocking mutual exclusion for short critical sections. Holding one
 * keeps the thread in a no-preemption section (see `cpu::push_off`), which is
 * what lets the sleeplock refuse to block under a spinlock.
 *
 * # Backoff
 *
 * 1. **Tight spin phase**: `spin_loop()` hint
 * 2. **Yield phase**: `yield_now()` once the holder looks descheduled
 */

use super::cpu;
use crate::core::halt::halt;
use crate::core::limits::SPIN_BEFORE_YIELD;
use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

/// Spinlock protecting a value of type `T`
pub struct Spinlock<T: ?Sized> {
    name: &'static str,
    locked: AtomicBool,
    /// Token of the holding thread, 0 when free
    owner: AtomicU64,
    data: UnsafeCell<T>,
}

// Safety: access to `data` is serialized by `locked`
unsafe impl<T: ?Sized + Send> Send for Spinlock<T> {}
unsafe impl<T: ?Sized + Send> Sync for Spinlock<T> {}

impl<T> Spinlock<T> {
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            name,
            locked: AtomicBool::new(false),
            owner: AtomicU64::new(0),
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> Spinlock<T> {
    /// Does the calling thread hold this lock?
    #[inline]
    pub fn holding(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
            && self.owner.load(Ordering::Relaxed) == cpu::thread_token()
    }

    /// Acquire the lock, spinning until it is free
    pub fn lock(&self) -> SpinlockGuard<'_, T> {
        cpu::push_off();
        if self.holding() {
            halt("acquire", format_args!("{} already held by this cpu", self.name));
        }

        let mut spins = 0u32;
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.locked.load(Ordering::Relaxed) {
                if spins < SPIN_BEFORE_YIELD {
                    std::hint::spin_loop();
                    spins += 1;
                } else {
                    thread::yield_now();
                }
            }
        }

        self.owner.store(cpu::thread_token(), Ordering::Relaxed);
        SpinlockGuard { lock: self }
    }

    /// Acquire the lock only if it is free right now
    pub fn try_lock(&self) -> Option<SpinlockGuard<'_, T>> {
        cpu::push_off();
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.owner.store(cpu::thread_token(), Ordering::Relaxed);
            Some(SpinlockGuard { lock: self })
        } else {
            cpu::pop_off();
            None
        }
    }

    /// Mutable access without locking; `&mut self` proves exclusivity
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    fn unlock(&self) {
        self.owner.store(0, Ordering::Relaxed);
        self.locked.store(false, Ordering::Release);
        cpu::pop_off();
    }
}

impl<T: ?Sized> fmt::Debug for Spinlock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spinlock")
            .field("name", &self.name)
            .field("locked", &self.locked.load(Ordering::Relaxed))
            .finish()
    }
}

/// RAII guard; releases the lock and leaves the no-preemption section on drop
pub struct SpinlockGuard<'a, T: ?Sized> {
    lock: &'a Spinlock<T>,
}

impl<T: ?Sized> Deref for SpinlockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the guard exists only while the lock is held
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinlockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: the guard exists only while the lock is held
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SpinlockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}
