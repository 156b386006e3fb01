/*!
 * Sleeplock
 *
 * Blocking mutual exclusion for long-held locks (a buffer across disk I/O).
 * Waiters park on a `parking_lot::Condvar` instead of spinning and are woken
 * one at a time in no particular order when the holder releases.
 *
 * The holder is recorded so callers can assert ownership (`holding`) before
 * touching protected data, and so misuse halts instead of corrupting state.
 */

use super::cpu;
use crate::core::halt::halt;
use parking_lot::{Condvar, Mutex};
use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};

#[derive(Debug, Default)]
struct SleepState {
    locked: bool,
    /// Token of the holding thread, 0 when free
    holder: u64,
}

/// Sleeplock protecting a value of type `T`
pub struct Sleeplock<T: ?Sized> {
    name: &'static str,
    state: Mutex<SleepState>,
    wakeup: Condvar,
    data: UnsafeCell<T>,
}

// Safety: access to `data` is serialized by `state.locked`
unsafe impl<T: ?Sized + Send> Send for Sleeplock<T> {}
unsafe impl<T: ?Sized + Send> Sync for Sleeplock<T> {}

impl<T> Sleeplock<T> {
    pub fn new(name: &'static str, data: T) -> Self {
        Self {
            name,
            state: Mutex::new(SleepState::default()),
            wakeup: Condvar::new(),
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> Sleeplock<T> {
    /// Acquire without a guard; pair with [`Sleeplock::unlock`].
    ///
    /// Suspends the caller while another thread holds the lock. Halts if the
    /// caller holds a spinlock or already holds this lock.
    pub fn lock_unguarded(&self) {
        if cpu::intr_depth() > 0 {
            halt(
                "acquiresleep",
                format_args!("{}: would sleep while holding a spinlock", self.name),
            );
        }

        let me = cpu::thread_token();
        let mut state = self.state.lock();
        if state.locked && state.holder == me {
            halt("acquiresleep", format_args!("{}: already held by caller", self.name));
        }
        while state.locked {
            self.wakeup.wait(&mut state);
        }
        state.locked = true;
        state.holder = me;
    }

    /// Release a lock taken with [`Sleeplock::lock_unguarded`]. Halts unless the caller holds it.
    pub fn unlock(&self) {
        let me = cpu::thread_token();
        let mut state = self.state.lock();
        if !(state.locked && state.holder == me) {
            halt("releasesleep", format_args!("{}: not held by caller", self.name));
        }
        state.locked = false;
        state.holder = 0;
        drop(state);
        self.wakeup.notify_one();
    }

    /// Does the calling thread hold this lock?
    pub fn holding(&self) -> bool {
        let state = self.state.lock();
        state.locked && state.holder == cpu::thread_token()
    }

    pub fn lock(&self) -> SleeplockGuard<'_, T> {
        self.lock_unguarded();
        SleeplockGuard { lock: self }
    }

    /// Raw pointer to the protected value.
    ///
    /// Dereferencing it is only sound while the caller holds the lock.
    pub fn data_ptr(&self) -> *mut T {
        self.data.get()
    }
}

impl<T: ?Sized> fmt::Debug for Sleeplock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Sleeplock")
            .field("name", &self.name)
            .field("locked", &state.locked)
            .finish()
    }
}

pub struct SleeplockGuard<'a, T: ?Sized> {
    lock: &'a Sleeplock<T>,
}

impl<T: ?Sized> Deref for SleeplockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the guard exists only while the lock is held
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SleeplockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: the guard exists only while the lock is held
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SleeplockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}
