/*!
 * Synchronization Primitives
 *
 * Two distinct lock flavours, never interchangeable:
 * - `Spinlock`: short, non-blocking critical sections (bucket lists, free lists,
 *   reference counts). Holding one defers preemption.
 * - `Sleeplock`: long-held exclusion whose waiters suspend (buffer contents
 *   across disk I/O).
 *
 * `cpu` binds threads to simulated CPUs and tracks the no-preemption depth
 * that ties the two together.
 */

pub mod cpu;
mod sleeplock;
mod spinlock;

pub use sleeplock::{Sleeplock, SleeplockGuard};
pub use spinlock::{Spinlock, SpinlockGuard};
