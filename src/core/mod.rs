/*!
 * Core Module
 * Fundamental kernel types, limits, configuration and error handling
 */

pub mod config;
pub mod errors;
pub mod halt;
pub mod limits;
pub mod sync;
pub mod types;

// Re-export for convenience
pub use config::{CacheConfig, DiskConfig, KernelConfig, MemoryConfig};
pub use errors::*;
pub use halt::halt;
pub use sync::{Sleeplock, SleeplockGuard, Spinlock, SpinlockGuard};
pub use types::*;
