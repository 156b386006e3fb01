/*!
 * Cache Types
 */

use serde::{Deserialize, Serialize};

/// Buffer cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub nbuf: usize,
    pub nbucket: usize,
    /// Lookups that found the block already bound
    pub hits: u64,
    pub misses: u64,
    /// Misses served by an idle buffer in the target bucket
    pub recycled: u64,
    /// Misses served by migrating a buffer from another bucket
    pub stolen: u64,
    /// Victims lost to a racing thread before they could be claimed
    pub retries: u64,
    pub disk_reads: u64,
    pub disk_writes: u64,
    /// Buffers with a positive reference count at sampling time
    pub referenced: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}
