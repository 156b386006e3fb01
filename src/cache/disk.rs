/*!
 * Disk Collaborator
 *
 * The cache moves whole blocks through a `BlockDevice`. Transfers are
 * synchronous: `transfer` returns once the data has moved.
 */

use super::buffer::{BlockData, BlockKey};
use crate::core::limits::BSIZE;
use ahash::AHashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::trace;

/// Direction of a block transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// Disk to buffer
    Read,
    /// Buffer to disk
    Write,
}

/// Synchronous block storage
pub trait BlockDevice: Send + Sync {
    /// Move one block between the device and `data`, blocking until done
    fn transfer(&self, key: BlockKey, data: &mut BlockData, direction: Transfer);
}

impl<T: BlockDevice + ?Sized> BlockDevice for Arc<T> {
    fn transfer(&self, key: BlockKey, data: &mut BlockData, direction: Transfer) {
        (**self).transfer(key, data, direction)
    }
}

/// In-memory disk; unwritten blocks read back as zeros
#[derive(Debug, Default)]
pub struct RamDisk {
    blocks: RwLock<AHashMap<BlockKey, Box<BlockData>>>,
    latency: Duration,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl RamDisk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disk that sleeps for `latency` on every transfer
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Completed read transfers
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Completed write transfers
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Copy of a block's stored contents, bypassing any cache
    pub fn peek(&self, key: BlockKey) -> Box<BlockData> {
        self.blocks
            .read()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Box::new([0; BSIZE]))
    }
}

impl BlockDevice for RamDisk {
    fn transfer(&self, key: BlockKey, data: &mut BlockData, direction: Transfer) {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        match direction {
            Transfer::Read => {
                match self.blocks.read().get(&key) {
                    Some(stored) => data.copy_from_slice(&stored[..]),
                    None => data.fill(0),
                }
                self.reads.fetch_add(1, Ordering::Relaxed);
            }
            Transfer::Write => {
                self.blocks.write().insert(key, Box::new(*data));
                self.writes.fetch_add(1, Ordering::Relaxed);
            }
        }
        trace!(dev = key.dev, blockno = key.blockno, ?direction, "disk transfer");
    }
}
