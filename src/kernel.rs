/*!
 * Kernel Context
 * Owns the boot-time memory resources and hands them to every CPU by reference
 */

use crate::cache::{BlockDevice, BufferCache, CacheStats};
use crate::core::config::KernelConfig;
use crate::core::types::KernelResult;
use crate::memory::{AllocatorStats, FrameAllocator};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Snapshot of both subsystems
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelStats {
    pub cache: CacheStats,
    pub memory: AllocatorStats,
}

/// Buffer cache and page allocator for one simulated machine
pub struct Kernel<D: BlockDevice> {
    config: KernelConfig,
    cache: BufferCache<D>,
    memory: FrameAllocator,
}

impl<D: BlockDevice> Kernel<D> {
    /// Validate `config` and initialize both subsystems on the calling CPU
    #[instrument(skip_all)]
    pub fn boot(config: &KernelConfig, disk: D) -> KernelResult<Self> {
        config.validate()?;

        let memory = FrameAllocator::new(&config.memory)?;
        let cache = BufferCache::new(&config.cache, disk)?;

        let (start, end) = memory.range();
        info!(
            ncpu = memory.ncpu(),
            frames = memory.total_frames(),
            %start,
            %end,
            buffers = cache.nbuf(),
            buckets = cache.nbucket(),
            "Kernel booted"
        );

        Ok(Self {
            config: *config,
            cache,
            memory,
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn cache(&self) -> &BufferCache<D> {
        &self.cache
    }

    pub fn memory(&self) -> &FrameAllocator {
        &self.memory
    }

    pub fn ncpu(&self) -> usize {
        self.memory.ncpu()
    }

    pub fn stats(&self) -> KernelStats {
        KernelStats {
            cache: self.cache.stats(),
            memory: self.memory.stats(),
        }
    }
}
