/*!
 * Kernel Configuration
 *
 * Boot-time sizing of the buffer cache, the physical page allocator and the
 * simulated disk. Values resolve in order:
 *
 * 1. Defaults from `core::limits`
 * 2. JSON file named by `KERNEL_CONFIG`
 * 3. Environment overrides (`KERNEL_NBUF`, `KERNEL_NBUCKET`, `KERNEL_NCPU`,
 *    `KERNEL_PHYS_MB`, `KERNEL_DISK_LATENCY_US`)
 */

use super::errors::ConfigError;
use super::limits::{
    DEFAULT_KERNEL_END, DEFAULT_PHYS_TOP, KERNBASE, NBUCKET, NBUF, NCPU, PGSIZE, PHYSTOP,
};
use crate::memory::PhysAddr;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Buffer cache sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Total number of buffers
    pub nbuf: usize,
    /// Number of hash buckets (prime recommended)
    pub nbucket: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            nbuf: NBUF,
            nbucket: NBUCKET,
        }
    }
}

impl CacheConfig {
    pub const fn new(nbuf: usize, nbucket: usize) -> Self {
        Self { nbuf, nbucket }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nbuf == 0 {
            return Err(ConfigError::Invalid("buffer cache needs at least one buffer".into()));
        }
        if self.nbucket == 0 {
            return Err(ConfigError::Invalid("buffer cache needs at least one bucket".into()));
        }
        if !is_prime(self.nbucket) {
            warn!(
                nbucket = self.nbucket,
                "bucket count is not prime; block numbers may cluster"
            );
        }
        Ok(())
    }
}

/// Physical memory layout and CPU count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Number of CPUs (one free list each)
    pub ncpu: usize,
    /// First address after the kernel image; rounded up to a page
    pub kernel_end: u64,
    /// Top of managed physical memory (exclusive)
    pub phys_top: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            ncpu: NCPU,
            kernel_end: DEFAULT_KERNEL_END,
            phys_top: DEFAULT_PHYS_TOP,
        }
    }
}

impl MemoryConfig {
    /// Layout with exactly `frames` page frames directly above `KERNBASE`
    pub const fn with_frames(frames: usize, ncpu: usize) -> Self {
        Self {
            ncpu,
            kernel_end: KERNBASE,
            phys_top: KERNBASE + (frames * PGSIZE) as u64,
        }
    }

    /// First frame of the managed range; `None` if `kernel_end` cannot be
    /// rounded up to a page
    pub fn frame_start(&self) -> Option<PhysAddr> {
        PhysAddr::new(self.kernel_end).checked_page_round_up()
    }

    /// Number of whole frames in the managed range
    pub fn frame_count(&self) -> usize {
        match self.frame_start() {
            Some(start) if self.phys_top > start.as_u64() => {
                ((self.phys_top - start.as_u64()) / PGSIZE as u64) as usize
            }
            _ => 0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ncpu == 0 || self.ncpu > NCPU {
            return Err(ConfigError::Invalid(format!(
                "ncpu must be between 1 and {NCPU}, got {}",
                self.ncpu
            )));
        }
        if self.kernel_end < KERNBASE {
            return Err(ConfigError::Invalid(format!(
                "kernel_end 0x{:x} lies below KERNBASE 0x{KERNBASE:x}",
                self.kernel_end
            )));
        }
        if self.phys_top > PHYSTOP {
            return Err(ConfigError::Invalid(format!(
                "phys_top 0x{:x} lies above PHYSTOP 0x{PHYSTOP:x}",
                self.phys_top
            )));
        }
        if self.phys_top <= self.kernel_end {
            return Err(ConfigError::Invalid(format!(
                "phys_top 0x{:x} must lie above kernel_end 0x{:x}",
                self.phys_top, self.kernel_end
            )));
        }
        if self.frame_count() == 0 {
            return Err(ConfigError::Invalid(
                "memory range does not contain a whole page frame".into(),
            ));
        }
        Ok(())
    }
}

/// Simulated disk behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    /// Added latency per block transfer, in microseconds
    pub latency_us: u64,
}

impl DiskConfig {
    pub fn latency(&self) -> Duration {
        Duration::from_micros(self.latency_us)
    }
}

/// Complete boot configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub cache: CacheConfig,
    pub memory: MemoryConfig,
    pub disk: DiskConfig,
}

impl KernelConfig {
    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Resolve defaults, `KERNEL_CONFIG` and environment overrides, then validate
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("KERNEL_CONFIG") {
            Ok(path) => {
                let json = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Io { path, source })?;
                Self::from_json(&json)?
            }
            Err(_) => Self::default(),
        };

        if let Some(nbuf) = env_usize("KERNEL_NBUF")? {
            config.cache.nbuf = nbuf;
        }
        if let Some(nbucket) = env_usize("KERNEL_NBUCKET")? {
            config.cache.nbucket = nbucket;
        }
        if let Some(ncpu) = env_usize("KERNEL_NCPU")? {
            config.memory.ncpu = ncpu;
        }
        if let Some(mb) = env_usize("KERNEL_PHYS_MB")? {
            config.memory.phys_top = (mb as u64)
                .checked_mul(1024 * 1024)
                .and_then(|bytes| bytes.checked_add(KERNBASE))
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "KERNEL_PHYS_MB",
                    value: mb.to_string(),
                })?;
        }
        if let Some(us) = env_usize("KERNEL_DISK_LATENCY_US")? {
            config.disk.latency_us = us as u64;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.validate()?;
        self.memory.validate()
    }
}

fn env_usize(key: &'static str) -> Result<Option<usize>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        Err(_) => Ok(None),
    }
}

fn is_prime(n: usize) -> bool {
    n >= 2 && (2..).take_while(|d| d * d <= n).all(|d| n % d != 0)
}
