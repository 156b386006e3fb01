/*!
 * Buffer Cache Concurrency Tests
 * One buffer per block under contention, and no lost updates across evictions
 */

use ai_os_memcore::cache::{BlockKey, BufferCache, RamDisk};
use ai_os_memcore::core::sync::cpu;
use ai_os_memcore::{CacheConfig, CpuId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serial_test::serial;
use std::collections::HashSet;
use std::sync::{Barrier, Mutex};
use std::thread;

fn counter(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[0], data[1], data[2], data[3]])
}

#[test]
fn test_same_key_always_same_buffer() {
    let cache = BufferCache::new(&CacheConfig::new(16, 13), RamDisk::new()).unwrap();
    let keeper = cache.get(1, 42);
    let expected = keeper.id();
    cache.pin(&keeper);
    drop(keeper);

    let seen = Mutex::new(HashSet::new());
    let barrier = Barrier::new(8);
    thread::scope(|scope| {
        for id in 0..8 {
            let (cache, seen, barrier) = (&cache, &seen, &barrier);
            scope.spawn(move || {
                let _cpu = cpu::bind(CpuId(id));
                barrier.wait();
                for round in 0..200 {
                    let buf = cache.get(1, 42);
                    seen.lock().unwrap().insert(buf.id());
                    drop(buf);
                    // Churn other blocks so eviction runs alongside
                    drop(cache.get(2, (id * 1000 + round) as u32));
                }
            });
        }
    });

    assert_eq!(*seen.lock().unwrap(), HashSet::from([expected]));
    cache.unpin(expected);
    assert_eq!(cache.stats().referenced, 0);
}

#[test]
#[serial]
fn test_no_lost_updates_under_eviction() {
    const THREADS: usize = 6;
    const ROUNDS: usize = 300;
    const KEYS: u32 = 10;

    // Fewer buffers than keys forces steady eviction and write-back reloads
    let cache = BufferCache::new(&CacheConfig::new(7, 5), RamDisk::new()).unwrap();

    thread::scope(|scope| {
        for id in 0..THREADS {
            let cache = &cache;
            scope.spawn(move || {
                let _cpu = cpu::bind(CpuId(id));
                let mut rng = StdRng::seed_from_u64(id as u64);
                for _ in 0..ROUNDS {
                    let blockno = rng.gen_range(0..KEYS);
                    let mut buf = cache.read(1, blockno);
                    let next = counter(buf.data()) + 1;
                    buf.data_mut()[..4].copy_from_slice(&next.to_le_bytes());
                    buf.write();
                }
            });
        }
    });

    let total: u32 = (0..KEYS)
        .map(|blockno| counter(&cache.disk().peek(BlockKey::new(1, blockno))[..]))
        .sum();
    assert_eq!(total as usize, THREADS * ROUNDS);

    let stats = cache.stats();
    assert_eq!(stats.referenced, 0);
    assert_eq!(stats.hits + stats.misses, (THREADS * ROUNDS) as u64);
    assert!(stats.stolen > 0);
}

#[test]
#[serial]
fn test_readers_wait_for_writer() {
    let cache = BufferCache::new(&CacheConfig::new(4, 13), RamDisk::new()).unwrap();
    let mut writer = cache.read(1, 5);

    thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let buf = cache.read(1, 5);
            buf.data()[0]
        });

        // The reader cannot see the payload until the writer releases it
        thread::sleep(std::time::Duration::from_millis(20));
        writer.data_mut()[0] = 77;
        writer.write();
        drop(writer);

        assert_eq!(reader.join().unwrap(), 77);
    });
}
