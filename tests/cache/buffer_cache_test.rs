/*!
 * Buffer Cache Tests
 * Lookup, eviction order, write-through and pinning through the public API
 */

use ai_os_memcore::cache::{BlockKey, BufferCache, RamDisk};
use ai_os_memcore::CacheConfig;
use pretty_assertions::assert_eq;
use std::thread;

fn small_cache(nbuf: usize) -> BufferCache<RamDisk> {
    BufferCache::new(&CacheConfig::new(nbuf, 13), RamDisk::new()).unwrap()
}

#[test]
fn test_lru_victim_is_oldest_unreferenced() {
    let cache = small_cache(5);

    // Keys 1..=5 in known timestamp order; only key 5 stays held
    let mut order = Vec::new();
    for blockno in 1..=4 {
        let buf = cache.read(1, blockno);
        order.push(buf.id());
        cache.release(buf);
    }
    let held = cache.read(1, 5);

    let sixth = cache.read(1, 6);
    assert_eq!(sixth.id(), order[0]);
    assert_eq!(cache.resident(BlockKey::new(1, 1)), None);
    for (blockno, id) in (2..=4).zip(&order[1..]) {
        assert_eq!(cache.resident(BlockKey::new(1, blockno)), Some(*id));
    }
    assert_eq!(cache.resident(BlockKey::new(1, 5)), Some(held.id()));
}

#[test]
fn test_refreshed_block_is_not_evicted() {
    let cache = small_cache(3);
    for blockno in [1, 2, 3] {
        drop(cache.get(1, blockno));
    }
    // Touch block 1 again so block 2 becomes the oldest
    drop(cache.get(1, 1));
    let block2 = cache.resident(BlockKey::new(1, 2)).unwrap();

    let newcomer = cache.get(1, 4);
    assert_eq!(newcomer.id(), block2);
    assert!(cache.resident(BlockKey::new(1, 1)).is_some());
}

#[test]
fn test_same_bucket_recycles_locally() {
    let cache = small_cache(30);
    // 1 and 14 hash to the same bucket
    drop(cache.get(1, 1));
    let stats = cache.stats();
    assert_eq!(stats.recycled, 1);

    drop(cache.get(1, 14));
    drop(cache.get(1, 27));
    let stats = cache.stats();
    assert_eq!(stats.misses, 3);
    assert_eq!(stats.stolen, 0);
}

#[test]
fn test_devices_are_distinct_keys() {
    let cache = small_cache(5);
    let first = cache.get(1, 8);
    let second = cache.get(2, 8);
    assert_eq!(first.blockno(), second.blockno());
    let (a, b) = (first.id(), second.id());
    drop((first, second));
    assert_ne!(a, b);
    assert_eq!(cache.resident(BlockKey::new(1, 8)), Some(a));
    assert_eq!(cache.resident(BlockKey::new(2, 8)), Some(b));
}

#[test]
fn test_contents_survive_eviction_via_disk() {
    let cache = small_cache(2);

    let mut buf = cache.read(1, 100);
    buf.data_mut()[..5].copy_from_slice(b"hello");
    buf.write();
    drop(buf);

    // Push block 100 out of the cache
    for blockno in 101..105 {
        drop(cache.read(1, blockno));
    }
    assert_eq!(cache.resident(BlockKey::new(1, 100)), None);

    let buf = cache.read(1, 100);
    assert_eq!(&buf.data()[..5], b"hello");
    assert_eq!(cache.disk().peek(BlockKey::new(1, 100))[..5], *b"hello");
}

#[test]
fn test_unwritten_changes_are_lost_on_eviction() {
    let cache = small_cache(1);
    let mut buf = cache.read(1, 7);
    buf.data_mut()[0] = 9;
    drop(buf);

    drop(cache.read(1, 8));
    let buf = cache.read(1, 7);
    assert_eq!(buf.data()[0], 0);
}

#[test]
fn test_pin_holds_reference_across_release() {
    let cache = small_cache(5);
    let buf = cache.get(1, 3);
    let id = buf.id();
    cache.pin(&buf);
    assert_eq!(cache.refcount(id), 2);
    drop(buf);
    assert_eq!(cache.refcount(id), 1);
    assert_eq!(cache.stats().referenced, 1);

    cache.unpin(id);
    assert_eq!(cache.refcount(id), 0);
    assert_eq!(cache.stats().referenced, 0);
}

#[test]
fn test_stats_serialize() {
    let cache = small_cache(5);
    drop(cache.read(1, 1));
    drop(cache.read(1, 1));

    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses, stats.disk_reads), (1, 1, 1));
    assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["nbuf"], 5);
    assert_eq!(json["hits"], 1);
}

#[test]
#[should_panic(expected = "no buffers")]
fn test_all_buffers_bound_halts() {
    let cache = small_cache(3);
    let _held: Vec<_> = (0..3).map(|blockno| cache.get(1, blockno)).collect();
    let _ = cache.get(1, 3);
}

#[test]
fn test_release_from_non_holder_halts() {
    let cache = small_cache(3);
    let buf = cache.get(1, 1);
    let id = buf.id();

    let outcome = thread::scope(|scope| {
        let cache = &cache;
        scope.spawn(move || cache.release(buf)).join()
    });
    assert!(outcome.is_err());
    assert_eq!(cache.refcount(id), 1);
}

#[test]
fn test_write_from_non_holder_halts() {
    let cache = small_cache(3);
    let mut buf = cache.read(1, 9);
    buf.data_mut()[0] = 0x42;
    let id = buf.id();

    let outcome = thread::scope(|scope| {
        let cache = &cache;
        scope.spawn(move || cache.write(&mut buf)).join()
    });
    assert!(outcome.is_err());
    assert_eq!(cache.stats().disk_writes, 0);
    assert_eq!(cache.disk().peek(BlockKey::new(1, 9))[0], 0);
    assert_eq!(cache.refcount(id), 1);
}

#[test]
#[should_panic(expected = "bunpin")]
fn test_unpin_without_pin_halts() {
    let cache = small_cache(3);
    let id = {
        let buf = cache.get(1, 1);
        buf.id()
    };
    cache.unpin(id);
}
