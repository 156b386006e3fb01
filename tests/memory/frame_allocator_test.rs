/*!
 * Frame Allocator Tests
 * Allocation, reference counting, fill patterns and cross-CPU stealing
 */

use ai_os_memcore::core::limits::{ALLOC_JUNK, FREE_JUNK, KERNBASE, PGSIZE};
use ai_os_memcore::core::sync::cpu;
use ai_os_memcore::{CpuId, FrameAllocator, FrameError, MemoryConfig, PageAllocator, PhysAddr};
use pretty_assertions::assert_eq;
use std::collections::HashSet;

fn allocator(frames: usize, ncpu: usize) -> FrameAllocator {
    FrameAllocator::new(&MemoryConfig::with_frames(frames, ncpu)).unwrap()
}

fn frame_bytes(kmem: &FrameAllocator, pa: PhysAddr) -> &[u8] {
    let ptr = kmem.frame_ptr(pa).unwrap();
    // Safety: the tests only inspect frames they own
    unsafe { std::slice::from_raw_parts(ptr, PGSIZE) }
}

#[test]
fn test_allocate_then_free_returns_frame() {
    let kmem = allocator(4, 1);
    let pa = kmem.allocate().unwrap();
    assert_eq!(kmem.free_frames(), 3);
    assert_eq!(kmem.ref_count(pa), Ok(1));

    kmem.free(pa);
    assert_eq!(kmem.free_frames(), 4);
    assert_eq!(kmem.ref_count(pa), Ok(0));

    // LIFO: the frame just freed comes back first
    assert_eq!(kmem.allocate(), Some(pa));
}

#[test]
fn test_frames_are_distinct_and_aligned() {
    let kmem = allocator(16, 1);
    let frames: Vec<_> = std::iter::from_fn(|| kmem.allocate()).collect();
    assert_eq!(frames.len(), 16);

    let unique: HashSet<_> = frames.iter().copied().collect();
    assert_eq!(unique.len(), 16);

    let (start, end) = kmem.range();
    for pa in &frames {
        assert!(pa.is_page_aligned());
        assert!(*pa >= start && *pa < end);
    }
}

#[test]
fn test_exhaustion_returns_none() {
    let kmem = allocator(2, 2);
    let a = kmem.allocate().unwrap();
    let b = kmem.allocate().unwrap();
    assert_eq!(kmem.allocate(), None);
    assert_eq!(kmem.stats().failures, 1);

    kmem.free(a);
    assert!(kmem.allocate().is_some());
    kmem.free(b);
}

#[test]
fn test_shared_frame_freed_by_last_owner() {
    let kmem = allocator(4, 1);
    let pa = kmem.allocate().unwrap();
    assert_eq!(kmem.increment_ref(pa), Ok(2));

    kmem.free(pa);
    assert_eq!(kmem.ref_count(pa), Ok(1));
    assert_eq!(kmem.free_frames(), 3);

    kmem.free(pa);
    assert_eq!(kmem.ref_count(pa), Ok(0));
    assert_eq!(kmem.free_frames(), 4);
}

#[test]
fn test_fill_patterns() {
    let kmem = allocator(2, 1);
    let pa = kmem.allocate().unwrap();
    assert!(frame_bytes(&kmem, pa).iter().all(|&b| b == ALLOC_JUNK));

    // Past its embedded free-list link a freed frame holds the free pattern
    let other = kmem.allocate().unwrap();
    kmem.free(other);
    assert!(frame_bytes(&kmem, other)[8..].iter().all(|&b| b == FREE_JUNK));
    kmem.free(pa);
}

#[test]
fn test_bad_addresses_are_errors() {
    let kmem = allocator(2, 1);
    let misaligned = PhysAddr::new(KERNBASE + 12);
    let outside = PhysAddr::new(KERNBASE + 2 * PGSIZE as u64);

    assert_eq!(kmem.ref_count(misaligned), Err(FrameError::Misaligned(misaligned)));
    assert!(matches!(
        kmem.increment_ref(outside),
        Err(FrameError::OutOfRange { .. })
    ));
    assert!(matches!(kmem.frame_ptr(outside), Err(FrameError::OutOfRange { .. })));
}

#[test]
fn test_increment_free_frame_is_error() {
    let kmem = allocator(2, 1);
    let pa = kmem.allocate().unwrap();
    kmem.free(pa);
    assert_eq!(kmem.increment_ref(pa), Err(FrameError::NotAllocated(pa)));
}

#[test]
#[should_panic(expected = "kfree")]
fn test_free_misaligned_halts() {
    let kmem = allocator(2, 1);
    kmem.free(PhysAddr::new(KERNBASE + 1));
}

#[test]
#[should_panic(expected = "kfree")]
fn test_free_out_of_range_halts() {
    let kmem = allocator(2, 1);
    kmem.free(PhysAddr::new(KERNBASE + 64 * PGSIZE as u64));
}

#[test]
#[should_panic(expected = "no references")]
fn test_double_free_halts() {
    let kmem = allocator(2, 1);
    let pa = kmem.allocate().unwrap();
    kmem.free(pa);
    kmem.free(pa);
}

#[test]
fn test_copy_on_write_exclusive_frame_is_kept() {
    let kmem = allocator(4, 1);
    let pa = kmem.allocate().unwrap();
    assert_eq!(kmem.copy_on_write(pa), Some(pa));
    assert_eq!(kmem.ref_count(pa), Ok(1));
}

#[test]
fn test_copy_on_write_shared_frame_is_copied() {
    let kmem = allocator(4, 1);
    let pa = kmem.allocate().unwrap();
    // Safety: we own the frame
    unsafe { *kmem.frame_ptr(pa).unwrap() = 0xee };
    kmem.share(pa).unwrap();

    let copy = kmem.copy_on_write(pa).unwrap();
    assert_ne!(copy, pa);
    assert_eq!(frame_bytes(&kmem, copy)[0], 0xee);
    assert_eq!(kmem.ref_count(pa), Ok(1));
    assert_eq!(kmem.ref_count(copy), Ok(1));
}

#[test]
fn test_copy_on_write_without_memory_keeps_reference() {
    let kmem = allocator(1, 1);
    let pa = kmem.allocate().unwrap();
    kmem.increment_ref(pa).unwrap();

    assert_eq!(kmem.copy_on_write(pa), None);
    assert_eq!(kmem.ref_count(pa), Ok(2));
}

#[test]
fn test_empty_cpu_steals_from_other() {
    let kmem = allocator(4, 2);
    assert_eq!(kmem.stats().per_cpu_free, vec![4, 0]);

    let _cpu = cpu::bind(CpuId(1));
    let pa = kmem.allocate().unwrap();
    let stats = kmem.stats();
    assert_eq!(stats.steals, 1);
    assert_eq!(stats.per_cpu_free, vec![3, 0]);

    // Freed on cpu1, so the next allocation there is local
    kmem.free(pa);
    assert_eq!(kmem.stats().per_cpu_free, vec![3, 1]);
    assert_eq!(kmem.allocate(), Some(pa));
    assert_eq!(kmem.stats().steals, 1);
}

#[test]
fn test_free_bytes_and_stats() {
    let kmem = allocator(8, 2);
    let frames: Vec<_> = (0..3).filter_map(|_| kmem.allocate()).collect();
    assert_eq!(kmem.free_bytes(), 5 * PGSIZE);

    let stats = kmem.stats();
    assert_eq!(stats.total_frames, 8);
    assert_eq!(stats.allocated_frames(), 3);
    assert_eq!(stats.allocations, 3);

    for pa in frames {
        kmem.free(pa);
    }
    assert_eq!(kmem.stats().frees, 3);
}

#[test]
fn test_kernel_end_rounded_up() {
    let config = MemoryConfig {
        ncpu: 1,
        kernel_end: KERNBASE + 100,
        phys_top: KERNBASE + 4 * PGSIZE as u64,
    };
    let kmem = FrameAllocator::new(&config).unwrap();
    assert_eq!(kmem.total_frames(), 3);
    assert_eq!(kmem.range().0, PhysAddr::new(KERNBASE + PGSIZE as u64));
}
