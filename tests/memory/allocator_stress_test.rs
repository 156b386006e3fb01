/*!
 * Allocator Stress Tests
 * Concurrent allocation from every CPU and randomized operation sequences
 */

use ai_os_memcore::core::sync::cpu;
use ai_os_memcore::{CpuId, FrameAllocator, MemoryConfig, PhysAddr};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serial_test::serial;
use std::collections::HashSet;
use std::sync::{Barrier, Mutex};
use std::thread;

#[test]
#[serial]
fn test_concurrent_allocation_never_duplicates() {
    const NCPU: usize = 4;
    const FRAMES: usize = 64;

    let kmem = FrameAllocator::new(&MemoryConfig::with_frames(FRAMES, NCPU)).unwrap();
    let live = Mutex::new(HashSet::new());
    let barrier = Barrier::new(NCPU);

    thread::scope(|scope| {
        for id in 0..NCPU {
            let (kmem, live, barrier) = (&kmem, &live, &barrier);
            scope.spawn(move || {
                let _cpu = cpu::bind(CpuId(id));
                let mut rng = StdRng::seed_from_u64(id as u64);
                let mut held: Vec<PhysAddr> = Vec::new();
                barrier.wait();

                for _ in 0..5_000 {
                    if held.is_empty() || rng.gen_bool(0.55) {
                        if let Some(pa) = kmem.allocate() {
                            assert!(live.lock().unwrap().insert(pa), "{pa} handed out twice");
                            held.push(pa);
                        }
                    } else {
                        let pa = held.swap_remove(rng.gen_range(0..held.len()));
                        assert!(live.lock().unwrap().remove(&pa));
                        kmem.free(pa);
                    }
                }

                for pa in held {
                    live.lock().unwrap().remove(&pa);
                    kmem.free(pa);
                }
            });
        }
    });

    let stats = kmem.stats();
    assert_eq!(stats.free_frames, FRAMES);
    assert_eq!(stats.allocations, stats.frees);
    assert!(live.lock().unwrap().is_empty());
}

#[test]
#[serial]
fn test_starved_cpus_steal_without_deadlock() {
    const NCPU: usize = 8;

    // Every frame starts on cpu0; the others can only steal
    let kmem = FrameAllocator::new(&MemoryConfig::with_frames(32, NCPU)).unwrap();

    thread::scope(|scope| {
        for id in 0..NCPU {
            let kmem = &kmem;
            scope.spawn(move || {
                let _cpu = cpu::bind(CpuId(id));
                for _ in 0..2_000 {
                    let frames: Vec<_> = (0..3).filter_map(|_| kmem.allocate()).collect();
                    for pa in frames {
                        kmem.free(pa);
                    }
                }
            });
        }
    });

    let stats = kmem.stats();
    assert_eq!(stats.free_frames, 32);
    assert!(stats.steals > 0);
}

#[test]
#[serial]
fn test_shared_frames_under_concurrency() {
    const NCPU: usize = 4;
    let kmem = FrameAllocator::new(&MemoryConfig::with_frames(8, NCPU)).unwrap();
    let pa = kmem.allocate().unwrap();

    thread::scope(|scope| {
        for id in 0..NCPU {
            let kmem = &kmem;
            scope.spawn(move || {
                let _cpu = cpu::bind(CpuId(id));
                for _ in 0..1_000 {
                    kmem.increment_ref(pa).unwrap();
                    kmem.free(pa);
                }
            });
        }
    });

    assert_eq!(kmem.ref_count(pa), Ok(1));
    kmem.free(pa);
    assert_eq!(kmem.free_frames(), 8);
}

#[derive(Debug, Clone)]
enum Op {
    Allocate { cpu: usize },
    Free { cpu: usize, pick: usize },
    Share { pick: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3usize).prop_map(|cpu| Op::Allocate { cpu }),
        (0..3usize, any::<usize>()).prop_map(|(cpu, pick)| Op::Free { cpu, pick }),
        any::<usize>().prop_map(|pick| Op::Share { pick }),
    ]
}

proptest! {
    #[test]
    fn prop_free_plus_allocated_is_invariant(ops in prop::collection::vec(op(), 1..120)) {
        const FRAMES: usize = 12;
        let kmem = FrameAllocator::new(&MemoryConfig::with_frames(FRAMES, 3)).unwrap();
        // One entry per outstanding reference
        let mut refs: Vec<PhysAddr> = Vec::new();

        for op in ops {
            match op {
                Op::Allocate { cpu: id } => {
                    let _cpu = cpu::bind(CpuId(id));
                    match kmem.allocate() {
                        Some(pa) => {
                            prop_assert_eq!(kmem.ref_count(pa), Ok(1));
                            refs.push(pa);
                        }
                        None => prop_assert_eq!(kmem.free_frames(), 0),
                    }
                }
                Op::Free { cpu: id, pick } if !refs.is_empty() => {
                    let _cpu = cpu::bind(CpuId(id));
                    let pa = refs.swap_remove(pick % refs.len());
                    let before = kmem.ref_count(pa).unwrap();
                    kmem.free(pa);
                    prop_assert_eq!(kmem.ref_count(pa), Ok(before - 1));
                }
                Op::Share { pick } if !refs.is_empty() => {
                    let pa = refs[pick % refs.len()];
                    kmem.increment_ref(pa).unwrap();
                    refs.push(pa);
                }
                _ => {}
            }

            let distinct: HashSet<_> = refs.iter().copied().collect();
            prop_assert_eq!(kmem.free_frames() + distinct.len(), FRAMES);
            for pa in &distinct {
                let owners = refs.iter().filter(|r| *r == pa).count() as u32;
                prop_assert_eq!(kmem.ref_count(*pa), Ok(owners));
            }
        }
    }
}
