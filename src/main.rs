/*!
 * AI-OS Memory Core - Main Entry Point
 *
 * Boots the buffer cache and page allocator on a simulated machine, runs a
 * mixed file-system and virtual-memory workload on every CPU, then prints the
 * subsystem statistics as JSON.
 */

use ai_os_memcore::cache::RamDisk;
use ai_os_memcore::core::sync::cpu;
use ai_os_memcore::monitoring::span_workload;
use ai_os_memcore::{init_tracing, BlockDevice, CpuId, Kernel, KernelConfig, PhysAddr};
use miette::{IntoDiagnostic, Result};
use std::thread;
use tracing::{info, warn};

const ROUNDS: u32 = 200;
const BLOCKS_PER_CPU: u32 = 24;
const SHARED_BLOCKS: u32 = 8;
const FRAMES_PER_ROUND: usize = 4;

fn main() -> Result<()> {
    init_tracing();

    let config = KernelConfig::from_env()?;
    info!(?config, "AI-OS memory core starting");

    let disk = RamDisk::with_latency(config.disk.latency());
    let kernel = Kernel::boot(&config, disk)?;

    thread::scope(|scope| {
        for id in 0..kernel.ncpu() {
            let kernel = &kernel;
            thread::Builder::new()
                .name(format!("cpu{id}"))
                .spawn_scoped(scope, move || run_cpu(kernel, CpuId(id)))
                .into_diagnostic()?;
        }
        Ok::<(), miette::Report>(())
    })?;

    let stats = kernel.stats();
    info!(
        hit_rate = stats.cache.hit_rate(),
        steals = stats.memory.steals,
        "Workload finished"
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&stats).into_diagnostic()?
    );
    Ok(())
}

fn run_cpu<D: BlockDevice>(kernel: &Kernel<D>, id: CpuId) {
    let _cpu = cpu::bind(id);
    let mut span = span_workload("mixed", id);

    let cache = kernel.cache();
    let memory = kernel.memory();
    let base = 1_000 + id.index() as u32 * BLOCKS_PER_CPU;

    for round in 0..ROUNDS {
        // Private blocks: read-modify-write, occasionally pinned across a release
        let blockno = base + round % BLOCKS_PER_CPU;
        let mut buf = cache.read(1, blockno);
        let next = buf.data()[0].wrapping_add(1);
        buf.data_mut()[0] = next;
        buf.write();
        let pinned = (round % 16 == 0).then(|| {
            buf.pin();
            buf.id()
        });
        drop(buf);
        if let Some(buf_id) = pinned {
            cache.unpin(buf_id);
        }

        // Shared blocks contend across CPUs
        let shared = cache.read(1, round % SHARED_BLOCKS);
        let _ = shared.data()[0];
        drop(shared);

        // Frames: allocate, share one between two owners, resolve the write fault
        let frames: Vec<PhysAddr> = (0..FRAMES_PER_ROUND)
            .filter_map(|_| memory.allocate())
            .collect();
        if let Some(&first) = frames.first() {
            if memory.increment_ref(first).is_ok() {
                match memory.copy_on_write(first) {
                    Some(copy) if copy != first => memory.free(copy),
                    Some(_) => {}
                    None => memory.free(first),
                }
            }
        } else {
            warn!(cpu = %id, round, "no frames available this round");
        }
        for pa in frames {
            memory.free(pa);
        }

        span.record_operations(4);
    }
}
