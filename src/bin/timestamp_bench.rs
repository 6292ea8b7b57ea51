//! Host clock vs device timestamp comparison
//!
//! Dispatches one deliberately slow kernel and reports the same interval
//! from every available clock: the host wall clock, the device global
//! timestamp pair, and the kernel timestamp recorded on the completion
//! event. Device ticks convert as ticks * timer_resolution / 1e6 ms.

use anyhow::Context as _;
use clap::Parser;
use std::time::Duration;

use zeforge::backend::host::kernels;
use zeforge::{
    Context, DeviceClock, GroupCount, HostBackend, HostTimer, KernelArg, ListDesc, MemoryKind,
    OrderingMode,
};

#[derive(Parser, Debug)]
#[command(name = "timestamp-bench", version)]
#[command(about = "Compare host and device clocks around one slow kernel", long_about = None)]
struct Cli {
    /// How long the kernel occupies the device, in milliseconds
    #[arg(long, default_value_t = 50)]
    spin_ms: u32,
}

fn main() -> anyhow::Result<()> {
    zeforge::init_logging_default();
    let cli = Cli::parse();

    let backend = HostBackend::new();
    kernels::register_reference_kernels(&backend);
    let ctx = Context::new(backend).context("context creation")?;

    let props = ctx.device().clone();
    println!("Device: {}", props.name);
    println!("Timer resolution: {} ns/tick", props.timer_resolution);

    let ordinal = ctx.compute_ordinal()?;
    let list =
        ctx.create_command_list(ListDesc::immediate(OrderingMode::InOrder).with_ordinal(ordinal))?;
    let pool = ctx.create_event_pool(10)?;
    let end_event = pool.allocate_event()?;
    let fence = pool.allocate_event()?;

    // Timestamp scratch mirrors the copy-out pattern: the device writes its
    // clock into device memory, a copy brings it home.
    let scratch = ctx.allocate_memory(MemoryKind::Shared, 8)?;

    let module = ctx.compile_module(kernels::REFERENCE_MANIFEST)?;
    let kernel = module.kernel("spin")?;
    kernel.set_arg(0, KernelArg::U32(cli.spin_ms))?;

    let before = ctx.global_timestamps()?;
    let host_timer = HostTimer::start();

    println!("Launching kernel");
    list.append_launch_kernel(&kernel, GroupCount::new(1, 1, 1), Some(&end_event), &[])?;
    println!("Kernel launched");
    list.append_copy(&scratch, 0, &scratch, 0, 8, None, &[&end_event])?;
    list.append_barrier(Some(&fence), &[])?;

    print!("Host synchronize ...");
    fence.wait(Some(Duration::from_secs(30)))?;
    end_event.wait(Some(Duration::from_secs(30)))?;
    println!(" complete");

    let host_ms = host_timer.elapsed_ms();
    let after = ctx.global_timestamps()?;
    let clock = DeviceClock::new(props.timer_resolution);
    let kernel_ts = end_event.kernel_timestamp()?;

    println!("Host clock:                {:.3} ms", host_ms);
    println!(
        "Global timestamps (host):  {:.3} ms",
        clock.span_ms(before.host_ticks, after.host_ticks)
    );
    println!(
        "Global timestamps (device): {:.3} ms",
        clock.span_ms(before.device_ticks, after.device_ticks)
    );
    println!("Kernel timestamp:          {:.3} ms", clock.kernel_ms(kernel_ts));

    Ok(())
}
