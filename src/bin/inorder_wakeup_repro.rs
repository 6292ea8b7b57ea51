//! Host-signal wakeup reproducer
//!
//! A barrier gated on a host-signaled event is submitted to a queue; a
//! second thread signals the event a beat later. On a healthy backend the
//! barrier wakes and the list retires on both in-order and out-of-order
//! queues. A watchdog timeout turns a stuck queue into a reported FAIL
//! instead of a wedged process; a stuck queue is deliberately not drained.
//!
//! Exit code 0 when both orderings pass.

use anyhow::Context as _;
use clap::Parser;
use std::time::Duration;

use zeforge::{
    CommandQueue, Context, EventPool, ListDesc, OrderingMode, QueueDesc, QueueMode, ZeForgeError,
};
use zeforge::{HostBackend, HostBackendConfig};

#[derive(Parser, Debug)]
#[command(name = "inorder-wakeup-repro", version)]
#[command(about = "Host-signaled event waking a barrier on in-order and out-of-order queues", long_about = None)]
struct Cli {
    /// Delay before the helper thread signals the user event, in
    /// milliseconds
    #[arg(long, default_value_t = 100)]
    signal_delay_ms: u64,

    /// Watchdog timeout per queue test, in seconds
    #[arg(long, default_value_t = 3)]
    watchdog_secs: u64,
}

fn test_queue(
    ctx: &Context,
    pool: &EventPool,
    queue: &CommandQueue,
    ordering: OrderingMode,
    cli: &Cli,
) -> anyhow::Result<bool> {
    println!(
        "\n=== Testing {} list ===",
        match ordering {
            OrderingMode::InOrder => "IN-ORDER",
            OrderingMode::OutOfOrder => "OUT-OF-ORDER",
        }
    );

    let user_event = pool.allocate_event()?;
    let finished = pool.allocate_event()?;

    let list = ctx.create_command_list(ListDesc::deferred(ordering).with_ordinal(queue.ordinal()))?;
    list.append_barrier(Some(&finished), &[&user_event])?;
    list.close()?;
    queue.submit(&list)?;

    let signaler = user_event.clone();
    let delay = Duration::from_millis(cli.signal_delay_ms);
    std::thread::spawn(move || {
        std::thread::sleep(delay);
        println!("Signaling user event...");
        match signaler.signal() {
            Ok(()) => println!("signal returned: ok"),
            Err(e) => println!("signal returned: {}", e),
        }
    });

    match finished.wait(Some(Duration::from_secs(cli.watchdog_secs))) {
        Ok(()) => {
            println!("PASSED - barrier woke up");
            queue.drain()?;
            Ok(true)
        }
        Err(ZeForgeError::TimedOut { waited_ms }) => {
            // The queue is stuck; leave it undrained.
            println!("FAILED - barrier still blocked after {} ms", waited_ms);
            Ok(false)
        }
        Err(e) => Err(e).context("waiting for the barrier's completion event"),
    }
}

fn main() -> anyhow::Result<()> {
    zeforge::init_logging_default();
    let cli = Cli::parse();

    let backend = HostBackend::with_config(HostBackendConfig::default());
    let ctx = Context::new(backend).context("context creation")?;
    println!("Device: {}", ctx.device().name);

    let ordinal = ctx.compute_ordinal()?;
    let pool = ctx.create_event_pool(16)?;

    let in_order_queue = ctx.create_queue(QueueDesc {
        ordinal,
        index: 0,
        mode: QueueMode::Asynchronous,
    })?;
    let out_of_order_queue = ctx.create_queue(QueueDesc {
        ordinal,
        index: 1,
        mode: QueueMode::Asynchronous,
    })?;

    let in_order_ok = test_queue(&ctx, &pool, &in_order_queue, OrderingMode::InOrder, &cli)?;
    let out_of_order_ok =
        test_queue(&ctx, &pool, &out_of_order_queue, OrderingMode::OutOfOrder, &cli)?;

    println!("\n=== Summary ===");
    println!(
        "In-order list:     {}",
        if in_order_ok { "PASS" } else { "FAIL (wakeup lost!)" }
    );
    println!(
        "Out-of-order list: {}",
        if out_of_order_ok { "PASS" } else { "FAIL" }
    );

    if in_order_ok && out_of_order_ok {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
