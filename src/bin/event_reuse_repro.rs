//! Immediate-to-deferred event reuse reproducer
//!
//! Replays the failure sequence: an event signaled and waited on an
//! immediate command list, synchronized and reset, then used as a wait
//! dependency when appending a barrier to a freshly created deferred
//! (regular) list. Backends that document immediate/deferred event
//! interoperability accept the final append; others reject it with an
//! invalid-argument status. Either outcome is legitimate - what must never
//! happen is a hang or masked status.
//!
//! Exit code 0 when the append succeeds, 1 when the rejection reproduces.

use anyhow::Context as _;
use clap::Parser;
use std::time::Duration;

use zeforge::{
    CompatMode, Context, ContextConfig, HostBackend, HostBackendConfig, ListDesc, OrderingMode,
    QueueDesc, QueueMode, ZeForgeError,
};

#[derive(Parser, Debug)]
#[command(name = "event-reuse-repro", version)]
#[command(about = "Event used on an immediate list, reset, then waited on a regular list", long_about = None)]
struct Cli {
    /// Make the backend accept cross-origin reuse (the non-reproducing
    /// driver behavior)
    #[arg(long)]
    interop: bool,

    /// Fail fast in the scheduler instead of passing the append through to
    /// the backend
    #[arg(long)]
    strict: bool,
}

fn main() -> anyhow::Result<()> {
    zeforge::init_logging_default();
    let cli = Cli::parse();

    println!("=== Immediate/regular event reuse reproducer ===\n");

    let backend = HostBackend::with_config(
        HostBackendConfig::default().with_immediate_event_interop(cli.interop),
    );
    let compat = if cli.strict { CompatMode::Strict } else { CompatMode::Passthrough };
    let ctx = Context::with_config(backend, ContextConfig::new().with_compat_mode(compat))
        .context("context creation")?;

    println!("Device: {}", ctx.device().name);
    println!("Backend documents immediate/deferred interop: {}", cli.interop);
    println!("Compatibility mode: {:?}\n", compat);

    let ordinal = ctx.compute_ordinal()?;
    let _queue = ctx.create_queue(QueueDesc {
        ordinal,
        index: 0,
        mode: QueueMode::Asynchronous,
    })?;
    let immediate =
        ctx.create_command_list(ListDesc::immediate(OrderingMode::InOrder).with_ordinal(ordinal))?;
    let pool = ctx.create_event_pool(100)?;

    let callback_done = pool.allocate_event()?;
    println!("1. Created event (index {})", callback_done.index());

    println!("2. Barrier on IMMEDIATE (signal)...");
    immediate.append_barrier(Some(&callback_done), &[])?;
    println!("   SUCCESS");

    println!("3. Barrier on IMMEDIATE (wait)...");
    immediate.append_barrier(None, &[&callback_done])?;
    println!("   SUCCESS");

    println!("4. Synchronize...");
    callback_done.wait(Some(Duration::from_secs(10)))?;
    immediate.synchronize(Some(Duration::from_secs(10)))?;
    println!("   SUCCESS");

    println!("5. Reset event...");
    callback_done.reset()?;
    println!("   SUCCESS");

    println!("6. Create REGULAR command list...");
    let regular =
        ctx.create_command_list(ListDesc::deferred(OrderingMode::InOrder).with_ordinal(ordinal))?;
    println!("   Created");

    let gpu_ready = pool.allocate_event()?;
    println!("7. Barrier on REGULAR (GpuReady signal)...");
    regular.append_barrier(Some(&gpu_ready), &[])?;
    println!("   SUCCESS");

    let gpu_ack = pool.allocate_event()?;
    println!("\n8. THE CRITICAL CALL:");
    println!("   append_barrier(");
    println!("     list   = REGULAR,");
    println!("     signal = GpuAck (index {}),", gpu_ack.index());
    println!("     waits  = [index {}] (was used on IMMEDIATE, then reset)", callback_done.index());
    println!("   )");

    match regular.append_barrier(Some(&gpu_ack), &[&callback_done]) {
        Ok(()) => {
            println!("\n   -> SUCCESS");
            println!("\n*** Issue does NOT reproduce on this backend ***");
            println!("\n=== Done ===");
            Ok(())
        }
        Err(err @ ZeForgeError::Backend { .. }) => {
            println!("\n   -> {}", err);
            println!("\n*** REPRODUCED the cross-origin rejection ***");
            println!("Root cause: an event used on an IMMEDIATE list cannot be");
            println!("used as a WAIT on a REGULAR list after reset.");
            println!("\n=== Done ===");
            std::process::exit(1);
        }
        Err(err @ ZeForgeError::EventIncompatible { .. }) => {
            println!("\n   -> {}", err);
            println!("\n*** Rejected fast by the strict compatibility mode ***");
            println!("\n=== Done ===");
            std::process::exit(1);
        }
        Err(other) => {
            // Anything outside the two permitted outcomes is a scheduler bug
            println!("\n   -> unexpected {:?} error: {}", other.category(), other);
            Err(other).context("critical append returned an unexpected error")
        }
    }
}
