//! Cross-list event compatibility
//!
//! The hazard sequence: signal an event on an immediate list, wait on it on
//! the same list, synchronize and reset it, then use it as a wait
//! dependency on a newly created deferred list. Depending on backend
//! capability and compatibility mode the final append either succeeds or
//! returns a reported error - it must never hang, and the failure must
//! never be swallowed.

use std::sync::mpsc;
use std::time::Duration;

use zeforge::{
    CompatMode, Context, ContextConfig, HostBackend, HostBackendConfig, ListDesc, OrderingMode,
    Status, ZeForgeError,
};

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Accepted,
    RejectedByBackend(Status),
    RejectedByScheduler,
}

/// Run the full hazard sequence and classify the critical append's result
fn run_hazard_sequence(interop: bool, compat: CompatMode) -> Outcome {
    let backend = HostBackend::with_config(
        HostBackendConfig::default().with_immediate_event_interop(interop),
    );
    let ctx = Context::with_config(backend, ContextConfig::new().with_compat_mode(compat))
        .expect("context creation");

    let immediate = ctx
        .create_command_list(ListDesc::immediate(OrderingMode::InOrder))
        .unwrap();
    let pool = ctx.create_event_pool(8).unwrap();
    let event = pool.allocate_event().unwrap();

    immediate.append_barrier(Some(&event), &[]).unwrap();
    immediate.append_barrier(None, &[&event]).unwrap();
    event.wait(Some(Duration::from_secs(10))).unwrap();
    immediate
        .synchronize(Some(Duration::from_secs(10)))
        .unwrap();
    event.reset().unwrap();

    let regular = ctx
        .create_command_list(ListDesc::deferred(OrderingMode::InOrder))
        .unwrap();
    let ack = pool.allocate_event().unwrap();

    match regular.append_barrier(Some(&ack), &[&event]) {
        Ok(()) => Outcome::Accepted,
        Err(ZeForgeError::Backend { code, .. }) => Outcome::RejectedByBackend(code),
        Err(ZeForgeError::EventIncompatible { .. }) => Outcome::RejectedByScheduler,
        Err(other) => panic!("outcome outside the permitted two: {}", other),
    }
}

/// The scenario must resolve promptly - a hang is a failure in itself
fn with_watchdog(f: impl FnOnce() -> Outcome + Send + 'static) -> Outcome {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(f());
    });
    rx.recv_timeout(Duration::from_secs(30))
        .expect("hazard sequence deadlocked")
}

#[test]
fn test_passthrough_surfaces_backend_rejection() {
    let outcome = with_watchdog(|| run_hazard_sequence(false, CompatMode::Passthrough));
    assert_eq!(
        outcome,
        Outcome::RejectedByBackend(Status::ERROR_INVALID_ARGUMENT)
    );
}

#[test]
fn test_passthrough_accepts_when_backend_documents_interop() {
    let outcome = with_watchdog(|| run_hazard_sequence(true, CompatMode::Passthrough));
    assert_eq!(outcome, Outcome::Accepted);
}

#[test]
fn test_strict_fails_fast_without_backend_interop() {
    let outcome = with_watchdog(|| run_hazard_sequence(false, CompatMode::Strict));
    assert_eq!(outcome, Outcome::RejectedByScheduler);
}

#[test]
fn test_strict_defers_to_documented_interop() {
    let outcome = with_watchdog(|| run_hazard_sequence(true, CompatMode::Strict));
    assert_eq!(outcome, Outcome::Accepted);
}

#[test]
fn test_unreset_immediate_event_stays_usable_on_deferred_lists() {
    // Only the reset makes the combination hazardous
    let backend =
        HostBackend::with_config(HostBackendConfig::default().with_immediate_event_interop(false));
    let ctx = Context::new(backend).unwrap();

    let immediate = ctx
        .create_command_list(ListDesc::immediate(OrderingMode::InOrder))
        .unwrap();
    let pool = ctx.create_event_pool(8).unwrap();
    let event = pool.allocate_event().unwrap();
    immediate.append_barrier(Some(&event), &[]).unwrap();
    event.wait(Some(Duration::from_secs(10))).unwrap();

    let regular = ctx
        .create_command_list(ListDesc::deferred(OrderingMode::InOrder))
        .unwrap();
    regular.append_barrier(None, &[&event]).unwrap();
}

#[test]
fn test_deferred_origin_event_reset_is_not_hazardous() {
    let backend =
        HostBackend::with_config(HostBackendConfig::default().with_immediate_event_interop(false));
    let ctx = Context::with_config(
        backend,
        ContextConfig::new().with_compat_mode(CompatMode::Strict),
    )
    .unwrap();

    let first = ctx
        .create_command_list(ListDesc::deferred(OrderingMode::InOrder))
        .unwrap();
    let pool = ctx.create_event_pool(8).unwrap();
    let event = pool.allocate_event().unwrap();
    first.append_barrier(Some(&event), &[]).unwrap();
    event.signal().unwrap();
    event.reset().unwrap();

    // Deferred origin: reuse on another deferred list stays legal
    let second = ctx
        .create_command_list(ListDesc::deferred(OrderingMode::InOrder))
        .unwrap();
    second.append_barrier(None, &[&event]).unwrap();
}

#[test]
fn test_state_survives_rejection() {
    // A rejected append must not corrupt the event or the list: both stay
    // usable afterwards
    let backend =
        HostBackend::with_config(HostBackendConfig::default().with_immediate_event_interop(false));
    let ctx = Context::new(backend).unwrap();

    let immediate = ctx
        .create_command_list(ListDesc::immediate(OrderingMode::InOrder))
        .unwrap();
    let pool = ctx.create_event_pool(8).unwrap();
    let event = pool.allocate_event().unwrap();
    immediate.append_barrier(Some(&event), &[]).unwrap();
    event.wait(Some(Duration::from_secs(10))).unwrap();
    event.reset().unwrap();

    let regular = ctx
        .create_command_list(ListDesc::deferred(OrderingMode::InOrder))
        .unwrap();
    assert!(regular.append_barrier(None, &[&event]).is_err());

    // The list accepts unrelated work and runs it to completion
    let pool2_event = pool.allocate_event().unwrap();
    regular.append_barrier(Some(&pool2_event), &[]).unwrap();
    regular.close().unwrap();
    let queue = ctx.create_queue(Default::default()).unwrap();
    queue.submit(&regular).unwrap();
    queue.drain().unwrap();
    assert_eq!(pool2_event.query().unwrap(), zeforge::EventStatus::Signaled);

    // The event itself still signals and resets
    event.signal().unwrap();
    event.reset().unwrap();
}
