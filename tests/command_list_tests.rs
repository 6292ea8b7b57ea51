//! Command-list state machine and ordering guarantees

use std::sync::{Arc, Mutex};
use std::time::Duration;

use zeforge::{
    Context, GroupCount, HostBackend, KernelArg, ListDesc, OrderingMode, QueueDesc, QueueMode,
    ZeForgeError,
};

/// Backend plus a completion log fed by a `mark` kernel: each launch
/// appends its scalar argument when it executes on the "device"
fn marking_backend() -> (Arc<HostBackend>, Arc<Mutex<Vec<u32>>>) {
    let backend = HostBackend::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    backend.register_kernel("mark", move |ctx| {
        if let Some(value) = ctx.scalar_u32(0) {
            sink.lock().unwrap().push(value);
        }
    });
    (backend, log)
}

#[test]
fn test_in_order_list_completes_in_program_order() {
    let (backend, log) = marking_backend();
    let ctx = Context::new(backend).unwrap();
    let list = ctx
        .create_command_list(ListDesc::immediate(OrderingMode::InOrder))
        .unwrap();
    let pool = ctx.create_event_pool(4).unwrap();
    let done = pool.allocate_event().unwrap();

    let module = ctx.compile_module(b"mark\n").unwrap();
    let kernel = module.kernel("mark").unwrap();
    for value in [1u32, 2, 3] {
        kernel.set_arg(0, KernelArg::U32(value)).unwrap();
        list.append_launch_kernel(&kernel, GroupCount::new(1, 1, 1), None, &[])
            .unwrap();
    }
    list.append_barrier(Some(&done), &[]).unwrap();

    done.wait(Some(Duration::from_secs(10))).unwrap();
    assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
}

#[test]
fn test_out_of_order_list_obeys_event_expressed_order() {
    let (backend, log) = marking_backend();
    let ctx = Context::new(backend).unwrap();
    let list = ctx
        .create_command_list(ListDesc::immediate(OrderingMode::OutOfOrder))
        .unwrap();
    let pool = ctx.create_event_pool(4).unwrap();
    let after_a = pool.allocate_event().unwrap();
    let after_b = pool.allocate_event().unwrap();
    let done = pool.allocate_event().unwrap();

    let module = ctx.compile_module(b"mark\n").unwrap();
    let kernel = module.kernel("mark").unwrap();

    // Dependencies expressed only through events: C waits B waits A
    kernel.set_arg(0, KernelArg::U32(1)).unwrap();
    list.append_launch_kernel(&kernel, GroupCount::new(1, 1, 1), Some(&after_a), &[])
        .unwrap();
    kernel.set_arg(0, KernelArg::U32(2)).unwrap();
    list.append_launch_kernel(&kernel, GroupCount::new(1, 1, 1), Some(&after_b), &[&after_a])
        .unwrap();
    kernel.set_arg(0, KernelArg::U32(3)).unwrap();
    list.append_launch_kernel(&kernel, GroupCount::new(1, 1, 1), Some(&done), &[&after_b])
        .unwrap();

    done.wait(Some(Duration::from_secs(10))).unwrap();
    assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
}

#[test]
fn test_immediate_list_rejects_close_and_reset() {
    let ctx = Context::new(HostBackend::new()).unwrap();
    let list = ctx
        .create_command_list(ListDesc::immediate(OrderingMode::InOrder))
        .unwrap();
    assert!(matches!(list.close(), Err(ZeForgeError::InvalidState(_))));
    assert!(matches!(list.reset(), Err(ZeForgeError::InvalidState(_))));
}

#[test]
fn test_deferred_list_rejects_append_after_close() {
    let ctx = Context::new(HostBackend::new()).unwrap();
    let list = ctx
        .create_command_list(ListDesc::deferred(OrderingMode::InOrder))
        .unwrap();
    list.append_barrier(None, &[]).unwrap();
    list.close().unwrap();
    assert!(matches!(
        list.append_barrier(None, &[]),
        Err(ZeForgeError::InvalidState(_))
    ));
}

#[test]
fn test_deferred_list_executes_only_on_submit() {
    let (backend, log) = marking_backend();
    let ctx = Context::new(backend).unwrap();
    let queue = ctx.create_queue(QueueDesc::default()).unwrap();
    let list = ctx
        .create_command_list(ListDesc::deferred(OrderingMode::InOrder))
        .unwrap();

    let module = ctx.compile_module(b"mark\n").unwrap();
    let kernel = module.kernel("mark").unwrap();
    kernel.set_arg(0, KernelArg::U32(7)).unwrap();
    list.append_launch_kernel(&kernel, GroupCount::new(1, 1, 1), None, &[])
        .unwrap();
    list.close().unwrap();

    // Accumulated but not dispatched
    assert!(log.lock().unwrap().is_empty());

    // A closed list may be submitted any number of times until reset
    queue.submit(&list).unwrap();
    queue.submit(&list).unwrap();
    queue.drain().unwrap();
    assert_eq!(*log.lock().unwrap(), vec![7, 7]);
}

#[test]
fn test_arguments_snapshot_at_append() {
    let (backend, log) = marking_backend();
    let ctx = Context::new(backend).unwrap();
    let queue = ctx.create_queue(QueueDesc::default()).unwrap();
    let list = ctx
        .create_command_list(ListDesc::deferred(OrderingMode::InOrder))
        .unwrap();

    let module = ctx.compile_module(b"mark\n").unwrap();
    let kernel = module.kernel("mark").unwrap();
    kernel.set_arg(0, KernelArg::U32(1)).unwrap();
    list.append_launch_kernel(&kernel, GroupCount::new(1, 1, 1), None, &[])
        .unwrap();
    // Rebinding after the append must not affect the recorded launch
    kernel.set_arg(0, KernelArg::U32(2)).unwrap();
    list.append_launch_kernel(&kernel, GroupCount::new(1, 1, 1), None, &[])
        .unwrap();
    list.close().unwrap();
    queue.submit(&list).unwrap();
    queue.drain().unwrap();
    assert_eq!(*log.lock().unwrap(), vec![1, 2]);
}

#[test]
fn test_reset_fails_while_submission_in_flight() {
    let ctx = Context::new(HostBackend::new()).unwrap();
    let queue = ctx.create_queue(QueueDesc::default()).unwrap();
    let pool = ctx.create_event_pool(4).unwrap();
    let gate = pool.allocate_event().unwrap();
    let list = ctx
        .create_command_list(ListDesc::deferred(OrderingMode::InOrder))
        .unwrap();

    // The barrier blocks device-side until the gate is signaled, keeping
    // the submission in flight
    list.append_barrier(None, &[&gate]).unwrap();
    list.close().unwrap();
    queue.submit(&list).unwrap();

    let err = list.reset().unwrap_err();
    assert!(matches!(err, ZeForgeError::Backend { call: "reset_list", .. }));

    gate.signal().unwrap();
    queue.drain().unwrap();

    // Retired now; reset reopens the list for appends
    list.reset().unwrap();
    list.append_barrier(None, &[]).unwrap();
    list.close().unwrap();
    queue.submit(&list).unwrap();
    queue.drain().unwrap();
}

#[test]
fn test_list_synchronize_times_out_while_blocked() {
    let ctx = Context::new(HostBackend::new()).unwrap();
    let pool = ctx.create_event_pool(4).unwrap();
    let gate = pool.allocate_event().unwrap();
    let list = ctx
        .create_command_list(ListDesc::immediate(OrderingMode::InOrder))
        .unwrap();

    list.append_barrier(None, &[&gate]).unwrap();
    let err = list.synchronize(Some(Duration::from_millis(30))).unwrap_err();
    assert!(matches!(err, ZeForgeError::TimedOut { .. }));

    gate.signal().unwrap();
    list.synchronize(Some(Duration::from_secs(10))).unwrap();
}

#[test]
fn test_device_memory_first_touch_via_copies() {
    use zeforge::backend::host::kernels;
    use zeforge::MemoryKind;

    let backend = HostBackend::new();
    kernels::register_reference_kernels(&backend);
    let ctx = Context::new(backend).unwrap();
    let list = ctx
        .create_command_list(ListDesc::immediate(OrderingMode::InOrder))
        .unwrap();
    let pool = ctx.create_event_pool(4).unwrap();
    let done = pool.allocate_event().unwrap();

    // Device memory is not host-accessible; first touch goes through a copy
    let staging = ctx.allocate_memory(MemoryKind::Host, 4).unwrap();
    let device = ctx.allocate_memory(MemoryKind::Device, 4).unwrap();
    let readback = ctx.allocate_memory(MemoryKind::Host, 4).unwrap();
    assert!(device.write_bytes(0, &[0, 0, 0, 0]).is_err());

    staging.write_bytes(0, &0u32.to_le_bytes()).unwrap();
    list.append_copy(&device, 0, &staging, 0, 4, None, &[])
        .unwrap();
    list.append_barrier(None, &[]).unwrap();

    let module = ctx.compile_module(kernels::REFERENCE_MANIFEST).unwrap();
    let kernel = module.kernel("set_one").unwrap();
    kernel.set_arg(0, device.as_arg()).unwrap();
    list.append_launch_kernel(&kernel, GroupCount::new(1, 1, 1), None, &[])
        .unwrap();

    list.append_copy(&readback, 0, &device, 0, 4, Some(&done), &[])
        .unwrap();
    done.wait(Some(Duration::from_secs(10))).unwrap();
    assert_eq!(readback.read_u32().unwrap(), vec![1]);
}

#[test]
fn test_submit_requires_matching_queue_mode_acceptance() {
    // Synchronous-mode submission returns once the backend accepts the
    // work, which must not require completion
    let ctx = Context::new(HostBackend::new()).unwrap();
    let queue = ctx
        .create_queue(QueueDesc { ordinal: 0, index: 0, mode: QueueMode::Synchronous })
        .unwrap();
    let pool = ctx.create_event_pool(4).unwrap();
    let gate = pool.allocate_event().unwrap();
    let done = pool.allocate_event().unwrap();
    let list = ctx
        .create_command_list(ListDesc::deferred(OrderingMode::InOrder))
        .unwrap();

    list.append_barrier(Some(&done), &[&gate]).unwrap();
    list.close().unwrap();
    // Would deadlock if synchronous submission waited for completion
    queue.submit(&list).unwrap();

    gate.signal().unwrap();
    done.wait(Some(Duration::from_secs(10))).unwrap();
    queue.drain().unwrap();
}
