//! In-process simulated device backend
//!
//! `HostBackend` implements the full [`DeviceBackend`] contract with worker
//! threads standing in for the device: immediate in-order lists get a
//! dedicated worker that runs operations in program order, out-of-order work
//! runs each operation on its own thread gated only by wait events, and each
//! queue owns a worker that executes submitted lists FIFO. Events are
//! mutex+condvar cells, memory is plain byte vectors, and kernels are host
//! closures registered by name.
//!
//! The backend also emulates the driver behavior the reproducers target:
//! with `immediate_event_interop` disabled, an event first signaled on an
//! immediate list and later reset is rejected (`ERROR_INVALID_ARGUMENT`)
//! when appended as a wait dependency on a deferred list.

pub mod kernels;
mod worker;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::backend::{
    BackendResult, Capabilities, DeviceBackend, DeviceProps, EventHandle, EventPoolHandle,
    ExecutionMode, GroupCount, KernelArg, KernelHandle, KernelTimestamp, ListDesc, ListHandle,
    MemHandle, MemoryKind, ModuleHandle, OrderingMode, QueueDesc, QueueGroupProps, QueueHandle,
    Status,
};

pub use worker::KernelCtx;
use worker::{OpKind, OpRecord, QueueWork, ResolvedArg, TimeBase};

/// Host kernel entry point: a closure invoked once per dispatch
pub type HostKernelFn = Arc<dyn Fn(&KernelCtx) + Send + Sync>;

/// Configuration for the simulated device
#[derive(Debug, Clone)]
pub struct HostBackendConfig {
    /// Device name reported by `device_properties`
    pub device_name: String,
    /// Whether reset immediate-origin events stay usable as wait
    /// dependencies on deferred lists
    pub immediate_event_interop: bool,
    /// Whether indivisible dispatch shapes are allowed (ceil-division)
    pub partial_groups: bool,
    /// Nanoseconds per device timestamp tick
    pub timer_resolution: u64,
    /// Queue groups reported by the device; at least one must be compute
    pub queue_groups: Vec<QueueGroupProps>,
}

impl Default for HostBackendConfig {
    fn default() -> Self {
        Self {
            device_name: "ZeForge Host Device".to_string(),
            immediate_event_interop: true,
            partial_groups: false,
            timer_resolution: 10,
            queue_groups: vec![
                QueueGroupProps { compute: true, copy: true },
                QueueGroupProps { compute: false, copy: true },
            ],
        }
    }
}

impl HostBackendConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    pub fn with_immediate_event_interop(mut self, interop: bool) -> Self {
        self.immediate_event_interop = interop;
        self
    }

    pub fn with_partial_groups(mut self, partial: bool) -> Self {
        self.partial_groups = partial;
        self
    }

    pub fn with_timer_resolution(mut self, ns_per_tick: u64) -> Self {
        self.timer_resolution = ns_per_tick;
        self
    }
}

pub(crate) struct EventCell {
    pub(crate) state: Mutex<EventState>,
    pub(crate) cv: Condvar,
}

#[derive(Default)]
pub(crate) struct EventState {
    pub(crate) signaled: bool,
    /// Execution mode of the list that first appended this event as a
    /// signal target
    pub(crate) first_signal_origin: Option<ExecutionMode>,
    /// Set when the event is reset after immediate-list use; the input to
    /// the interop rejection
    pub(crate) reset_after_immediate: bool,
    pub(crate) kernel_ts: Option<KernelTimestamp>,
}

struct PoolCell {
    capacity: u32,
    used: Mutex<Vec<bool>>,
}

struct EventEntry {
    cell: Arc<EventCell>,
    pool: u64,
    index: u32,
}

pub(crate) struct BufferCell {
    pub(crate) kind: MemoryKind,
    pub(crate) data: Mutex<Vec<u8>>,
}

struct KernelCell {
    name: String,
    func: HostKernelFn,
    args: Mutex<Vec<Option<KernelArg>>>,
}

pub(crate) struct ListCell {
    pub(crate) desc: ListDesc,
    pub(crate) body: Mutex<ListBody>,
    pub(crate) done: Condvar,
    /// Channel to the dedicated worker of an immediate in-order list
    imm_tx: Option<Mutex<mpsc::Sender<OpRecord>>>,
}

#[derive(Default)]
pub(crate) struct ListBody {
    pub(crate) closed: bool,
    pub(crate) ops: Vec<OpRecord>,
    /// Immediate lists: operations enqueued but not yet retired
    pub(crate) inflight_ops: usize,
    /// Deferred lists: submissions not yet retired
    pub(crate) pending_submissions: usize,
}

struct QueueCell {
    mode: crate::backend::QueueMode,
    tx: Mutex<mpsc::Sender<QueueWork>>,
    inflight: Mutex<usize>,
    idle: Condvar,
}

/// In-process simulated device backend
pub struct HostBackend {
    config: HostBackendConfig,
    time: Arc<TimeBase>,
    next_handle: AtomicU64,
    events: Mutex<HashMap<u64, EventEntry>>,
    pools: Mutex<HashMap<u64, Arc<PoolCell>>>,
    buffers: Mutex<HashMap<u64, Arc<BufferCell>>>,
    modules: Mutex<HashMap<u64, Vec<String>>>,
    kernels: Mutex<HashMap<u64, Arc<KernelCell>>>,
    lists: Mutex<HashMap<u64, Arc<ListCell>>>,
    queues: Mutex<HashMap<u64, Arc<QueueCell>>>,
    registered: Mutex<HashMap<String, HostKernelFn>>,
    last_build_log: Mutex<Option<String>>,
}

impl std::fmt::Debug for HostBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBackend")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HostBackend {
    /// Create a backend with the default configuration
    pub fn new() -> Arc<Self> {
        Self::with_config(HostBackendConfig::default())
    }

    pub fn with_config(config: HostBackendConfig) -> Arc<Self> {
        tracing::debug!(device = %config.device_name, "HostBackend: creating");
        Arc::new(HostBackend {
            time: Arc::new(TimeBase {
                epoch: Instant::now(),
                timer_resolution: config.timer_resolution.max(1),
            }),
            config,
            next_handle: AtomicU64::new(1),
            events: Mutex::new(HashMap::new()),
            pools: Mutex::new(HashMap::new()),
            buffers: Mutex::new(HashMap::new()),
            modules: Mutex::new(HashMap::new()),
            kernels: Mutex::new(HashMap::new()),
            lists: Mutex::new(HashMap::new()),
            queues: Mutex::new(HashMap::new()),
            registered: Mutex::new(HashMap::new()),
            last_build_log: Mutex::new(None),
        })
    }

    /// Register a host closure as the implementation of a named kernel.
    ///
    /// Modules resolve kernel names against this registry in `get_kernel`.
    pub fn register_kernel<F>(&self, name: impl Into<String>, func: F)
    where
        F: Fn(&KernelCtx) + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!(kernel = %name, "HostBackend: registering kernel");
        self.registered
            .lock()
            .expect("kernel registry lock")
            .insert(name, Arc::new(func));
    }

    fn alloc_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn event(&self, h: EventHandle) -> BackendResult<Arc<EventCell>> {
        self.events
            .lock()
            .map_err(|_| Status::ERROR_DEVICE_LOST)?
            .get(&h.0)
            .map(|entry| Arc::clone(&entry.cell))
            .ok_or(Status::ERROR_INVALID_ARGUMENT)
    }

    fn buffer(&self, h: MemHandle) -> BackendResult<Arc<BufferCell>> {
        self.buffers
            .lock()
            .map_err(|_| Status::ERROR_DEVICE_LOST)?
            .get(&h.0)
            .cloned()
            .ok_or(Status::ERROR_INVALID_ARGUMENT)
    }

    fn list(&self, h: ListHandle) -> BackendResult<Arc<ListCell>> {
        self.lists
            .lock()
            .map_err(|_| Status::ERROR_DEVICE_LOST)?
            .get(&h.0)
            .cloned()
            .ok_or(Status::ERROR_INVALID_ARGUMENT)
    }

    fn queue(&self, h: QueueHandle) -> BackendResult<Arc<QueueCell>> {
        self.queues
            .lock()
            .map_err(|_| Status::ERROR_DEVICE_LOST)?
            .get(&h.0)
            .cloned()
            .ok_or(Status::ERROR_INVALID_ARGUMENT)
    }

    fn resolve_waits(&self, waits: &[EventHandle]) -> BackendResult<Vec<Arc<EventCell>>> {
        waits.iter().map(|w| self.event(*w)).collect()
    }

    /// Shared prologue for the three append primitives: lifecycle checks,
    /// the interop rejection, and origin stamping on the signal event.
    fn prepare_append(
        &self,
        list: &Arc<ListCell>,
        signal: Option<EventHandle>,
        waits: &[EventHandle],
    ) -> BackendResult<(Option<Arc<EventCell>>, Vec<Arc<EventCell>>)> {
        if list.desc.execution == ExecutionMode::Deferred {
            let body = list.body.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?;
            if body.closed {
                return Err(Status::ERROR_INVALID_ARGUMENT);
            }
        }

        let wait_cells = self.resolve_waits(waits)?;
        if list.desc.execution == ExecutionMode::Deferred && !self.config.immediate_event_interop {
            for cell in &wait_cells {
                let st = cell.state.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?;
                if st.first_signal_origin == Some(ExecutionMode::Immediate)
                    && st.reset_after_immediate
                {
                    tracing::debug!(
                        "HostBackend: rejecting reset immediate-origin event as wait on deferred list"
                    );
                    return Err(Status::ERROR_INVALID_ARGUMENT);
                }
            }
        }

        let signal_cell = match signal {
            Some(h) => {
                let cell = self.event(h)?;
                {
                    let mut st = cell.state.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?;
                    if st.first_signal_origin.is_none() {
                        st.first_signal_origin = Some(list.desc.execution);
                    }
                }
                Some(cell)
            }
            None => None,
        };
        Ok((signal_cell, wait_cells))
    }

    /// Route a prepared operation: immediate lists dispatch eagerly,
    /// deferred lists accumulate.
    fn enqueue_op(&self, list: &Arc<ListCell>, op: OpRecord) -> BackendResult<()> {
        match list.desc.execution {
            ExecutionMode::Deferred => {
                let mut body = list.body.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?;
                body.ops.push(op);
                Ok(())
            }
            ExecutionMode::Immediate => {
                {
                    let mut body = list.body.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?;
                    body.inflight_ops += 1;
                }
                match (list.desc.ordering, &list.imm_tx) {
                    (OrderingMode::InOrder, Some(tx)) => {
                        let tx = tx.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?;
                        tx.send(op).map_err(|_| Status::ERROR_DEVICE_LOST)?;
                    }
                    _ => {
                        // Out-of-order: the device may parallelize freely,
                        // so each operation gets its own thread.
                        let time = Arc::clone(&self.time);
                        let list = Arc::clone(list);
                        std::thread::spawn(move || {
                            worker::execute_op(&op, &time);
                            worker::retire_immediate_op(&list);
                        });
                    }
                }
                Ok(())
            }
        }
    }

    fn resolve_kernel(&self, kernel: KernelHandle) -> BackendResult<(String, HostKernelFn, Vec<ResolvedArg>)> {
        let cell = self
            .kernels
            .lock()
            .map_err(|_| Status::ERROR_DEVICE_LOST)?
            .get(&kernel.0)
            .cloned()
            .ok_or(Status::ERROR_INVALID_ARGUMENT)?;
        let slots = cell.args.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?.clone();
        let mut resolved = Vec::with_capacity(slots.len());
        for slot in slots {
            // Arguments snapshot at append time; holes are rejected here
            let arg = slot.ok_or(Status::ERROR_INVALID_ARGUMENT)?;
            resolved.push(match arg {
                KernelArg::Buffer(mem) => ResolvedArg::Buffer(self.buffer(mem)?),
                KernelArg::I32(v) => ResolvedArg::I32(v),
                KernelArg::U32(v) => ResolvedArg::U32(v),
            });
        }
        Ok((cell.name.clone(), Arc::clone(&cell.func), resolved))
    }
}

impl DeviceBackend for HostBackend {
    fn init(&self) -> BackendResult<()> {
        tracing::info!(device = %self.config.device_name, "HostBackend: initialized");
        Ok(())
    }

    fn device_properties(&self) -> BackendResult<DeviceProps> {
        Ok(DeviceProps {
            name: self.config.device_name.clone(),
            vendor_id: 0x1f0e,
            timer_resolution: self.config.timer_resolution.max(1),
            max_group_size: [1024, 1024, 64],
        })
    }

    fn queue_group_properties(&self) -> BackendResult<Vec<QueueGroupProps>> {
        Ok(self.config.queue_groups.clone())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            immediate_event_interop: self.config.immediate_event_interop,
            partial_groups: self.config.partial_groups,
        }
    }

    fn create_queue(&self, desc: &QueueDesc) -> BackendResult<QueueHandle> {
        if desc.ordinal as usize >= self.config.queue_groups.len() {
            return Err(Status::ERROR_INVALID_ARGUMENT);
        }
        let (tx, rx) = mpsc::channel::<QueueWork>();
        let handle = self.alloc_handle();
        let cell = Arc::new(QueueCell {
            mode: desc.mode,
            tx: Mutex::new(tx),
            inflight: Mutex::new(0),
            idle: Condvar::new(),
        });
        let worker_cell = Arc::clone(&cell);
        let time = Arc::clone(&self.time);
        std::thread::spawn(move || worker::queue_worker(rx, worker_cell, time));
        self.queues
            .lock()
            .map_err(|_| Status::ERROR_DEVICE_LOST)?
            .insert(handle, cell);
        tracing::debug!(handle, ordinal = desc.ordinal, "HostBackend: queue created");
        Ok(QueueHandle(handle))
    }

    fn create_command_list(&self, desc: &ListDesc) -> BackendResult<ListHandle> {
        if desc.ordinal as usize >= self.config.queue_groups.len() {
            return Err(Status::ERROR_INVALID_ARGUMENT);
        }
        let handle = self.alloc_handle();
        let imm_tx = if desc.execution == ExecutionMode::Immediate
            && desc.ordering == OrderingMode::InOrder
        {
            let (tx, rx) = mpsc::channel::<OpRecord>();
            Some((Mutex::new(tx), rx))
        } else {
            None
        };
        let (imm_tx, imm_rx) = match imm_tx {
            Some((tx, rx)) => (Some(tx), Some(rx)),
            None => (None, None),
        };
        let cell = Arc::new(ListCell {
            desc: desc.clone(),
            body: Mutex::new(ListBody::default()),
            done: Condvar::new(),
            imm_tx,
        });
        if let Some(rx) = imm_rx {
            // Immediate lists begin executing upon creation
            let worker_cell = Arc::clone(&cell);
            let time = Arc::clone(&self.time);
            std::thread::spawn(move || worker::immediate_worker(rx, worker_cell, time));
        }
        self.lists
            .lock()
            .map_err(|_| Status::ERROR_DEVICE_LOST)?
            .insert(handle, cell);
        tracing::debug!(handle, ?desc, "HostBackend: command list created");
        Ok(ListHandle(handle))
    }

    fn create_event_pool(&self, capacity: u32) -> BackendResult<EventPoolHandle> {
        if capacity == 0 {
            return Err(Status::ERROR_INVALID_SIZE);
        }
        let handle = self.alloc_handle();
        self.pools.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?.insert(
            handle,
            Arc::new(PoolCell {
                capacity,
                used: Mutex::new(vec![false; capacity as usize]),
            }),
        );
        Ok(EventPoolHandle(handle))
    }

    fn create_event(&self, pool: EventPoolHandle, index: u32) -> BackendResult<EventHandle> {
        let pool_handle = pool.0;
        let pool = self
            .pools
            .lock()
            .map_err(|_| Status::ERROR_DEVICE_LOST)?
            .get(&pool_handle)
            .cloned()
            .ok_or(Status::ERROR_INVALID_ARGUMENT)?;
        if index >= pool.capacity {
            return Err(Status::ERROR_INVALID_ARGUMENT);
        }
        {
            let mut used = pool.used.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?;
            if used[index as usize] {
                return Err(Status::ERROR_HANDLE_OBJECT_IN_USE);
            }
            used[index as usize] = true;
        }
        let handle = self.alloc_handle();
        self.events.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?.insert(
            handle,
            EventEntry {
                cell: Arc::new(EventCell {
                    state: Mutex::new(EventState::default()),
                    cv: Condvar::new(),
                }),
                pool: pool_handle,
                index,
            },
        );
        Ok(EventHandle(handle))
    }

    fn destroy_event(&self, event: EventHandle) -> BackendResult<()> {
        let entry = self
            .events
            .lock()
            .map_err(|_| Status::ERROR_DEVICE_LOST)?
            .remove(&event.0)
            .ok_or(Status::ERROR_INVALID_ARGUMENT)?;
        if let Some(pool) = self
            .pools
            .lock()
            .map_err(|_| Status::ERROR_DEVICE_LOST)?
            .get(&entry.pool)
        {
            if let Ok(mut used) = pool.used.lock() {
                used[entry.index as usize] = false;
            }
        }
        Ok(())
    }

    fn allocate_memory(&self, kind: MemoryKind, size: usize) -> BackendResult<MemHandle> {
        if size == 0 {
            return Err(Status::ERROR_INVALID_SIZE);
        }
        let handle = self.alloc_handle();
        self.buffers.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?.insert(
            handle,
            Arc::new(BufferCell { kind, data: Mutex::new(vec![0u8; size]) }),
        );
        tracing::trace!(handle, ?kind, size, "HostBackend: memory allocated");
        Ok(MemHandle(handle))
    }

    fn free_memory(&self, mem: MemHandle) -> BackendResult<()> {
        self.buffers
            .lock()
            .map_err(|_| Status::ERROR_DEVICE_LOST)?
            .remove(&mem.0)
            .map(|_| ())
            .ok_or(Status::ERROR_INVALID_ARGUMENT)
    }

    fn write_memory(&self, mem: MemHandle, offset: usize, bytes: &[u8]) -> BackendResult<()> {
        let buf = self.buffer(mem)?;
        if buf.kind == MemoryKind::Device {
            // Device-resident memory is not host-accessible; go through a
            // copy operation instead.
            return Err(Status::ERROR_INVALID_ARGUMENT);
        }
        let mut data = buf.data.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?;
        let end = offset.checked_add(bytes.len()).ok_or(Status::ERROR_INVALID_SIZE)?;
        if end > data.len() {
            return Err(Status::ERROR_INVALID_SIZE);
        }
        data[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    fn read_memory(&self, mem: MemHandle, offset: usize, out: &mut [u8]) -> BackendResult<()> {
        let buf = self.buffer(mem)?;
        if buf.kind == MemoryKind::Device {
            return Err(Status::ERROR_INVALID_ARGUMENT);
        }
        let data = buf.data.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?;
        let end = offset.checked_add(out.len()).ok_or(Status::ERROR_INVALID_SIZE)?;
        if end > data.len() {
            return Err(Status::ERROR_INVALID_SIZE);
        }
        out.copy_from_slice(&data[offset..end]);
        Ok(())
    }

    fn compile_module(&self, binary: &[u8]) -> BackendResult<ModuleHandle> {
        // The host "binary format" is a UTF-8 manifest: one exported kernel
        // name per line, '#' starts a comment.
        let text = match std::str::from_utf8(binary) {
            Ok(t) => t,
            Err(e) => {
                *self.last_build_log.lock().map_err(|_| Status::ERROR_DEVICE_LOST)? =
                    Some(format!("module binary is not a UTF-8 manifest: {}", e));
                return Err(Status::ERROR_MODULE_BUILD_FAILURE);
            }
        };
        let names: Vec<String> = text
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| l.to_string())
            .collect();
        if names.is_empty() {
            *self.last_build_log.lock().map_err(|_| Status::ERROR_DEVICE_LOST)? =
                Some("module manifest exports no kernels".to_string());
            return Err(Status::ERROR_MODULE_BUILD_FAILURE);
        }
        let handle = self.alloc_handle();
        self.modules
            .lock()
            .map_err(|_| Status::ERROR_DEVICE_LOST)?
            .insert(handle, names);
        Ok(ModuleHandle(handle))
    }

    fn module_build_log(&self) -> Option<String> {
        self.last_build_log.lock().ok()?.clone()
    }

    fn get_kernel(&self, module: ModuleHandle, name: &str) -> BackendResult<KernelHandle> {
        let exported = self
            .modules
            .lock()
            .map_err(|_| Status::ERROR_DEVICE_LOST)?
            .get(&module.0)
            .cloned()
            .ok_or(Status::ERROR_INVALID_ARGUMENT)?;
        if !exported.iter().any(|n| n == name) {
            return Err(Status::ERROR_KERNEL_NOT_FOUND);
        }
        let func = self
            .registered
            .lock()
            .map_err(|_| Status::ERROR_DEVICE_LOST)?
            .get(name)
            .cloned()
            .ok_or(Status::ERROR_KERNEL_NOT_FOUND)?;
        let handle = self.alloc_handle();
        self.kernels.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?.insert(
            handle,
            Arc::new(KernelCell {
                name: name.to_string(),
                func,
                args: Mutex::new(Vec::new()),
            }),
        );
        Ok(KernelHandle(handle))
    }

    fn set_kernel_arg(&self, kernel: KernelHandle, index: u32, arg: KernelArg) -> BackendResult<()> {
        let cell = self
            .kernels
            .lock()
            .map_err(|_| Status::ERROR_DEVICE_LOST)?
            .get(&kernel.0)
            .cloned()
            .ok_or(Status::ERROR_INVALID_ARGUMENT)?;
        let mut slots = cell.args.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?;
        let idx = index as usize;
        if idx >= slots.len() {
            slots.resize(idx + 1, None);
        }
        slots[idx] = Some(arg);
        Ok(())
    }

    fn suggest_group_size(&self, kernel: KernelHandle, global: [u32; 3]) -> BackendResult<[u32; 3]> {
        if !self
            .kernels
            .lock()
            .map_err(|_| Status::ERROR_DEVICE_LOST)?
            .contains_key(&kernel.0)
        {
            return Err(Status::ERROR_INVALID_ARGUMENT);
        }
        if global.iter().any(|&g| g == 0) {
            return Err(Status::ERROR_INVALID_ARGUMENT);
        }
        let mut suggestion = [1u32; 3];
        for (dim, &g) in global.iter().enumerate() {
            for candidate in [32u32, 16, 8, 4, 2, 1] {
                if g % candidate == 0 {
                    suggestion[dim] = candidate;
                    break;
                }
            }
        }
        Ok(suggestion)
    }

    fn append_barrier(
        &self,
        list: ListHandle,
        signal: Option<EventHandle>,
        waits: &[EventHandle],
    ) -> BackendResult<()> {
        let list = self.list(list)?;
        let (signal, waits) = self.prepare_append(&list, signal, waits)?;
        self.enqueue_op(&list, OpRecord { kind: OpKind::Barrier, signal, waits })
    }

    fn append_copy(
        &self,
        list: ListHandle,
        dst: MemHandle,
        dst_offset: usize,
        src: MemHandle,
        src_offset: usize,
        size: usize,
        signal: Option<EventHandle>,
        waits: &[EventHandle],
    ) -> BackendResult<()> {
        let list = self.list(list)?;
        let dst = self.buffer(dst)?;
        let src = self.buffer(src)?;
        {
            let dst_len = dst.data.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?.len();
            let src_len = src.data.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?.len();
            let dst_end = dst_offset.checked_add(size).ok_or(Status::ERROR_INVALID_SIZE)?;
            let src_end = src_offset.checked_add(size).ok_or(Status::ERROR_INVALID_SIZE)?;
            if dst_end > dst_len || src_end > src_len {
                return Err(Status::ERROR_INVALID_SIZE);
            }
        }
        let (signal, waits) = self.prepare_append(&list, signal, waits)?;
        self.enqueue_op(
            &list,
            OpRecord {
                kind: OpKind::Copy { dst, dst_offset, src, src_offset, size },
                signal,
                waits,
            },
        )
    }

    fn append_launch_kernel(
        &self,
        list: ListHandle,
        kernel: KernelHandle,
        group_count: GroupCount,
        signal: Option<EventHandle>,
        waits: &[EventHandle],
    ) -> BackendResult<()> {
        let list = self.list(list)?;
        let (name, func, args) = self.resolve_kernel(kernel)?;
        let (signal, waits) = self.prepare_append(&list, signal, waits)?;
        tracing::trace!(kernel = %name, ?group_count, "HostBackend: kernel launch enqueued");
        self.enqueue_op(
            &list,
            OpRecord {
                kind: OpKind::Kernel { name, func, args, group_count },
                signal,
                waits,
            },
        )
    }

    fn close_list(&self, list: ListHandle) -> BackendResult<()> {
        let list = self.list(list)?;
        if list.desc.execution != ExecutionMode::Deferred {
            return Err(Status::ERROR_INVALID_ARGUMENT);
        }
        let mut body = list.body.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?;
        if body.closed {
            return Err(Status::ERROR_INVALID_ARGUMENT);
        }
        body.closed = true;
        Ok(())
    }

    fn reset_list(&self, list: ListHandle) -> BackendResult<()> {
        let list = self.list(list)?;
        if list.desc.execution != ExecutionMode::Deferred {
            return Err(Status::ERROR_INVALID_ARGUMENT);
        }
        let mut body = list.body.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?;
        if body.pending_submissions > 0 {
            return Err(Status::ERROR_HANDLE_OBJECT_IN_USE);
        }
        body.ops.clear();
        body.closed = false;
        Ok(())
    }

    fn synchronize_list(&self, list: ListHandle, timeout: Option<Duration>) -> BackendResult<()> {
        let list = self.list(list)?;
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut body = list.body.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?;
        while body.inflight_ops > 0 || body.pending_submissions > 0 {
            match deadline {
                None => {
                    body = list.done.wait(body).map_err(|_| Status::ERROR_DEVICE_LOST)?;
                }
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Err(Status::NOT_READY);
                    }
                    let (guard, _) = list
                        .done
                        .wait_timeout(body, d - now)
                        .map_err(|_| Status::ERROR_DEVICE_LOST)?;
                    body = guard;
                }
            }
        }
        Ok(())
    }

    fn submit(&self, queue: QueueHandle, list: ListHandle) -> BackendResult<()> {
        let queue = self.queue(queue)?;
        let list = self.list(list)?;
        if list.desc.execution != ExecutionMode::Deferred {
            return Err(Status::ERROR_INVALID_ARGUMENT);
        }
        let ops = {
            let mut body = list.body.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?;
            if !body.closed {
                return Err(Status::ERROR_INVALID_ARGUMENT);
            }
            body.pending_submissions += 1;
            body.ops.clone()
        };
        {
            let mut inflight = queue.inflight.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?;
            *inflight += 1;
        }
        let (ack_tx, ack_rx) = mpsc::channel::<()>();
        let work = QueueWork {
            ops,
            ordering: list.desc.ordering,
            list: Arc::clone(&list),
            ack: ack_tx,
        };
        queue
            .tx
            .lock()
            .map_err(|_| Status::ERROR_DEVICE_LOST)?
            .send(work)
            .map_err(|_| Status::ERROR_DEVICE_LOST)?;
        if queue.mode == crate::backend::QueueMode::Synchronous {
            // Blocks until the worker dequeues the submission: acceptance,
            // not completion.
            ack_rx.recv().map_err(|_| Status::ERROR_DEVICE_LOST)?;
        }
        Ok(())
    }

    fn drain(&self, queue: QueueHandle) -> BackendResult<()> {
        let queue = self.queue(queue)?;
        let mut inflight = queue.inflight.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?;
        while *inflight > 0 {
            inflight = queue.idle.wait(inflight).map_err(|_| Status::ERROR_DEVICE_LOST)?;
        }
        Ok(())
    }

    fn signal_event(&self, event: EventHandle) -> BackendResult<()> {
        let cell = self.event(event)?;
        worker::signal_cell(&cell, None);
        Ok(())
    }

    fn reset_event(&self, event: EventHandle) -> BackendResult<()> {
        let cell = self.event(event)?;
        let mut st = cell.state.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?;
        st.signaled = false;
        st.kernel_ts = None;
        if st.first_signal_origin == Some(ExecutionMode::Immediate) {
            st.reset_after_immediate = true;
        }
        Ok(())
    }

    fn query_event(&self, event: EventHandle) -> BackendResult<bool> {
        let cell = self.event(event)?;
        let st = cell.state.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?;
        Ok(st.signaled)
    }

    fn wait_event(&self, event: EventHandle, timeout: Option<Duration>) -> BackendResult<()> {
        let cell = self.event(event)?;
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut st = cell.state.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?;
        while !st.signaled {
            match deadline {
                None => {
                    st = cell.cv.wait(st).map_err(|_| Status::ERROR_DEVICE_LOST)?;
                }
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Err(Status::NOT_READY);
                    }
                    let (guard, _) = cell
                        .cv
                        .wait_timeout(st, d - now)
                        .map_err(|_| Status::ERROR_DEVICE_LOST)?;
                    st = guard;
                }
            }
        }
        Ok(())
    }

    fn kernel_timestamp(&self, event: EventHandle) -> BackendResult<KernelTimestamp> {
        let cell = self.event(event)?;
        let st = cell.state.lock().map_err(|_| Status::ERROR_DEVICE_LOST)?;
        st.kernel_ts.ok_or(Status::NOT_READY)
    }

    fn global_timestamps(&self) -> BackendResult<(u64, u64)> {
        let ticks = self.time.device_ticks();
        Ok((ticks, ticks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DeviceBackend, EventPoolHandle};

    fn compiled_kernel(backend: &HostBackend) -> KernelHandle {
        backend.register_kernel("noop", |_ctx| {});
        let module = backend.compile_module(b"noop\n").unwrap();
        backend.get_kernel(module, "noop").unwrap()
    }

    #[test]
    fn test_suggest_group_size_prefers_largest_divisor() {
        let backend = HostBackend::new();
        let kernel = compiled_kernel(&backend);
        assert_eq!(backend.suggest_group_size(kernel, [1024, 1024, 1]).unwrap(), [32, 32, 1]);
        assert_eq!(backend.suggest_group_size(kernel, [48, 7, 1]).unwrap(), [16, 1, 1]);
        assert_eq!(
            backend.suggest_group_size(kernel, [0, 1, 1]),
            Err(Status::ERROR_INVALID_ARGUMENT)
        );
    }

    #[test]
    fn test_compile_module_rejects_non_utf8_with_build_log() {
        let backend = HostBackend::new();
        let err = backend.compile_module(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert_eq!(err, Status::ERROR_MODULE_BUILD_FAILURE);
        assert!(backend.module_build_log().is_some());
    }

    #[test]
    fn test_compile_module_rejects_empty_manifest() {
        let backend = HostBackend::new();
        let err = backend.compile_module(b"# nothing exported\n").unwrap_err();
        assert_eq!(err, Status::ERROR_MODULE_BUILD_FAILURE);
    }

    #[test]
    fn test_get_kernel_requires_export_and_registration() {
        let backend = HostBackend::new();
        backend.register_kernel("registered", |_ctx| {});
        let module = backend.compile_module(b"registered\nexported_only\n").unwrap();
        assert!(backend.get_kernel(module, "registered").is_ok());
        // Exported but no host implementation registered
        assert_eq!(
            backend.get_kernel(module, "exported_only"),
            Err(Status::ERROR_KERNEL_NOT_FOUND)
        );
        // Neither exported nor registered
        assert_eq!(
            backend.get_kernel(module, "missing"),
            Err(Status::ERROR_KERNEL_NOT_FOUND)
        );
    }

    #[test]
    fn test_device_memory_is_not_host_accessible() {
        let backend = HostBackend::new();
        let mem = backend.allocate_memory(MemoryKind::Device, 16).unwrap();
        assert_eq!(
            backend.write_memory(mem, 0, &[1, 2, 3, 4]),
            Err(Status::ERROR_INVALID_ARGUMENT)
        );
        let mut out = [0u8; 4];
        assert_eq!(
            backend.read_memory(mem, 0, &mut out),
            Err(Status::ERROR_INVALID_ARGUMENT)
        );
    }

    #[test]
    fn test_memory_access_is_bounds_checked() {
        let backend = HostBackend::new();
        let mem = backend.allocate_memory(MemoryKind::Host, 8).unwrap();
        assert_eq!(
            backend.write_memory(mem, 6, &[0u8; 4]),
            Err(Status::ERROR_INVALID_SIZE)
        );
        let mut out = [0u8; 16];
        assert_eq!(
            backend.read_memory(mem, 0, &mut out),
            Err(Status::ERROR_INVALID_SIZE)
        );
    }

    #[test]
    fn test_zero_sized_allocations_rejected() {
        let backend = HostBackend::new();
        assert_eq!(
            backend.allocate_memory(MemoryKind::Host, 0),
            Err(Status::ERROR_INVALID_SIZE)
        );
        assert_eq!(backend.create_event_pool(0), Err(Status::ERROR_INVALID_SIZE));
    }

    #[test]
    fn test_queue_ordinal_validated_against_groups() {
        let backend = HostBackend::new();
        let desc = QueueDesc { ordinal: 99, index: 0, mode: crate::backend::QueueMode::Asynchronous };
        assert_eq!(backend.create_queue(&desc), Err(Status::ERROR_INVALID_ARGUMENT));
    }

    #[test]
    fn test_stale_pool_handle_rejected() {
        let backend = HostBackend::new();
        assert_eq!(
            backend.create_event(EventPoolHandle(0xdead), 0),
            Err(Status::ERROR_INVALID_ARGUMENT)
        );
    }
}
