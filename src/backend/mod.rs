//! Device backend seam for the execution-graph scheduler
//!
//! The scheduler never talks to a driver directly: every device interaction
//! goes through the [`DeviceBackend`] trait, and every call returns a raw
//! [`Status`] that the scheduler checks. The crate ships one complete
//! implementation, [`host::HostBackend`], which executes operations
//! asynchronously on worker threads; a Level-Zero FFI skeleton lives behind
//! the `level-zero` feature.

use std::fmt;
use std::time::Duration;

pub mod host;
#[cfg(feature = "level-zero")]
pub mod level_zero;

pub use host::{HostBackend, HostBackendConfig, KernelCtx};

/// Raw status code returned by every backend call.
///
/// Zero is success; the non-success codes mirror the numeric ranges the
/// original driver used so reproducer output stays recognizable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub i32);

impl Status {
    pub const SUCCESS: Status = Status(0);
    /// A wait expired before the condition was met
    pub const NOT_READY: Status = Status(1);
    pub const ERROR_DEVICE_LOST: Status = Status(0x7000_0001);
    pub const ERROR_OUT_OF_MEMORY: Status = Status(0x7000_0002);
    pub const ERROR_MODULE_BUILD_FAILURE: Status = Status(0x7000_0010);
    pub const ERROR_INVALID_ARGUMENT: Status = Status(0x7800_0004);
    pub const ERROR_INVALID_SIZE: Status = Status(0x7800_0006);
    pub const ERROR_HANDLE_OBJECT_IN_USE: Status = Status(0x7800_000b);
    pub const ERROR_KERNEL_NOT_FOUND: Status = Status(0x7800_000d);

    pub fn is_success(self) -> bool {
        self == Status::SUCCESS
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Result of a backend call: the raw status is the error type
pub type BackendResult<T> = Result<T, Status>;

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub u64);
    };
}

opaque_handle!(
    /// Opaque backend handle for an event
    EventHandle
);
opaque_handle!(
    /// Opaque backend handle for an event pool
    EventPoolHandle
);
opaque_handle!(
    /// Opaque backend handle for a command list
    ListHandle
);
opaque_handle!(
    /// Opaque backend handle for a command queue
    QueueHandle
);
opaque_handle!(
    /// Opaque backend handle for a compiled module
    ModuleHandle
);
opaque_handle!(
    /// Opaque backend handle for a kernel entry point
    KernelHandle
);
opaque_handle!(
    /// Opaque backend handle for a memory allocation
    MemHandle
);

/// Execution-mode class of a command list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Operations dispatch to the device as soon as appended
    Immediate,
    /// Operations buffer until the list is closed and submitted to a queue
    Deferred,
}

/// Ordering guarantee within one command list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingMode {
    /// Operation i+1 begins only after operation i has retired
    InOrder,
    /// Only event-expressed order; the device may reorder or parallelize
    OutOfOrder,
}

/// Whether submission blocks the caller until the backend accepts it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    Synchronous,
    Asynchronous,
}

/// Kind of memory allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    /// Host-resident, host-accessible
    Host,
    /// Device-resident; the host must go through copy operations
    Device,
    /// Migratable, visible to both sides
    Shared,
}

/// Descriptor for queue creation
#[derive(Debug, Clone)]
pub struct QueueDesc {
    /// Queue-group ordinal this queue targets
    pub ordinal: u32,
    pub index: u32,
    pub mode: QueueMode,
}

impl Default for QueueDesc {
    fn default() -> Self {
        Self { ordinal: 0, index: 0, mode: QueueMode::Asynchronous }
    }
}

/// Descriptor for command-list creation
#[derive(Debug, Clone)]
pub struct ListDesc {
    pub execution: ExecutionMode,
    pub ordering: OrderingMode,
    /// Queue-group ordinal (immediate lists attach to it directly)
    pub ordinal: u32,
}

impl ListDesc {
    pub fn immediate(ordering: OrderingMode) -> Self {
        Self { execution: ExecutionMode::Immediate, ordering, ordinal: 0 }
    }

    pub fn deferred(ordering: OrderingMode) -> Self {
        Self { execution: ExecutionMode::Deferred, ordering, ordinal: 0 }
    }

    pub fn with_ordinal(mut self, ordinal: u32) -> Self {
        self.ordinal = ordinal;
        self
    }
}

/// Static properties of the device behind a backend
#[derive(Debug, Clone)]
pub struct DeviceProps {
    pub name: String,
    pub vendor_id: u32,
    /// Nanoseconds per device timestamp tick
    pub timer_resolution: u64,
    /// Maximum threads in one group, per dimension
    pub max_group_size: [u32; 3],
}

/// Properties of one queue group reported by the device
#[derive(Debug, Clone, Copy)]
pub struct QueueGroupProps {
    pub compute: bool,
    pub copy: bool,
}

/// Backend-version-dependent behavior the scheduler consults.
///
/// `immediate_event_interop` documents whether an event that was signaled on
/// an immediate list and then reset may still be used as a wait dependency
/// on a deferred list. Backends that reject it return
/// [`Status::ERROR_INVALID_ARGUMENT`] from the append call.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub immediate_event_interop: bool,
    pub partial_groups: bool,
}

/// Per-dimension group counts for a kernel dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupCount {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl GroupCount {
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }
}

/// A kernel argument value.
///
/// Arbitrary-kernel argument marshalling is out of scope; these cover the
/// reproducers' needs (buffers and small scalars).
#[derive(Debug, Clone, Copy)]
pub enum KernelArg {
    Buffer(MemHandle),
    I32(i32),
    U32(u32),
}

/// Device start/end ticks recorded for the operation that signaled an event
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelTimestamp {
    pub start_ticks: u64,
    pub end_ticks: u64,
}

/// The device backend contract.
///
/// All methods return a raw [`Status`] on failure; the scheduler maps those
/// into typed errors and never assumes success. Blocking calls are exactly
/// the waits: `wait_event`, `synchronize_list`, and `drain`.
pub trait DeviceBackend: Send + Sync + fmt::Debug {
    fn init(&self) -> BackendResult<()>;
    fn device_properties(&self) -> BackendResult<DeviceProps>;
    fn queue_group_properties(&self) -> BackendResult<Vec<QueueGroupProps>>;
    fn capabilities(&self) -> Capabilities;

    fn create_queue(&self, desc: &QueueDesc) -> BackendResult<QueueHandle>;
    /// Immediate lists begin executing upon creation
    fn create_command_list(&self, desc: &ListDesc) -> BackendResult<ListHandle>;
    fn create_event_pool(&self, capacity: u32) -> BackendResult<EventPoolHandle>;
    fn create_event(&self, pool: EventPoolHandle, index: u32) -> BackendResult<EventHandle>;

    fn allocate_memory(&self, kind: MemoryKind, size: usize) -> BackendResult<MemHandle>;
    fn free_memory(&self, mem: MemHandle) -> BackendResult<()>;
    /// Host-side write; rejected for device-resident memory
    fn write_memory(&self, mem: MemHandle, offset: usize, bytes: &[u8]) -> BackendResult<()>;
    /// Host-side read; rejected for device-resident memory
    fn read_memory(&self, mem: MemHandle, offset: usize, out: &mut [u8]) -> BackendResult<()>;

    fn compile_module(&self, binary: &[u8]) -> BackendResult<ModuleHandle>;
    /// Diagnostic text from the most recent failed `compile_module`
    fn module_build_log(&self) -> Option<String>;
    fn get_kernel(&self, module: ModuleHandle, name: &str) -> BackendResult<KernelHandle>;
    fn set_kernel_arg(&self, kernel: KernelHandle, index: u32, arg: KernelArg) -> BackendResult<()>;
    fn suggest_group_size(&self, kernel: KernelHandle, global: [u32; 3]) -> BackendResult<[u32; 3]>;

    fn append_barrier(
        &self,
        list: ListHandle,
        signal: Option<EventHandle>,
        waits: &[EventHandle],
    ) -> BackendResult<()>;
    #[allow(clippy::too_many_arguments)]
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
    ) -> BackendResult<()>;
    fn append_launch_kernel(
        &self,
        list: ListHandle,
        kernel: KernelHandle,
        group_count: GroupCount,
        signal: Option<EventHandle>,
        waits: &[EventHandle],
    ) -> BackendResult<()>;

    fn close_list(&self, list: ListHandle) -> BackendResult<()>;
    /// Fails with [`Status::ERROR_HANDLE_OBJECT_IN_USE`] while submissions
    /// of this list are still in flight
    fn reset_list(&self, list: ListHandle) -> BackendResult<()>;
    /// Blocks until every operation dispatched through the list has retired;
    /// [`Status::NOT_READY`] on timeout
    fn synchronize_list(&self, list: ListHandle, timeout: Option<Duration>) -> BackendResult<()>;

    fn submit(&self, queue: QueueHandle, list: ListHandle) -> BackendResult<()>;
    /// Blocks until all submitted lists have retired
    fn drain(&self, queue: QueueHandle) -> BackendResult<()>;

    /// Releases the event and returns its pool index for reuse
    fn destroy_event(&self, event: EventHandle) -> BackendResult<()>;
    fn signal_event(&self, event: EventHandle) -> BackendResult<()>;
    fn reset_event(&self, event: EventHandle) -> BackendResult<()>;
    /// Non-blocking; true means signaled
    fn query_event(&self, event: EventHandle) -> BackendResult<bool>;
    /// Blocks until signaled; [`Status::NOT_READY`] on timeout
    fn wait_event(&self, event: EventHandle, timeout: Option<Duration>) -> BackendResult<()>;
    fn kernel_timestamp(&self, event: EventHandle) -> BackendResult<KernelTimestamp>;

    /// Correlated (host ticks, device ticks) sample
    fn global_timestamps(&self) -> BackendResult<(u64, u64)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_is_hex() {
        assert_eq!(Status::ERROR_INVALID_ARGUMENT.to_string(), "0x78000004");
        assert_eq!(Status::SUCCESS.to_string(), "0x0");
    }

    #[test]
    fn test_status_success() {
        assert!(Status::SUCCESS.is_success());
        assert!(!Status::NOT_READY.is_success());
    }

    #[test]
    fn test_list_desc_builders() {
        let desc = ListDesc::immediate(OrderingMode::InOrder).with_ordinal(2);
        assert_eq!(desc.execution, ExecutionMode::Immediate);
        assert_eq!(desc.ordinal, 2);
    }
}
