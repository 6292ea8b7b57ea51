//! Host-owned scheduler context
//!
//! A `Context` bundles the backend connection, device properties, and the
//! cross-list event compatibility policy, and is passed explicitly to
//! everything that needs device access — there is no process-wide device
//! singleton, so multiple independent contexts can coexist in one process.

use std::sync::Arc;

use crate::backend::{
    Capabilities, DeviceBackend, DeviceProps, ListDesc, MemoryKind, QueueDesc,
};
use crate::error::{ForgeResult, ZeForgeError};
use crate::profiling::GlobalTimestamps;
use crate::scheduler::dispatch::DispatchShape;
use crate::scheduler::event::EventPool;
use crate::scheduler::list::CommandList;
use crate::scheduler::memory::Buffer;
use crate::scheduler::module::Module;
use crate::scheduler::queue::CommandQueue;
use crate::backend::GroupCount;

/// Policy for reset immediate-origin events used as wait dependencies on
/// deferred lists.
///
/// `Passthrough` forwards the append to the backend and surfaces whatever
/// status it reports — the behavior differs across backend versions, and
/// masking the difference would defeat a reproducer. `Strict` fails fast
/// with a documented error before touching the backend, giving portable
/// semantics, unless the backend declares `immediate_event_interop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompatMode {
    #[default]
    Passthrough,
    Strict,
}

/// Configuration for context creation
#[derive(Debug, Clone, Default)]
pub struct ContextConfig {
    pub compat_mode: CompatMode,
}

impl ContextConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compat_mode(mut self, mode: CompatMode) -> Self {
        self.compat_mode = mode;
        self
    }
}

/// State shared between a context and everything created under it.
///
/// Children hold an `Arc` to this, so no child outlives the context's
/// backing state.
pub(crate) struct ContextShared {
    pub(crate) backend: Arc<dyn DeviceBackend>,
    pub(crate) props: DeviceProps,
    pub(crate) caps: Capabilities,
    pub(crate) compat: CompatMode,
}

/// Owner of event pools, command lists, queues, and memory for one device
pub struct Context {
    shared: Arc<ContextShared>,
}

impl Context {
    /// Initialize the backend and create a context with default config
    pub fn new(backend: Arc<dyn DeviceBackend>) -> ForgeResult<Self> {
        Self::with_config(backend, ContextConfig::default())
    }

    pub fn with_config(backend: Arc<dyn DeviceBackend>, config: ContextConfig) -> ForgeResult<Self> {
        backend
            .init()
            .map_err(|code| ZeForgeError::backend("init", code))?;
        let props = backend
            .device_properties()
            .map_err(|code| ZeForgeError::backend("device_properties", code))?;
        let caps = backend.capabilities();
        tracing::info!(
            device = %props.name,
            vendor_id = format_args!("{:#x}", props.vendor_id),
            compat = ?config.compat_mode,
            "context created"
        );
        Ok(Context {
            shared: Arc::new(ContextShared {
                backend,
                props,
                caps,
                compat: config.compat_mode,
            }),
        })
    }

    pub fn device(&self) -> &DeviceProps {
        &self.shared.props
    }

    pub fn capabilities(&self) -> Capabilities {
        self.shared.caps
    }

    pub fn compat_mode(&self) -> CompatMode {
        self.shared.compat
    }

    /// First queue-group ordinal with compute capability
    pub fn compute_ordinal(&self) -> ForgeResult<u32> {
        let groups = self
            .shared
            .backend
            .queue_group_properties()
            .map_err(|code| ZeForgeError::backend("queue_group_properties", code))?;
        groups
            .iter()
            .position(|g| g.compute)
            .map(|i| i as u32)
            .ok_or_else(|| ZeForgeError::InvalidState("no compute-capable queue group".into()))
    }

    pub fn create_event_pool(&self, capacity: u32) -> ForgeResult<EventPool> {
        let handle = self
            .shared
            .backend
            .create_event_pool(capacity)
            .map_err(|code| ZeForgeError::backend("create_event_pool", code))?;
        Ok(EventPool::new(Arc::clone(&self.shared), handle, capacity))
    }

    pub fn create_queue(&self, desc: QueueDesc) -> ForgeResult<CommandQueue> {
        let handle = self
            .shared
            .backend
            .create_queue(&desc)
            .map_err(|code| ZeForgeError::backend("create_queue", code))?;
        Ok(CommandQueue::new(Arc::clone(&self.shared), handle, desc))
    }

    /// Create a command list; immediate lists begin executing right away
    pub fn create_command_list(&self, desc: ListDesc) -> ForgeResult<CommandList> {
        let handle = self
            .shared
            .backend
            .create_command_list(&desc)
            .map_err(|code| ZeForgeError::backend("create_command_list", code))?;
        Ok(CommandList::new(Arc::clone(&self.shared), handle, desc))
    }

    pub fn allocate_memory(&self, kind: MemoryKind, size: usize) -> ForgeResult<Buffer> {
        let handle = self
            .shared
            .backend
            .allocate_memory(kind, size)
            .map_err(|code| ZeForgeError::backend("allocate_memory", code))?;
        Ok(Buffer::new(Arc::clone(&self.shared), handle, kind, size))
    }

    /// Hand a precompiled kernel binary to the backend.
    ///
    /// On build failure the backend's build log is attached to the trace
    /// output before the status is surfaced.
    pub fn compile_module(&self, binary: &[u8]) -> ForgeResult<Module> {
        match self.shared.backend.compile_module(binary) {
            Ok(handle) => Ok(Module::new(Arc::clone(&self.shared), handle)),
            Err(code) => {
                if let Some(log) = self.shared.backend.module_build_log() {
                    tracing::error!(%log, "module build failed");
                }
                Err(ZeForgeError::backend("compile_module", code))
            }
        }
    }

    /// Resolve a dispatch shape against this context's backend capabilities
    pub fn resolve_dispatch(&self, shape: &DispatchShape) -> ForgeResult<GroupCount> {
        shape.resolve(self.shared.caps.partial_groups)
    }

    /// Correlated host/device timestamp sample
    pub fn global_timestamps(&self) -> ForgeResult<GlobalTimestamps> {
        let (host_ticks, device_ticks) = self
            .shared
            .backend
            .global_timestamps()
            .map_err(|code| ZeForgeError::backend("global_timestamps", code))?;
        Ok(GlobalTimestamps { host_ticks, device_ticks })
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("device", &self.shared.props.name)
            .field("compat", &self.shared.compat)
            .finish_non_exhaustive()
    }
}
