//! ZeForge - execution-graph scheduler for GPU command submission
//!
//! Events, event pools, command lists (immediate/deferred, in-order/
//! out-of-order), command queues, and the compatibility rules for events
//! crossing list boundaries. The device is an external collaborator behind
//! the [`backend::DeviceBackend`] trait; [`backend::HostBackend`] is a
//! complete in-process implementation, and the `level-zero` feature carries
//! FFI declarations for real hardware.

pub mod backend;
pub mod error;
pub mod loader;
pub mod logging;
pub mod profiling;
pub mod scheduler;

pub use backend::{
    Capabilities, DeviceBackend, DeviceProps, ExecutionMode, GroupCount, HostBackend,
    HostBackendConfig, KernelArg, ListDesc, MemoryKind, OrderingMode, QueueDesc, QueueMode, Status,
};
pub use error::{ErrorCategory, ForgeResult, ZeForgeError};
pub use logging::{init_logging_default, init_with_config, LoggingConfig};
pub use profiling::{DeviceClock, GlobalTimestamps, HostTimer};
pub use scheduler::{
    Buffer, CommandList, CommandQueue, CompatMode, Context, ContextConfig, DispatchShape, Event,
    EventPool, EventStatus, Kernel, Module,
};

#[cfg(test)]
mod library_tests {
    use super::*;

    #[test]
    fn test_context_over_host_backend() {
        let backend = HostBackend::new();
        let ctx = Context::new(backend).expect("context creation");
        assert!(!ctx.device().name.is_empty());
        assert_eq!(ctx.compat_mode(), CompatMode::Passthrough);
    }
}
