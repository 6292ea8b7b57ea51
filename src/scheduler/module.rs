//! Compiled modules and kernel entry points

use std::sync::Arc;

use crate::backend::{KernelArg, KernelHandle, ModuleHandle};
use crate::error::{ForgeResult, ZeForgeError};
use crate::scheduler::context::ContextShared;

/// A backend-compiled kernel module
pub struct Module {
    shared: Arc<ContextShared>,
    handle: ModuleHandle,
}

impl Module {
    pub(crate) fn new(shared: Arc<ContextShared>, handle: ModuleHandle) -> Self {
        Self { shared, handle }
    }

    /// Look up an exported kernel by name
    pub fn kernel(&self, name: &str) -> ForgeResult<Kernel> {
        let handle = self
            .shared
            .backend
            .get_kernel(self.handle, name)
            .map_err(|code| ZeForgeError::backend("get_kernel", code))?;
        Ok(Kernel {
            shared: Arc::clone(&self.shared),
            handle,
            name: name.to_string(),
        })
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module").finish_non_exhaustive()
    }
}

/// One kernel entry point with its argument slots
pub struct Kernel {
    shared: Arc<ContextShared>,
    handle: KernelHandle,
    name: String,
}

impl Kernel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn handle(&self) -> KernelHandle {
        self.handle
    }

    /// Bind an argument slot; arguments are snapshot when a launch is
    /// appended, so rebinding between launches is safe
    pub fn set_arg(&self, index: u32, arg: KernelArg) -> ForgeResult<()> {
        self.shared
            .backend
            .set_kernel_arg(self.handle, index, arg)
            .map_err(|code| ZeForgeError::backend("set_kernel_arg", code))
    }

    /// Ask the backend for a good group size for the given global size
    pub fn suggest_group_size(&self, global: [u32; 3]) -> ForgeResult<[u32; 3]> {
        self.shared
            .backend
            .suggest_group_size(self.handle, global)
            .map_err(|code| ZeForgeError::backend("suggest_group_size", code))
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
