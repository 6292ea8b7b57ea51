//! Command queues
//!
//! The execution engine deferred lists submit to. Synchronous-mode
//! submission blocks the caller until the backend accepts the work, not
//! until it completes; completion is still observed via events. `drain` is
//! the teardown fence: after it returns no submitted list's operations may
//! be observed incomplete.

use std::sync::Arc;

use crate::backend::{ExecutionMode, QueueDesc, QueueHandle, QueueMode};
use crate::error::{ForgeResult, ZeForgeError};
use crate::scheduler::context::ContextShared;
use crate::scheduler::list::CommandList;

/// FIFO target for deferred-list submission
pub struct CommandQueue {
    shared: Arc<ContextShared>,
    handle: QueueHandle,
    desc: QueueDesc,
}

impl CommandQueue {
    pub(crate) fn new(shared: Arc<ContextShared>, handle: QueueHandle, desc: QueueDesc) -> Self {
        Self { shared, handle, desc }
    }

    pub fn mode(&self) -> QueueMode {
        self.desc.mode
    }

    pub fn ordinal(&self) -> u32 {
        self.desc.ordinal
    }

    /// Submit a closed deferred list for execution.
    ///
    /// A list may be submitted any number of times until it is reset.
    pub fn submit(&self, list: &CommandList) -> ForgeResult<()> {
        if list.execution_mode() != ExecutionMode::Deferred {
            return Err(ZeForgeError::InvalidState(
                "immediate lists execute eagerly and are never submitted".into(),
            ));
        }
        if !list.is_closed()? {
            return Err(ZeForgeError::NotClosed);
        }
        tracing::debug!(ordinal = self.desc.ordinal, "submitting command list");
        self.shared
            .backend
            .submit(self.handle, list.handle())
            .map_err(|code| ZeForgeError::backend("submit", code))
    }

    /// Block until all submitted lists have retired
    pub fn drain(&self) -> ForgeResult<()> {
        self.shared
            .backend
            .drain(self.handle)
            .map_err(|code| ZeForgeError::backend("drain", code))
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("mode", &self.desc.mode)
            .field("ordinal", &self.desc.ordinal)
            .finish_non_exhaustive()
    }
}
