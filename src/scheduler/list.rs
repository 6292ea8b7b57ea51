//! Command lists
//!
//! A command list is an ordered sequence of operations bound at creation to
//! one execution mode (immediate or deferred) and one ordering mode
//! (in-order or out-of-order). Immediate lists dispatch each operation to
//! the device as soon as it is appended — the append returns once the
//! operation is enqueued, not once it completes; completion is observed via
//! the operation's signal event. Deferred lists accumulate operations until
//! closed and submitted to a queue.
//!
//! In-order lists guarantee that operation i+1 begins only after operation
//! i has retired, so events on them serve host-visible signaling and
//! cross-list dependencies. Out-of-order lists guarantee nothing beyond
//! event-expressed order.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::backend::{
    EventHandle, ExecutionMode, GroupCount, ListDesc, ListHandle, OrderingMode, Status,
};
use crate::error::{ForgeResult, ZeForgeError};
use crate::scheduler::context::{CompatMode, ContextShared};
use crate::scheduler::event::Event;
use crate::scheduler::memory::Buffer;
use crate::scheduler::module::Kernel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListPhase {
    Open,
    Closed,
}

/// An ordered sequence of operations targeting one mode pair
pub struct CommandList {
    shared: Arc<ContextShared>,
    handle: ListHandle,
    desc: ListDesc,
    phase: Mutex<ListPhase>,
}

impl CommandList {
    pub(crate) fn new(shared: Arc<ContextShared>, handle: ListHandle, desc: ListDesc) -> Self {
        Self {
            shared,
            handle,
            desc,
            phase: Mutex::new(ListPhase::Open),
        }
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.desc.execution
    }

    pub fn ordering_mode(&self) -> OrderingMode {
        self.desc.ordering
    }

    pub fn queue_ordinal(&self) -> u32 {
        self.desc.ordinal
    }

    pub(crate) fn handle(&self) -> ListHandle {
        self.handle
    }

    pub(crate) fn is_closed(&self) -> ForgeResult<bool> {
        Ok(*self.phase.lock()? == ListPhase::Closed)
    }

    /// Lifecycle and cross-origin checks shared by the append operations.
    ///
    /// The hazard: an event first signaled on an immediate list and reset
    /// since then, appearing in the wait set of a deferred list. Some
    /// backend versions accept that, others reject it with an
    /// invalid-argument status. Strict mode fails fast here (unless the
    /// backend documents the interop); passthrough forwards the append and
    /// surfaces the backend's verdict untouched.
    fn guard_append(&self, waits: &[&Event]) -> ForgeResult<()> {
        if self.desc.execution == ExecutionMode::Deferred
            && *self.phase.lock()? == ListPhase::Closed
        {
            return Err(ZeForgeError::InvalidState(
                "append on a closed command list".into(),
            ));
        }
        if self.desc.execution == ExecutionMode::Deferred
            && self.shared.compat == CompatMode::Strict
            && !self.shared.caps.immediate_event_interop
        {
            for event in waits {
                if event.is_cross_origin_hazard() {
                    return Err(ZeForgeError::EventIncompatible { index: event.index() });
                }
            }
        }
        Ok(())
    }

    fn wait_handles(waits: &[&Event]) -> Vec<EventHandle> {
        waits.iter().map(|e| e.handle()).collect()
    }

    fn stamp_signal(&self, signal: Option<&Event>) {
        if let Some(event) = signal {
            event.note_signal_use(self.desc.execution);
        }
    }

    /// Append a synchronization-only operation: its wait set gates it, its
    /// signal event reports its retirement
    pub fn append_barrier(&self, signal: Option<&Event>, waits: &[&Event]) -> ForgeResult<()> {
        self.guard_append(waits)?;
        self.shared
            .backend
            .append_barrier(
                self.handle,
                signal.map(|e| e.handle()),
                &Self::wait_handles(waits),
            )
            .map_err(|code| ZeForgeError::backend("append_barrier", code))?;
        self.stamp_signal(signal);
        Ok(())
    }

    /// Append a byte copy between two buffers
    #[allow(clippy::too_many_arguments)]
    pub fn append_copy(
        &self,
        dst: &Buffer,
        dst_offset: usize,
        src: &Buffer,
        src_offset: usize,
        size: usize,
        signal: Option<&Event>,
        waits: &[&Event],
    ) -> ForgeResult<()> {
        self.guard_append(waits)?;
        self.shared
            .backend
            .append_copy(
                self.handle,
                dst.handle(),
                dst_offset,
                src.handle(),
                src_offset,
                size,
                signal.map(|e| e.handle()),
                &Self::wait_handles(waits),
            )
            .map_err(|code| ZeForgeError::backend("append_copy", code))?;
        self.stamp_signal(signal);
        Ok(())
    }

    /// Append a kernel dispatch with the given per-dimension group counts
    pub fn append_launch_kernel(
        &self,
        kernel: &Kernel,
        group_count: GroupCount,
        signal: Option<&Event>,
        waits: &[&Event],
    ) -> ForgeResult<()> {
        self.guard_append(waits)?;
        self.shared
            .backend
            .append_launch_kernel(
                self.handle,
                kernel.handle(),
                group_count,
                signal.map(|e| e.handle()),
                &Self::wait_handles(waits),
            )
            .map_err(|code| ZeForgeError::backend("append_launch_kernel", code))?;
        self.stamp_signal(signal);
        Ok(())
    }

    /// Finalize a deferred list; no further appends until `reset`
    pub fn close(&self) -> ForgeResult<()> {
        if self.desc.execution != ExecutionMode::Deferred {
            return Err(ZeForgeError::InvalidState(
                "close on an immediate command list".into(),
            ));
        }
        self.shared
            .backend
            .close_list(self.handle)
            .map_err(|code| ZeForgeError::backend("close_list", code))?;
        *self.phase.lock()? = ListPhase::Closed;
        Ok(())
    }

    /// Clear all operations and reopen for appends.
    ///
    /// Surfaces the backend's in-use status while submissions of this list
    /// are still in flight.
    pub fn reset(&self) -> ForgeResult<()> {
        if self.desc.execution != ExecutionMode::Deferred {
            return Err(ZeForgeError::InvalidState(
                "reset on an immediate command list".into(),
            ));
        }
        self.shared
            .backend
            .reset_list(self.handle)
            .map_err(|code| ZeForgeError::backend("reset_list", code))?;
        *self.phase.lock()? = ListPhase::Open;
        Ok(())
    }

    /// Block until every operation dispatched through this list has retired
    pub fn synchronize(&self, timeout: Option<Duration>) -> ForgeResult<()> {
        let started = Instant::now();
        match self.shared.backend.synchronize_list(self.handle, timeout) {
            Ok(()) => Ok(()),
            Err(Status::NOT_READY) => Err(ZeForgeError::TimedOut {
                waited_ms: started.elapsed().as_millis() as u64,
            }),
            Err(code) => Err(ZeForgeError::backend("synchronize_list", code)),
        }
    }
}

impl std::fmt::Debug for CommandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandList")
            .field("execution", &self.desc.execution)
            .field("ordering", &self.desc.ordering)
            .field("ordinal", &self.desc.ordinal)
            .finish_non_exhaustive()
    }
}
