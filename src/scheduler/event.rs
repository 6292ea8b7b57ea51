//! Events and event pools
//!
//! An event is a binary completion signal. The pool is a fixed-capacity
//! allocator that owns the index free-list: callers either pick an index
//! explicitly (`create_event`) or take the next free one (`allocate_event`),
//! and a dropped event returns its index for reuse.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::backend::{EventHandle, EventPoolHandle, ExecutionMode, KernelTimestamp, Status};
use crate::error::{ForgeResult, ZeForgeError};
use crate::scheduler::context::ContextShared;

/// Host-visible event state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Unsignaled,
    Signaled,
}

/// Fixed-capacity allocator of events, lifetime-bound to a context
pub struct EventPool {
    shared: Arc<ContextShared>,
    handle: EventPoolHandle,
    capacity: u32,
    slots: Arc<Mutex<Vec<bool>>>,
}

impl EventPool {
    pub(crate) fn new(
        shared: Arc<ContextShared>,
        handle: EventPoolHandle,
        capacity: u32,
    ) -> Self {
        Self {
            shared,
            handle,
            capacity,
            slots: Arc::new(Mutex::new(vec![false; capacity as usize])),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Create the event at a caller-chosen index.
    ///
    /// Fails with `CapacityExceeded` if the index is out of range or already
    /// occupied; indices never alias.
    pub fn create_event(&self, index: u32) -> ForgeResult<Event> {
        if index >= self.capacity {
            return Err(ZeForgeError::CapacityExceeded {
                detail: format!("index {} >= capacity {}", index, self.capacity),
            });
        }
        {
            let mut slots = self.slots.lock()?;
            if slots[index as usize] {
                return Err(ZeForgeError::CapacityExceeded {
                    detail: format!("index {} already occupied", index),
                });
            }
            slots[index as usize] = true;
        }
        let handle = match self.shared.backend.create_event(self.handle, index) {
            Ok(h) => h,
            Err(code) => {
                self.slots.lock()?[index as usize] = false;
                return Err(ZeForgeError::backend("create_event", code));
            }
        };
        tracing::trace!(index, "event created");
        Ok(Event {
            inner: Arc::new(EventInner {
                shared: Arc::clone(&self.shared),
                handle,
                index,
                slots: Arc::clone(&self.slots),
                origin: Mutex::new(None),
                reset_since_first_use: AtomicBool::new(false),
            }),
        })
    }

    /// Create an event at the next free index, failing closed with
    /// `CapacityExceeded` on exhaustion
    pub fn allocate_event(&self) -> ForgeResult<Event> {
        let index = {
            let slots = self.slots.lock()?;
            slots.iter().position(|used| !used)
        };
        match index {
            Some(i) => self.create_event(i as u32),
            None => Err(ZeForgeError::CapacityExceeded {
                detail: format!("all {} indices in use", self.capacity),
            }),
        }
    }
}

impl std::fmt::Debug for EventPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPool")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

/// A binary completion signal.
///
/// Cloning shares the same underlying event; any number of operations may
/// wait on it, but at most one in-flight operation may be its producer at a
/// time (the backend does not arbitrate that).
#[derive(Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

struct EventInner {
    shared: Arc<ContextShared>,
    handle: EventHandle,
    index: u32,
    slots: Arc<Mutex<Vec<bool>>>,
    /// Execution mode of the list that first appended this event as a
    /// signal target; immutable once set
    origin: Mutex<Option<ExecutionMode>>,
    reset_since_first_use: AtomicBool,
}

impl Event {
    pub fn index(&self) -> u32 {
        self.inner.index
    }

    pub(crate) fn handle(&self) -> EventHandle {
        self.inner.handle
    }

    /// Host-side signal; idempotent
    pub fn signal(&self) -> ForgeResult<()> {
        self.inner
            .shared
            .backend
            .signal_event(self.inner.handle)
            .map_err(|code| ZeForgeError::backend("signal_event", code))
    }

    /// Return the event to `Unsignaled`.
    ///
    /// Resetting while a device operation still waits on the event is
    /// undefined at the backend level; synchronize first.
    pub fn reset(&self) -> ForgeResult<()> {
        self.inner
            .shared
            .backend
            .reset_event(self.inner.handle)
            .map_err(|code| ZeForgeError::backend("reset_event", code))?;
        if *self.inner.origin.lock()? == Some(ExecutionMode::Immediate) {
            self.inner.reset_since_first_use.store(true, Ordering::Release);
        }
        Ok(())
    }

    /// Non-blocking state query
    pub fn query(&self) -> ForgeResult<EventStatus> {
        let signaled = self
            .inner
            .shared
            .backend
            .query_event(self.inner.handle)
            .map_err(|code| ZeForgeError::backend("query_event", code))?;
        Ok(if signaled { EventStatus::Signaled } else { EventStatus::Unsignaled })
    }

    /// Block the calling thread until signaled or the timeout elapses.
    ///
    /// Returns immediately once already signaled; does not mutate event
    /// state. A timeout abandons only the host wait — any device operation
    /// producing this event keeps running.
    pub fn wait(&self, timeout: Option<Duration>) -> ForgeResult<()> {
        let started = Instant::now();
        match self.inner.shared.backend.wait_event(self.inner.handle, timeout) {
            Ok(()) => Ok(()),
            Err(Status::NOT_READY) => Err(ZeForgeError::TimedOut {
                waited_ms: started.elapsed().as_millis() as u64,
            }),
            Err(code) => Err(ZeForgeError::backend("wait_event", code)),
        }
    }

    /// Device start/end ticks of the kernel launch that signaled this event
    pub fn kernel_timestamp(&self) -> ForgeResult<KernelTimestamp> {
        self.inner
            .shared
            .backend
            .kernel_timestamp(self.inner.handle)
            .map_err(|code| ZeForgeError::backend("kernel_timestamp", code))
    }

    /// Execution-mode class of the list that first used this event as a
    /// signal target, if any
    pub fn origin(&self) -> Option<ExecutionMode> {
        self.inner.origin.lock().ok().and_then(|g| *g)
    }

    pub(crate) fn note_signal_use(&self, mode: ExecutionMode) {
        if let Ok(mut origin) = self.inner.origin.lock() {
            if origin.is_none() {
                *origin = Some(mode);
            }
        }
    }

    /// Immediate origin and reset since first use: the combination some
    /// backends reject as a wait dependency on deferred lists
    pub(crate) fn is_cross_origin_hazard(&self) -> bool {
        self.origin() == Some(ExecutionMode::Immediate)
            && self.inner.reset_since_first_use.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("index", &self.inner.index)
            .field("origin", &self.origin())
            .finish_non_exhaustive()
    }
}

impl Drop for EventInner {
    fn drop(&mut self) {
        if let Ok(mut slots) = self.slots.lock() {
            slots[self.index as usize] = false;
        }
        if let Err(code) = self.shared.backend.destroy_event(self.handle) {
            tracing::warn!(index = self.index, %code, "destroy_event failed");
        }
    }
}
