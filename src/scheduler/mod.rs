//! Execution-graph scheduler core
//!
//! A [`Context`] owns the backend connection and hands out event pools,
//! command lists, queues, buffers, and compiled modules. Events cross list
//! boundaries to express dependencies between independently scheduled units
//! of work; the compatibility rules for doing so live in
//! [`list::CommandList`].

pub mod context;
pub mod dispatch;
pub mod event;
pub mod list;
pub mod memory;
pub mod module;
pub mod queue;

pub use context::{CompatMode, Context, ContextConfig};
pub use dispatch::DispatchShape;
pub use event::{Event, EventPool, EventStatus};
pub use list::CommandList;
pub use memory::Buffer;
pub use module::{Kernel, Module};
pub use queue::CommandQueue;
