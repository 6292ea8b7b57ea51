//! Timing infrastructure
//!
//! Two independently queryable clocks: the host wall clock and the device
//! timestamp counter. They are deliberately kept decoupled; pick one per
//! measurement and convert device ticks with the documented formula.

mod timer;

pub use timer::{DeviceClock, GlobalTimestamps, HostTimer};
