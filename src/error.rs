//! Unified error handling for ZeForge
//!
//! This module provides a centralized error type that consolidates all
//! scheduler-level failures. It implements error categorization for:
//! - Backend errors (raw device/driver status codes)
//! - Scheduler errors (lifecycle and capacity violations)
//! - Validation errors (computed results diverging from a reference)
//! - Resource errors (missing kernel binaries, I/O)

use std::path::PathBuf;

use crate::backend::Status;

// Re-export thiserror for convenience
pub use thiserror;

/// Unified error type for ZeForge
///
/// Backend failures carry the backend's raw status code together with the
/// name of the trait call that produced it, so reproducer output can print
/// the call site and numeric code the way the original diagnostics did.
#[derive(Debug, thiserror::Error)]
pub enum ZeForgeError {
    // ========== Backend Errors ==========
    /// A device-backend call returned a non-success status.
    ///
    /// Never fatal inside the library; the example/CLI layer decides
    /// whether to abort.
    #[error("backend call `{call}` failed: {code}")]
    Backend { call: &'static str, code: Status },

    // ========== Scheduler Errors ==========
    /// Event pool is full, or the requested index is occupied/out of range
    #[error("event pool capacity exceeded: {detail}")]
    CapacityExceeded { detail: String },

    /// A deferred command list was submitted before `close()`
    #[error("command list not closed before submission")]
    NotClosed,

    /// A host-side wait expired before the event signaled
    #[error("wait timed out after {waited_ms} ms")]
    TimedOut { waited_ms: u64 },

    /// Global size is not divisible by the group size and the backend does
    /// not support partial groups
    #[error("dispatch shape mismatch in dim {dim}: global {global} % group {group} != 0")]
    ShapeMismatch { dim: usize, global: u32, group: u32 },

    /// Cross-origin event use rejected by the strict compatibility mode:
    /// the event was first signaled on an immediate list, has been reset,
    /// and is now a wait dependency on a deferred list
    #[error("event {index} is immediate-origin and was reset; not usable as a wait on a deferred list")]
    EventIncompatible { index: u32 },

    /// Operation invalid for the object's current lifecycle state
    #[error("invalid state: {0}")]
    InvalidState(String),

    // ========== Validation Errors ==========
    /// Computed result differs from the sequential reference.
    ///
    /// Reported, non-fatal: comparison harnesses continue after this.
    #[error("validation mismatch at element {index}: expected {expected}, got {actual}")]
    ValidationMismatch { index: usize, expected: u32, actual: u32 },

    // ========== Resource Errors ==========
    /// Kernel binary file missing from disk
    #[error("kernel binary not found: {path}")]
    ResourceNotFound { path: PathBuf },

    /// Other I/O failure while reading a kernel binary
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal lock poisoned - this indicates a bug: {0}")]
    LockPoisoned(String),
}

impl<T> From<std::sync::PoisonError<T>> for ZeForgeError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        ZeForgeError::LockPoisoned(format!("lock poisoned: {}", err))
    }
}

/// Convenience result type used throughout the scheduler
pub type ForgeResult<T> = Result<T, ZeForgeError>;

/// Coarse classification used by callers deciding abort-vs-propagate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Raw status from the device backend
    Backend,
    /// Lifecycle or capacity violation in the scheduler itself
    Scheduler,
    /// Result diverged from the reference computation
    Validation,
    /// Missing or unreadable external resource
    Resource,
    /// Internal bug (poisoned lock)
    Internal,
}

impl ZeForgeError {
    /// Build a `Backend` error from a trait call name and raw status
    pub fn backend(call: &'static str, code: Status) -> Self {
        ZeForgeError::Backend { call, code }
    }

    /// Classify this error for reporting
    pub fn category(&self) -> ErrorCategory {
        match self {
            ZeForgeError::Backend { .. } => ErrorCategory::Backend,
            ZeForgeError::CapacityExceeded { .. }
            | ZeForgeError::NotClosed
            | ZeForgeError::TimedOut { .. }
            | ZeForgeError::ShapeMismatch { .. }
            | ZeForgeError::EventIncompatible { .. }
            | ZeForgeError::InvalidState(_) => ErrorCategory::Scheduler,
            ZeForgeError::ValidationMismatch { .. } => ErrorCategory::Validation,
            ZeForgeError::ResourceNotFound { .. } | ZeForgeError::Io(_) => ErrorCategory::Resource,
            ZeForgeError::LockPoisoned(_) => ErrorCategory::Internal,
        }
    }

    /// Whether a comparison harness should keep running after this error.
    ///
    /// Validation mismatches are reported via a boolean outcome so harnesses
    /// can continue; backend rejections of cross-origin event use are
    /// likewise reported rather than masked. Everything else is fatal at the
    /// program boundary (the library itself always propagates).
    pub fn is_reportable(&self) -> bool {
        matches!(
            self,
            ZeForgeError::ValidationMismatch { .. } | ZeForgeError::Backend { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_carries_call_site() {
        let err = ZeForgeError::backend("create_event_pool", Status(0x78000004));
        assert_eq!(err.category(), ErrorCategory::Backend);
        let msg = err.to_string();
        assert!(msg.contains("create_event_pool"), "message was: {}", msg);
        assert!(msg.contains("0x78000004"), "message was: {}", msg);
    }

    #[test]
    fn test_categories() {
        assert_eq!(ZeForgeError::NotClosed.category(), ErrorCategory::Scheduler);
        assert_eq!(
            ZeForgeError::ValidationMismatch { index: 0, expected: 6144, actual: 0 }.category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            ZeForgeError::ResourceNotFound { path: PathBuf::from("kernel.spv") }.category(),
            ErrorCategory::Resource
        );
    }

    #[test]
    fn test_timed_out_display() {
        let err = ZeForgeError::TimedOut { waited_ms: 250 };
        assert!(err.to_string().contains("250"));
    }
}
