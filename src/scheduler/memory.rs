//! Context-owned memory allocations
//!
//! Buffers may be referenced by multiple command lists concurrently. Host
//! and shared allocations are directly readable/writable from the host;
//! device allocations must go through copy operations on a command list.

use std::sync::Arc;

use crate::backend::{MemHandle, MemoryKind};
use crate::error::{ForgeResult, ZeForgeError};
use crate::scheduler::context::ContextShared;

/// A device/host/shared memory allocation owned by its context
pub struct Buffer {
    shared: Arc<ContextShared>,
    handle: MemHandle,
    kind: MemoryKind,
    size: usize,
}

impl Buffer {
    pub(crate) fn new(
        shared: Arc<ContextShared>,
        handle: MemHandle,
        kind: MemoryKind,
        size: usize,
    ) -> Self {
        Self { shared, handle, kind, size }
    }

    pub fn kind(&self) -> MemoryKind {
        self.kind
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn handle(&self) -> MemHandle {
        self.handle
    }

    /// This buffer as a kernel argument
    pub fn as_arg(&self) -> crate::backend::KernelArg {
        crate::backend::KernelArg::Buffer(self.handle)
    }

    /// Host-side byte write; rejected by the backend for device-resident
    /// memory
    pub fn write_bytes(&self, offset: usize, bytes: &[u8]) -> ForgeResult<()> {
        self.shared
            .backend
            .write_memory(self.handle, offset, bytes)
            .map_err(|code| ZeForgeError::backend("write_memory", code))
    }

    /// Host-side byte read; rejected by the backend for device-resident
    /// memory
    pub fn read_bytes(&self, offset: usize, out: &mut [u8]) -> ForgeResult<()> {
        self.shared
            .backend
            .read_memory(self.handle, offset, out)
            .map_err(|code| ZeForgeError::backend("read_memory", code))
    }

    /// Fill the whole allocation with one little-endian u32 word
    pub fn fill_u32(&self, word: u32) -> ForgeResult<()> {
        let words = self.size / 4;
        let mut bytes = Vec::with_capacity(words * 4);
        for _ in 0..words {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        self.write_bytes(0, &bytes)
    }

    /// Read the whole allocation as little-endian u32 words
    pub fn read_u32(&self) -> ForgeResult<Vec<u32>> {
        let mut bytes = vec![0u8; self.size - self.size % 4];
        self.read_bytes(0, &mut bytes)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Err(code) = self.shared.backend.free_memory(self.handle) {
            tracing::warn!(%code, size = self.size, "free_memory failed");
        }
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("kind", &self.kind)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}
