//! Kernel binary loading
//!
//! Reads a precompiled kernel binary from disk and hands the bytes to the
//! backend; nothing more. Compilation of kernel source is out of scope.

use std::path::Path;

use crate::error::{ForgeResult, ZeForgeError};
use crate::scheduler::{Context, Module};

/// Read a kernel binary from disk.
///
/// Fails with `ResourceNotFound` when the file is absent.
pub fn read_kernel_binary(path: impl AsRef<Path>) -> ForgeResult<Vec<u8>> {
    let path = path.as_ref();
    match std::fs::read(path) {
        Ok(bytes) => {
            tracing::debug!(path = %path.display(), len = bytes.len(), "kernel binary read");
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ZeForgeError::ResourceNotFound { path: path.to_path_buf() })
        }
        Err(e) => Err(ZeForgeError::Io(e)),
    }
}

/// Read a kernel binary and compile it through the context's backend
pub fn load_module(ctx: &Context, path: impl AsRef<Path>) -> ForgeResult<Module> {
    let binary = read_kernel_binary(path)?;
    ctx.compile_module(&binary)
}
