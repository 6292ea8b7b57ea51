//! Level-Zero FFI backend (feature `level-zero`)
//!
//! Declarations for the `ze_*` entry points the scheduler maps onto. This
//! module links against a real Level-Zero loader and is not exercised by the
//! test suite; the reproducers run against [`crate::backend::HostBackend`]
//! unless pointed at real hardware.

pub mod ffi;

/// Raw `ze_result_t` success code
pub const ZE_RESULT_SUCCESS: i32 = 0;
/// Raw `ze_result_t` for a wait that expired
pub const ZE_RESULT_NOT_READY: i32 = 1;
/// Raw `ze_result_t` the interop rejection surfaces as
pub const ZE_RESULT_ERROR_INVALID_ARGUMENT: i32 = 0x78000004u32 as i32;

/// Check a raw `ze_result_t` against the crate's status type
pub fn check(result: i32) -> Result<(), crate::backend::Status> {
    if result == ZE_RESULT_SUCCESS {
        Ok(())
    } else {
        Err(crate::backend::Status(result))
    }
}
