//! Level-Zero FFI bindings
//!
//! FFI declarations below are bound to the Level-Zero loader. The dead_code
//! allowance is needed because FFI symbols appear unused to the compiler
//! (they are only called through unsafe blocks).

use std::ffi::c_void;

#[link(name = "ze_loader")]
#[allow(dead_code)]
extern "C" {
    pub fn zeInit(flags: u32) -> i32;
    pub fn zeDriverGet(count: *mut u32, drivers: *mut *mut c_void) -> i32;
    pub fn zeDeviceGet(driver: *mut c_void, count: *mut u32, devices: *mut *mut c_void) -> i32;
    pub fn zeContextCreate(driver: *mut c_void, desc: *const c_void, context: *mut *mut c_void)
        -> i32;
    pub fn zeContextDestroy(context: *mut c_void) -> i32;
    pub fn zeCommandQueueCreate(
        context: *mut c_void,
        device: *mut c_void,
        desc: *const c_void,
        queue: *mut *mut c_void,
    ) -> i32;
    pub fn zeCommandQueueDestroy(queue: *mut c_void) -> i32;
    pub fn zeCommandQueueExecuteCommandLists(
        queue: *mut c_void,
        count: u32,
        lists: *mut *mut c_void,
        fence: *mut c_void,
    ) -> i32;
    pub fn zeCommandQueueSynchronize(queue: *mut c_void, timeout: u64) -> i32;
    pub fn zeCommandListCreate(
        context: *mut c_void,
        device: *mut c_void,
        desc: *const c_void,
        list: *mut *mut c_void,
    ) -> i32;
    pub fn zeCommandListCreateImmediate(
        context: *mut c_void,
        device: *mut c_void,
        queue_desc: *const c_void,
        list: *mut *mut c_void,
    ) -> i32;
    pub fn zeCommandListDestroy(list: *mut c_void) -> i32;
    pub fn zeCommandListClose(list: *mut c_void) -> i32;
    pub fn zeCommandListReset(list: *mut c_void) -> i32;
    pub fn zeCommandListHostSynchronize(list: *mut c_void, timeout: u64) -> i32;
    pub fn zeCommandListAppendBarrier(
        list: *mut c_void,
        signal: *mut c_void,
        num_waits: u32,
        waits: *mut *mut c_void,
    ) -> i32;
    pub fn zeCommandListAppendMemoryCopy(
        list: *mut c_void,
        dst: *mut c_void,
        src: *const c_void,
        size: usize,
        signal: *mut c_void,
        num_waits: u32,
        waits: *mut *mut c_void,
    ) -> i32;
    pub fn zeCommandListAppendLaunchKernel(
        list: *mut c_void,
        kernel: *mut c_void,
        group_count: *const c_void,
        signal: *mut c_void,
        num_waits: u32,
        waits: *mut *mut c_void,
    ) -> i32;
    pub fn zeEventPoolCreate(
        context: *mut c_void,
        desc: *const c_void,
        num_devices: u32,
        devices: *mut *mut c_void,
        pool: *mut *mut c_void,
    ) -> i32;
    pub fn zeEventPoolDestroy(pool: *mut c_void) -> i32;
    pub fn zeEventCreate(pool: *mut c_void, desc: *const c_void, event: *mut *mut c_void) -> i32;
    pub fn zeEventDestroy(event: *mut c_void) -> i32;
    pub fn zeEventHostSignal(event: *mut c_void) -> i32;
    pub fn zeEventHostReset(event: *mut c_void) -> i32;
    pub fn zeEventQueryStatus(event: *mut c_void) -> i32;
    pub fn zeEventHostSynchronize(event: *mut c_void, timeout: u64) -> i32;
    pub fn zeEventQueryKernelTimestamp(event: *mut c_void, result: *mut c_void) -> i32;
    pub fn zeMemAllocDevice(
        context: *mut c_void,
        desc: *const c_void,
        size: usize,
        alignment: usize,
        device: *mut c_void,
        ptr: *mut *mut c_void,
    ) -> i32;
    pub fn zeMemAllocShared(
        context: *mut c_void,
        device_desc: *const c_void,
        host_desc: *const c_void,
        size: usize,
        alignment: usize,
        device: *mut c_void,
        ptr: *mut *mut c_void,
    ) -> i32;
    pub fn zeMemFree(context: *mut c_void, ptr: *mut c_void) -> i32;
    pub fn zeModuleCreate(
        context: *mut c_void,
        device: *mut c_void,
        desc: *const c_void,
        module: *mut *mut c_void,
        build_log: *mut *mut c_void,
    ) -> i32;
    pub fn zeModuleDestroy(module: *mut c_void) -> i32;
    pub fn zeModuleBuildLogGetString(log: *mut c_void, size: *mut usize, text: *mut i8) -> i32;
    pub fn zeModuleBuildLogDestroy(log: *mut c_void) -> i32;
    pub fn zeKernelCreate(module: *mut c_void, desc: *const c_void, kernel: *mut *mut c_void)
        -> i32;
    pub fn zeKernelDestroy(kernel: *mut c_void) -> i32;
    pub fn zeKernelSetGroupSize(kernel: *mut c_void, x: u32, y: u32, z: u32) -> i32;
    pub fn zeKernelSuggestGroupSize(
        kernel: *mut c_void,
        global_x: u32,
        global_y: u32,
        global_z: u32,
        group_x: *mut u32,
        group_y: *mut u32,
        group_z: *mut u32,
    ) -> i32;
    pub fn zeKernelSetArgumentValue(
        kernel: *mut c_void,
        index: u32,
        size: usize,
        value: *const c_void,
    ) -> i32;
    pub fn zeDeviceGetProperties(device: *mut c_void, props: *mut c_void) -> i32;
    pub fn zeDeviceGetCommandQueueGroupProperties(
        device: *mut c_void,
        count: *mut u32,
        props: *mut c_void,
    ) -> i32;
    pub fn zeDeviceGetGlobalTimestamps(
        device: *mut c_void,
        host_ts: *mut u64,
        device_ts: *mut u64,
    ) -> i32;
}
