//! Reference kernels for the host backend
//!
//! Host-closure implementations of the kernels the reproducer programs
//! dispatch. Programs still go through the normal module path: compile a
//! manifest exporting these names, look the kernel up, bind arguments,
//! launch.

use std::time::Duration;

use super::HostBackend;

/// Manifest exporting every reference kernel; hand to `compile_module`
pub const REFERENCE_MANIFEST: &[u8] = b"# zeforge reference kernels\nmxm\nset_one\nspin\n";

/// Register the reference kernels on a backend
pub fn register_reference_kernels(backend: &HostBackend) {
    // mxm: integer matrix multiply, C = A * B for n x n matrices.
    // args: 0 = dst, 1 = a, 2 = b, 3 = n
    backend.register_kernel("mxm", |ctx| {
        let (Some(a), Some(b), Some(n)) =
            (ctx.read_u32(1), ctx.read_u32(2), ctx.scalar_u32(3))
        else {
            tracing::error!("mxm: bad argument list");
            return;
        };
        let n = n as usize;
        if a.len() < n * n || b.len() < n * n {
            tracing::error!("mxm: input buffers smaller than {}x{}", n, n);
            return;
        }
        let mut out = vec![0u32; n * n];
        for i in 0..n {
            for k in 0..n {
                let aik = a[i * n + k];
                let row = &b[k * n..k * n + n];
                let out_row = &mut out[i * n..i * n + n];
                for j in 0..n {
                    out_row[j] = out_row[j].wrapping_add(aik.wrapping_mul(row[j]));
                }
            }
        }
        ctx.write_u32(0, &out);
    });

    // set_one: first-touch probe, writes 1 into the first word of arg 0
    backend.register_kernel("set_one", |ctx| {
        ctx.write_u32(0, &[1]);
    });

    // spin: occupies the device for arg 0 milliseconds (default 50)
    backend.register_kernel("spin", |ctx| {
        let ms = ctx.scalar_u32(0).unwrap_or(50);
        std::thread::sleep(Duration::from_millis(ms as u64));
    });
}
