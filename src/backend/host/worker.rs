//! Operation execution for the simulated device
//!
//! An operation retires in three steps: block on its wait events (the
//! device-side wait has no timeout), run the payload, then signal its
//! completion event. In-order workers run operations sequentially; each
//! out-of-order operation runs on its own thread.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Instant;

use crate::backend::{GroupCount, KernelTimestamp, OrderingMode};

use super::{BufferCell, EventCell, HostKernelFn, ListCell};

/// Shared time base for device timestamps
pub(super) struct TimeBase {
    pub(super) epoch: Instant,
    pub(super) timer_resolution: u64,
}

impl TimeBase {
    pub(super) fn device_ticks(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64 / self.timer_resolution
    }
}

/// A kernel argument resolved at append time
#[derive(Clone)]
pub(super) enum ResolvedArg {
    Buffer(Arc<BufferCell>),
    I32(i32),
    U32(u32),
}

/// Arguments and dispatch shape handed to a host kernel closure.
///
/// Buffer access copies in and out; the reproducer kernels read their
/// inputs, compute, and write results back in one step each.
pub struct KernelCtx {
    group_count: GroupCount,
    args: Vec<ResolvedArg>,
}

impl KernelCtx {
    pub fn group_count(&self) -> GroupCount {
        self.group_count
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    pub fn scalar_u32(&self, index: usize) -> Option<u32> {
        match self.args.get(index)? {
            ResolvedArg::U32(v) => Some(*v),
            ResolvedArg::I32(v) => u32::try_from(*v).ok(),
            ResolvedArg::Buffer(_) => None,
        }
    }

    pub fn scalar_i32(&self, index: usize) -> Option<i32> {
        match self.args.get(index)? {
            ResolvedArg::I32(v) => Some(*v),
            ResolvedArg::U32(v) => i32::try_from(*v).ok(),
            ResolvedArg::Buffer(_) => None,
        }
    }

    /// Snapshot a buffer argument as little-endian u32 words
    pub fn read_u32(&self, index: usize) -> Option<Vec<u32>> {
        match self.args.get(index)? {
            ResolvedArg::Buffer(buf) => {
                let data = buf.data.lock().ok()?;
                Some(
                    data.chunks_exact(4)
                        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                        .collect(),
                )
            }
            _ => None,
        }
    }

    /// Write little-endian u32 words into a buffer argument; false if the
    /// argument is not a buffer or the words do not fit
    pub fn write_u32(&self, index: usize, words: &[u32]) -> bool {
        match self.args.get(index) {
            Some(ResolvedArg::Buffer(buf)) => {
                let Ok(mut data) = buf.data.lock() else { return false };
                let needed = words.len() * 4;
                if needed > data.len() {
                    return false;
                }
                for (i, w) in words.iter().enumerate() {
                    data[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
                }
                true
            }
            _ => false,
        }
    }
}

/// The payload of one recorded operation
#[derive(Clone)]
pub(super) enum OpKind {
    Barrier,
    Copy {
        dst: Arc<BufferCell>,
        dst_offset: usize,
        src: Arc<BufferCell>,
        src_offset: usize,
        size: usize,
    },
    Kernel {
        name: String,
        func: HostKernelFn,
        args: Vec<ResolvedArg>,
        group_count: GroupCount,
    },
}

#[derive(Clone)]
pub(super) struct OpRecord {
    pub(super) kind: OpKind,
    pub(super) signal: Option<Arc<EventCell>>,
    pub(super) waits: Vec<Arc<EventCell>>,
}

/// One submitted list handed to a queue worker
pub(super) struct QueueWork {
    pub(super) ops: Vec<OpRecord>,
    pub(super) ordering: OrderingMode,
    pub(super) list: Arc<ListCell>,
    pub(super) ack: std::sync::mpsc::Sender<()>,
}

static OP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Signal an event cell, attaching kernel timestamps when the signaling
/// operation was a kernel launch. Idempotent.
pub(super) fn signal_cell(cell: &EventCell, kernel_ts: Option<KernelTimestamp>) {
    let Ok(mut st) = cell.state.lock() else { return };
    if !st.signaled {
        st.signaled = true;
        if kernel_ts.is_some() {
            st.kernel_ts = kernel_ts;
        }
        cell.cv.notify_all();
    }
}

fn wait_cell(cell: &EventCell) {
    let Ok(mut st) = cell.state.lock() else { return };
    while !st.signaled {
        match cell.cv.wait(st) {
            Ok(guard) => st = guard,
            Err(_) => return,
        }
    }
}

/// Execute one operation to retirement: wait, run, signal
pub(super) fn execute_op(op: &OpRecord, time: &TimeBase) {
    let seq = OP_SEQ.fetch_add(1, AtomicOrdering::Relaxed);
    for wait in &op.waits {
        wait_cell(wait);
    }

    let kernel_ts = match &op.kind {
        OpKind::Barrier => None,
        OpKind::Copy { dst, dst_offset, src, src_offset, size } => {
            // Snapshot the source range first so overlapping or identical
            // buffers cannot deadlock the two locks.
            let chunk: Option<Vec<u8>> = src
                .data
                .lock()
                .ok()
                .map(|data| data[*src_offset..*src_offset + *size].to_vec());
            if let (Some(chunk), Ok(mut data)) = (chunk, dst.data.lock()) {
                data[*dst_offset..*dst_offset + chunk.len()].copy_from_slice(&chunk);
            }
            tracing::trace!(seq, size, "host worker: copy retired");
            None
        }
        OpKind::Kernel { name, func, args, group_count } => {
            let start_ticks = time.device_ticks();
            let ctx = KernelCtx { group_count: *group_count, args: args.clone() };
            func(&ctx);
            let end_ticks = time.device_ticks();
            tracing::trace!(seq, kernel = %name, "host worker: kernel retired");
            Some(KernelTimestamp { start_ticks, end_ticks })
        }
    };

    if let Some(signal) = &op.signal {
        signal_cell(signal, kernel_ts);
    }
}

/// Decrement an immediate list's in-flight count and wake synchronizers
pub(super) fn retire_immediate_op(list: &ListCell) {
    if let Ok(mut body) = list.body.lock() {
        body.inflight_ops = body.inflight_ops.saturating_sub(1);
        list.done.notify_all();
    }
}

/// Worker loop for an immediate in-order list: strict program order
pub(super) fn immediate_worker(rx: Receiver<OpRecord>, list: Arc<ListCell>, time: Arc<TimeBase>) {
    while let Ok(op) = rx.recv() {
        execute_op(&op, &time);
        retire_immediate_op(&list);
    }
    tracing::trace!("host worker: immediate list worker exiting");
}

/// Worker loop for a queue: executes submitted lists FIFO
pub(super) fn queue_worker(
    rx: Receiver<QueueWork>,
    queue: Arc<super::QueueCell>,
    time: Arc<TimeBase>,
) {
    while let Ok(work) = rx.recv() {
        // Acceptance handshake for synchronous submission; the submitter
        // may already have gone away.
        let _ = work.ack.send(());

        match work.ordering {
            OrderingMode::InOrder => {
                for op in &work.ops {
                    execute_op(op, &time);
                }
            }
            OrderingMode::OutOfOrder => {
                let handles: Vec<_> = work
                    .ops
                    .iter()
                    .cloned()
                    .map(|op| {
                        let time = Arc::clone(&time);
                        std::thread::spawn(move || execute_op(&op, &time))
                    })
                    .collect();
                for h in handles {
                    let _ = h.join();
                }
            }
        }

        if let Ok(mut body) = work.list.body.lock() {
            body.pending_submissions = body.pending_submissions.saturating_sub(1);
            work.list.done.notify_all();
        }
        if let Ok(mut inflight) = queue.inflight.lock() {
            *inflight = inflight.saturating_sub(1);
            queue.idle.notify_all();
        }
    }
    tracing::trace!("host worker: queue worker exiting");
}
