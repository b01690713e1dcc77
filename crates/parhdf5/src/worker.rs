//! The chunk worker: the consumer side of the write engine.
//!
//! Each worker pops items, runs the resolved filter pipeline over the
//! buffer, and emits the encoded payload with its filter-failure mask
//! through the store's per-chunk write primitive. The first fatal error
//! any worker hits is recorded in a shared slot; after that the workers
//! keep draining the queue without writing, so the producer never blocks,
//! and the error surfaces once everyone has joined.

use std::sync::{Arc, Mutex};

use parhdf5_format::ChunkStore;

use crate::error::WriteError;
use crate::extract::WorkItem;
use crate::queue::WorkQueue;
use crate::resolver::ResolvedPipeline;

/// Read-only call state shared by the producer and all workers.
#[derive(Debug)]
pub struct WorkerContext {
    /// The producer/consumer hand-off.
    pub queue: WorkQueue<WorkItem>,
    /// The resolved filter pipeline, immutable for the call.
    pub pipeline: ResolvedPipeline,
    /// Where encoded chunks are written.
    pub store: Arc<ChunkStore>,
    /// First fatal error recorded by any worker.
    fatal: Mutex<Option<WriteError>>,
}

impl WorkerContext {
    /// Create the shared state for one write call.
    pub fn new(pipeline: ResolvedPipeline, store: Arc<ChunkStore>) -> WorkerContext {
        WorkerContext {
            queue: WorkQueue::new(),
            pipeline,
            store,
            fatal: Mutex::new(None),
        }
    }

    /// Record `err` if no fatal error has been recorded yet.
    pub fn record_fatal(&self, err: WriteError) {
        let mut slot = self.fatal.lock().expect("fatal slot poisoned");
        if slot.is_none() {
            log::warn!("write failed, draining remaining chunks: {err}");
            *slot = Some(err);
        }
    }

    /// Whether some worker already failed the call.
    pub fn fatal_recorded(&self) -> bool {
        self.fatal.lock().expect("fatal slot poisoned").is_some()
    }

    /// Take the recorded error, if any.
    pub fn take_fatal(&self) -> Option<WriteError> {
        self.fatal.lock().expect("fatal slot poisoned").take()
    }
}

/// Result of running the pipeline over one chunk buffer.
#[derive(Debug)]
pub struct PipelineOutcome {
    /// Valid bytes in the buffer after the last filter.
    pub nbytes: usize,
    /// Filter-failure mask for this chunk.
    pub mask: u32,
    /// Id of the first non-optional filter that failed, if any.
    pub failed_required: Option<u16>,
}

/// Run every pipeline stage, in order, over `buf[..nbytes]`.
///
/// Skip slots and failing filters set their mask bit. A failing filter
/// leaves `nbytes` at the stage's input size (the buffer still holds the
/// stage's input) and the remaining stages still run; if the failing
/// filter was required, the outcome carries its id and the chunk must
/// not be written.
pub fn run_pipeline(
    pipeline: &ResolvedPipeline,
    buf: &mut Vec<u8>,
    mut nbytes: usize,
) -> PipelineOutcome {
    let mut mask = 0u32;
    let mut failed_required = None;

    for (idx, stage) in pipeline.stages.iter().enumerate() {
        if stage.is_skip() {
            mask |= 1 << idx;
            continue;
        }
        let flags = u32::from(stage.spec.flags);
        let ret = stage.apply(flags, nbytes, buf);
        if ret == 0 {
            mask |= 1 << idx;
            if !stage.spec.is_optional() && failed_required.is_none() {
                failed_required = Some(stage.spec.filter_id);
            }
        } else {
            nbytes = ret;
        }
    }

    PipelineOutcome {
        nbytes,
        mask,
        failed_required,
    }
}

/// The worker task: pop, filter, write, until end-of-work.
pub fn run(worker_index: usize, ctx: Arc<WorkerContext>) {
    log::trace!("worker {worker_index} started");
    let mut written = 0u64;
    while let Some(item) = ctx.queue.pop() {
        if ctx.fatal_recorded() {
            // Drain mode: free the buffer, keep the queue moving.
            continue;
        }
        if process(&ctx, item) {
            written += 1;
        }
    }
    log::trace!("worker {worker_index} exiting after {written} chunks");
}

fn process(ctx: &WorkerContext, item: WorkItem) -> bool {
    let WorkItem {
        origin,
        mut buf,
        nbytes,
    } = item;

    let outcome = run_pipeline(&ctx.pipeline, &mut buf, nbytes);
    if let Some(filter_id) = outcome.failed_required {
        ctx.record_fatal(WriteError::Pipeline { filter_id, origin });
        return false;
    }

    match ctx
        .store
        .write_encoded_chunk(&origin, &buf[..outcome.nbytes], outcome.mask)
    {
        Ok(()) => true,
        Err(e) => {
            ctx.record_fatal(WriteError::WriteThrough(e));
            false
        }
    }
}
