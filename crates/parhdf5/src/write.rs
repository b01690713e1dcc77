//! Entry points: the parallel filtered write and its single-threaded
//! reference twin.
//!
//! The calling thread validates arguments, resolves the filter pipeline
//! once, spawns the workers, and then acts as the producer, driving the
//! chunk extractor. Workers are always joined before the call returns;
//! the first fatal error any of them recorded is what the caller sees.
//!
//! On a fatal error some chunks may already be stored. The engine does
//! not roll back; callers needing atomicity wrap the call in their own
//! transaction.

use std::sync::Arc;

use parhdf5_format::chunk_grid::ChunkGrid;

use crate::dataset::{Dataset, Selection};
use crate::error::WriteError;
use crate::extract::{extract_chunks, materialize_chunk};
use crate::pool::{resolve_thread_count, WorkerPool};
use crate::resolver::resolve_pipeline;
use crate::worker::{self, run_pipeline, WorkerContext};

fn validate_write(dataset: &Dataset, source: &[u8]) -> Result<ChunkGrid, WriteError> {
    let grid = dataset.grid()?;
    let expected = grid.dataset_elements() * dataset.element_size();
    if source.len() != expected {
        return Err(WriteError::Argument(format!(
            "source buffer is {} bytes, the dataset extent needs {expected}",
            source.len()
        )));
    }
    Ok(grid)
}

/// Write `source` into `dataset`, filtering and storing chunks across a
/// pool of worker threads.
///
/// `nthreads == 0` falls back to the `H5_NTHREADS` environment variable
/// and then to one worker. The call is synchronous: every worker is
/// joined before it returns. Chunk-to-disk ordering is unspecified, but
/// on success the stored state is identical to the serial path's.
///
/// # Errors
///
/// Argument and resolution errors abort before any worker starts and
/// leave the store untouched. Pipeline, write-through, and resource
/// errors surface after join; already-written chunks stay written.
pub fn parallel_filtered_write(
    dataset: &Dataset,
    selection: Selection,
    source: &[u8],
    nthreads: usize,
) -> Result<(), WriteError> {
    let Selection::All = selection;
    let grid = validate_write(dataset, source)?;
    let element_size = dataset.element_size();
    let nworkers = resolve_thread_count(nthreads)?;

    let pipeline = dataset.pipeline();
    let resolved = resolve_pipeline(&pipeline, element_size, grid.chunk_dims())?;

    log::debug!(
        "parallel filtered write: {} chunks, {} pipeline stages, {nworkers} workers",
        grid.total_chunks(),
        resolved.len()
    );

    let ctx = Arc::new(WorkerContext::new(resolved, dataset.store()));
    let pool = match WorkerPool::spawn(nworkers, &ctx, worker::run) {
        Ok(pool) => pool,
        Err(e) => {
            // Unblock any workers that did spawn so they exit cleanly.
            ctx.queue.close();
            return Err(e);
        }
    };

    extract_chunks(source, &grid, element_size, &ctx.queue);
    let join_result = pool.join();

    if let Some(err) = ctx.take_fatal() {
        return Err(err);
    }
    join_result
}

/// The single-threaded reference path: same validation, same resolution,
/// same per-chunk pipeline semantics, no worker pool.
///
/// For any deterministic pipeline the resulting store state is
/// byte-identical to a successful [`parallel_filtered_write`].
pub fn write_filtered_serial(
    dataset: &Dataset,
    selection: Selection,
    source: &[u8],
) -> Result<(), WriteError> {
    let Selection::All = selection;
    let grid = validate_write(dataset, source)?;
    let element_size = dataset.element_size();

    let pipeline = dataset.pipeline();
    let resolved = resolve_pipeline(&pipeline, element_size, grid.chunk_dims())?;
    let store = dataset.store();

    for origin in grid.origins() {
        let mut item = materialize_chunk(source, &grid, element_size, &origin);
        let outcome = run_pipeline(&resolved, &mut item.buf, item.nbytes);
        if let Some(filter_id) = outcome.failed_required {
            return Err(WriteError::Pipeline {
                filter_id,
                origin: item.origin,
            });
        }
        store.write_encoded_chunk(&item.origin, &item.buf[..outcome.nbytes], outcome.mask)?;
    }
    Ok(())
}
