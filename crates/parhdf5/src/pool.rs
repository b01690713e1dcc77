//! Fixed-size worker pool: spawn `T` identical workers, join them.
//!
//! Workers live only for the duration of one write call. There is no
//! restart; a panicking worker fails the call at join time.

use std::env;
use std::sync::Arc;
use std::thread;

use crate::error::WriteError;

/// Hard ceiling on the number of worker threads per call.
pub const MAX_WORKERS: usize = 256;

/// Environment fallback consulted when the API thread count is zero.
pub const NTHREADS_ENV: &str = "H5_NTHREADS";

/// Resolve the worker count for one call.
///
/// A nonzero `nthreads` is used as-is; zero falls back to the
/// `H5_NTHREADS` environment variable, and to 1 when that is unset.
/// The variable must be ASCII decimal digits only; anything else prints a
/// diagnostic on stderr and falls back to 1. Environment values are
/// clamped into `[1, MAX_WORKERS]`.
///
/// # Errors
///
/// An explicit `nthreads` above [`MAX_WORKERS`] is an argument error.
pub fn resolve_thread_count(nthreads: usize) -> Result<usize, WriteError> {
    if nthreads > MAX_WORKERS {
        return Err(WriteError::Argument(format!(
            "nthreads {nthreads} exceeds the ceiling of {MAX_WORKERS}"
        )));
    }
    if nthreads > 0 {
        return Ok(nthreads);
    }
    match env::var(NTHREADS_ENV) {
        Ok(value) => Ok(parse_env_thread_count(&value)),
        Err(_) => Ok(1),
    }
}

fn parse_env_thread_count(value: &str) -> usize {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        eprintln!("{NTHREADS_ENV} not valid.");
        return 1;
    }
    match value.parse::<usize>() {
        Ok(n) => n.clamp(1, MAX_WORKERS),
        Err(_) => {
            eprintln!("{NTHREADS_ENV} not valid.");
            1
        }
    }
}

/// A fixed set of joined-on-demand worker threads.
pub struct WorkerPool {
    handles: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers, each running `task(worker_index, ctx)`.
    ///
    /// # Errors
    ///
    /// Fails when the OS refuses to spawn a thread. Workers spawned
    /// before the failure are abandoned to their task function; the
    /// caller is expected to unblock them (close the queue) and bail.
    pub fn spawn<C, F>(count: usize, ctx: &Arc<C>, task: F) -> Result<WorkerPool, WriteError>
    where
        C: Send + Sync + 'static,
        F: Fn(usize, Arc<C>) + Send + Clone + 'static,
    {
        let mut handles = Vec::with_capacity(count);
        for worker_index in 0..count {
            let ctx = Arc::clone(ctx);
            let task = task.clone();
            let handle = thread::Builder::new()
                .name(format!("parhdf5-worker-{worker_index}"))
                .spawn(move || task(worker_index, ctx))?;
            handles.push(handle);
        }
        log::debug!("spawned {count} filter workers");
        Ok(WorkerPool { handles })
    }

    /// Number of workers in the pool.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the pool has no workers.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Join every worker.
    ///
    /// # Errors
    ///
    /// Reports [`WriteError::WorkerPanic`] if any worker panicked; the
    /// remaining workers are still joined first.
    pub fn join(self) -> Result<(), WriteError> {
        let mut panicked = false;
        for handle in self.handles {
            if handle.join().is_err() {
                panicked = true;
            }
        }
        if panicked {
            Err(WriteError::WorkerPanic)
        } else {
            Ok(())
        }
    }
}
