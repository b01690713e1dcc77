//! Error types for the parallel write engine.

use parhdf5_format::FormatError;

/// Errors reported by the parallel filtered write path.
///
/// Argument and resolution errors are detected before any worker starts
/// and leave the store untouched. Pipeline, write-through, and resource
/// errors are recorded by whichever worker hits them first and surface
/// after all workers have been joined; chunks written before that point
/// stay written.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// A caller-supplied argument is invalid.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// A required filter could not be resolved to a callable.
    #[error("cannot resolve filter {filter_id}: {reason}")]
    Resolution {
        /// The pipeline filter id that failed to resolve.
        filter_id: u16,
        /// Why resolution failed.
        reason: String,
    },

    /// An allocation failed.
    #[error("allocation of {nbytes} bytes failed")]
    Resource {
        /// The requested allocation size.
        nbytes: usize,
    },

    /// A non-optional filter returned failure on a chunk.
    #[error("required filter {filter_id} failed on chunk at origin {origin:?}")]
    Pipeline {
        /// The failing filter id.
        filter_id: u16,
        /// Origin of the chunk it failed on.
        origin: Vec<u64>,
    },

    /// The storage layer rejected a chunk write.
    #[error("chunk write failed: {0}")]
    WriteThrough(#[from] FormatError),

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// A worker thread panicked; the write is failed.
    #[error("worker thread panicked")]
    WorkerPanic,
}
