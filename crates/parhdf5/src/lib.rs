//! Multithreaded filtered chunk writing.
//!
//! One call writes an in-memory N-dimensional array into a chunked,
//! filtered dataset across a pool of worker threads: the calling thread
//! splits the array into chunks and feeds a blocking queue, the workers
//! run the filter pipeline over each chunk and emit the encoded payloads
//! (with their filter-failure masks) into the chunk store.
//!
//! ```no_run
//! use parhdf5::{parallel_filtered_write, Dataset, DatasetCreateProps, Selection};
//!
//! let props = DatasetCreateProps::new().chunk(&[1024, 1024]).deflate(3);
//! let dataset = Dataset::new(&[16384, 4096], 4, props)?;
//! let source: Vec<u8> = vec![0; 16384 * 4096 * 4];
//! parallel_filtered_write(&dataset, Selection::All, &source, 4)?;
//! # Ok::<(), parhdf5::WriteError>(())
//! ```
//!
//! Filters are resolved once per call: builtin codecs and
//! application-registered classes come from the process-wide
//! [`registry`]; everything else is loaded as a shared-object plugin
//! from the `HDF5_PLUGIN_PATH` search directory.

pub mod dataset;
pub mod error;
pub mod extract;
pub mod plugin;
pub mod pool;
pub mod queue;
pub mod registry;
pub mod resolver;
pub mod worker;
pub mod write;

pub use dataset::{Dataset, Selection};
pub use error::WriteError;
pub use pool::{resolve_thread_count, MAX_WORKERS};
pub use queue::WorkQueue;
pub use registry::FilterClass;
pub use write::{parallel_filtered_write, write_filtered_serial};

pub use parhdf5_format::{
    ChunkGrid, ChunkRecord, ChunkStore, DatasetCreateProps, FilterPipeline, FilterSpec,
    FormatError,
};
