//! Host-side format layer for the parhdf5 parallel write engine.
//!
//! This crate holds the pieces of the storage layer the write engine
//! consumes: the chunk grid arithmetic, filter pipeline descriptors,
//! builtin filter codecs, dataset creation properties, and the
//! thread-safe chunk store that encoded chunks are emitted into.

pub mod chunk_grid;
pub mod chunk_store;
pub mod error;
pub mod filter_pipeline;
pub mod filters;
pub mod property_list;

pub use chunk_grid::ChunkGrid;
pub use chunk_store::{ChunkRecord, ChunkStore};
pub use error::FormatError;
pub use filter_pipeline::{FilterPipeline, FilterSpec};
pub use property_list::DatasetCreateProps;
