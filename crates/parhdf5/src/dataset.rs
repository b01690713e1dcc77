//! Dataset handles for the write engine.
//!
//! A [`Dataset`] bundles what the engine needs from the host object
//! model: the logical extent, the element size, the creation properties
//! (chunk shape and filter pipeline), and the chunk store the encoded
//! chunks land in.

use std::sync::Arc;

use parhdf5_format::chunk_grid::{ChunkGrid, MAX_RANK};
use parhdf5_format::filter_pipeline::FilterPipeline;
use parhdf5_format::{ChunkStore, DatasetCreateProps};

use crate::error::WriteError;

/// Dataspace selection for a write.
///
/// Only the full-extent selection is supported on this path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// The whole dataset extent.
    All,
}

/// A chunked dataset open for writing.
#[derive(Debug)]
pub struct Dataset {
    shape: Vec<u64>,
    element_size: usize,
    props: DatasetCreateProps,
    store: Arc<ChunkStore>,
}

impl Dataset {
    /// Create a dataset over a fresh chunk store.
    ///
    /// # Errors
    ///
    /// Fails on a rank outside `1..=32`, a zero extent, or a zero
    /// element size.
    pub fn new(
        shape: &[u64],
        element_size: usize,
        props: DatasetCreateProps,
    ) -> Result<Dataset, WriteError> {
        if shape.is_empty() || shape.len() > MAX_RANK {
            return Err(WriteError::Argument(format!(
                "dataset rank {} is outside 1..={MAX_RANK}",
                shape.len()
            )));
        }
        if let Some(dim) = shape.iter().position(|&d| d == 0) {
            return Err(WriteError::Argument(format!(
                "dataset extent is zero in dimension {dim}"
            )));
        }
        if element_size == 0 {
            return Err(WriteError::Argument("element size is zero".into()));
        }
        Ok(Dataset {
            shape: shape.to_vec(),
            element_size,
            props,
            store: Arc::new(ChunkStore::new()),
        })
    }

    /// Logical extents.
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Element size in bytes.
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Creation properties.
    pub fn props(&self) -> &DatasetCreateProps {
        &self.props
    }

    /// The chunk store this dataset writes into.
    pub fn store(&self) -> Arc<ChunkStore> {
        Arc::clone(&self.store)
    }

    /// The chunk grid implied by the creation properties.
    ///
    /// # Errors
    ///
    /// Fails when the dataset has no chunked layout or the chunk shape
    /// is invalid for this extent.
    pub fn grid(&self) -> Result<ChunkGrid, WriteError> {
        let chunk_dims = self
            .props
            .chunk_dims
            .as_ref()
            .ok_or_else(|| WriteError::Argument("dataset has no chunked layout".into()))?;
        ChunkGrid::new(&self.shape, chunk_dims).map_err(|e| WriteError::Argument(e.to_string()))
    }

    /// The filter pipeline from the creation properties (possibly empty).
    pub fn pipeline(&self) -> FilterPipeline {
        self.props
            .build_pipeline(self.element_size as u32)
            .unwrap_or_default()
    }

    /// Write the full dataset through the parallel filtered path.
    ///
    /// See [`parallel_filtered_write`](crate::write::parallel_filtered_write).
    pub fn write_parallel(
        &self,
        selection: Selection,
        source: &[u8],
        nthreads: usize,
    ) -> Result<(), WriteError> {
        crate::write::parallel_filtered_write(self, selection, source, nthreads)
    }

    /// Write the full dataset through the single-threaded reference path.
    pub fn write_serial(&self, selection: Selection, source: &[u8]) -> Result<(), WriteError> {
        crate::write::write_filtered_serial(self, selection, source)
    }

    /// Read the whole dataset back from the store, reversing the
    /// pipeline and honouring per-chunk filter masks.
    pub fn read_all(&self) -> Result<Vec<u8>, WriteError> {
        let grid = self.grid()?;
        let pipeline = self.pipeline();
        let pipeline = if pipeline.is_empty() {
            None
        } else {
            Some(pipeline)
        };
        Ok(self
            .store
            .read_dataset(&grid, pipeline.as_ref(), self.element_size)?)
    }
}
