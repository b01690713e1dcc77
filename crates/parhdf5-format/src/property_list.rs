//! Dataset creation properties.
//!
//! Property lists bundle the storage configuration for a new dataset:
//! chunk shape and the filter pipeline to run over each chunk. The
//! convenience setters cover the builtin filters; arbitrary entries
//! (external filters, OPTIONAL flags, custom client data) go through
//! [`DatasetCreateProps::filter`].

use crate::filter_pipeline::{
    FilterPipeline, FilterSpec, FILTER_DEFLATE, FILTER_FLETCHER32, FILTER_LZ4, FILTER_SHUFFLE,
    FILTER_ZSTD,
};

/// Dataset creation properties.
#[derive(Debug, Clone, Default)]
pub struct DatasetCreateProps {
    /// Chunk dimensions (enables chunked storage).
    pub chunk_dims: Option<Vec<u64>>,
    /// Deflate compression level (0-9), None = no deflate.
    pub deflate_level: Option<u32>,
    /// Apply the shuffle filter before compression.
    pub shuffle: bool,
    /// Append a fletcher32 checksum after compression.
    pub fletcher32: bool,
    /// LZ4 compression (plugin filter 32004).
    pub lz4: bool,
    /// Zstandard compression level (plugin filter 32015).
    pub zstd_level: Option<u32>,
    /// Extra pipeline entries appended verbatim after the builtin ones.
    pub extra_filters: Vec<FilterSpec>,
}

impl DatasetCreateProps {
    /// Create default dataset creation properties.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set chunk dimensions.
    pub fn chunk(mut self, dims: &[u64]) -> Self {
        self.chunk_dims = Some(dims.to_vec());
        self
    }

    /// Set deflate compression level (0-9).
    pub fn deflate(mut self, level: u32) -> Self {
        self.deflate_level = Some(level);
        self
    }

    /// Enable the shuffle filter.
    pub fn shuffle(mut self) -> Self {
        self.shuffle = true;
        self
    }

    /// Enable the fletcher32 checksum.
    pub fn fletcher32(mut self) -> Self {
        self.fletcher32 = true;
        self
    }

    /// Enable LZ4 compression.
    pub fn lz4(mut self) -> Self {
        self.lz4 = true;
        self
    }

    /// Set Zstandard compression level.
    pub fn zstd(mut self, level: u32) -> Self {
        self.zstd_level = Some(level);
        self
    }

    /// Append an arbitrary filter entry to the pipeline.
    pub fn filter(mut self, spec: FilterSpec) -> Self {
        self.extra_filters.push(spec);
        self
    }

    /// Whether any chunked-storage option is set.
    pub fn is_chunked(&self) -> bool {
        self.chunk_dims.is_some()
    }

    /// Chunk dimensions, defaulting to a single chunk spanning `shape`.
    pub fn resolve_chunk_dims(&self, shape: &[u64]) -> Vec<u64> {
        match &self.chunk_dims {
            Some(dims) => dims.clone(),
            None => shape.to_vec(),
        }
    }

    /// Build the filter pipeline for this dataset.
    ///
    /// Order: shuffle, then one compressor (priority zstd > lz4 > deflate),
    /// then fletcher32, then any extra entries. Returns `None` when the
    /// pipeline would be empty.
    pub fn build_pipeline(&self, element_size: u32) -> Option<FilterPipeline> {
        let mut filters = Vec::new();

        if self.shuffle {
            filters.push(FilterSpec {
                client_data: vec![element_size],
                ..FilterSpec::new(FILTER_SHUFFLE)
            });
        }

        if let Some(level) = self.zstd_level {
            filters.push(FilterSpec {
                name: Some("zstd".into()),
                client_data: vec![level],
                ..FilterSpec::new(FILTER_ZSTD)
            });
        } else if self.lz4 {
            filters.push(FilterSpec {
                name: Some("lz4".into()),
                ..FilterSpec::new(FILTER_LZ4)
            });
        } else if let Some(level) = self.deflate_level {
            filters.push(FilterSpec {
                client_data: vec![level],
                ..FilterSpec::new(FILTER_DEFLATE)
            });
        }

        if self.fletcher32 {
            filters.push(FilterSpec::new(FILTER_FLETCHER32));
        }

        filters.extend(self.extra_filters.iter().cloned());

        if filters.is_empty() {
            None
        } else {
            Some(FilterPipeline { filters })
        }
    }
}
