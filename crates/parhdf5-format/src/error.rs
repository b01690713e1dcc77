//! Error types for the chunk layout and storage layer.

use core::fmt;

/// Errors that can occur in the chunk grid, filter, and storage code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Dataset rank outside the supported range.
    InvalidRank(usize),
    /// A dataset extent is zero.
    ZeroExtent {
        /// Index of the offending dimension.
        dim: usize,
    },
    /// A chunk dimension is zero.
    ZeroChunkDim {
        /// Index of the offending dimension.
        dim: usize,
    },
    /// Chunk shape rank does not match the dataset rank.
    RankMismatch {
        /// Dataset rank.
        dataset: usize,
        /// Chunk shape rank.
        chunk: usize,
    },
    /// Source buffer size does not match the dataset extent.
    DataSizeMismatch {
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },
    /// Too many filters in a pipeline.
    PipelineTooLong(usize),
    /// A filter id appears in a pipeline but no codec is known for it.
    UnsupportedFilter(u16),
    /// A filter rejected its input.
    FilterError(&'static str),
    /// Deflate compression failed.
    CompressionError(String),
    /// Deflate decompression failed.
    DecompressionError(String),
    /// Fletcher32 checksum did not match on decode.
    Fletcher32Mismatch {
        /// The checksum stored with the chunk.
        expected: u32,
        /// The checksum we computed.
        computed: u32,
    },
    /// A chunk was written twice at the same logical origin.
    DuplicateChunk {
        /// The offending chunk origin.
        origin: Vec<u64>,
    },
    /// No chunk was stored at the requested origin.
    ChunkNotFound {
        /// The requested chunk origin.
        origin: Vec<u64>,
    },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::InvalidRank(r) => {
                write!(f, "invalid dataset rank: {r} (must be 1..=32)")
            }
            FormatError::ZeroExtent { dim } => {
                write!(f, "dataset extent is zero in dimension {dim}")
            }
            FormatError::ZeroChunkDim { dim } => {
                write!(f, "chunk dimension {dim} is zero")
            }
            FormatError::RankMismatch { dataset, chunk } => {
                write!(f, "chunk rank {chunk} does not match dataset rank {dataset}")
            }
            FormatError::DataSizeMismatch { expected, actual } => {
                write!(
                    f,
                    "data size mismatch: expected {expected} bytes, got {actual} bytes"
                )
            }
            FormatError::PipelineTooLong(n) => {
                write!(f, "filter pipeline has {n} filters (maximum is 32)")
            }
            FormatError::UnsupportedFilter(id) => {
                write!(f, "no codec available for filter id {id}")
            }
            FormatError::FilterError(msg) => {
                write!(f, "filter error: {msg}")
            }
            FormatError::CompressionError(msg) => {
                write!(f, "compression failed: {msg}")
            }
            FormatError::DecompressionError(msg) => {
                write!(f, "decompression failed: {msg}")
            }
            FormatError::Fletcher32Mismatch { expected, computed } => {
                write!(
                    f,
                    "fletcher32 mismatch: stored {expected:#010x}, computed {computed:#010x}"
                )
            }
            FormatError::DuplicateChunk { origin } => {
                write!(f, "chunk at origin {origin:?} written more than once")
            }
            FormatError::ChunkNotFound { origin } => {
                write!(f, "no chunk stored at origin {origin:?}")
            }
        }
    }
}

impl std::error::Error for FormatError {}
