//! Thread-safe chunk storage.
//!
//! The store is the write engine's emission target: one
//! [`write_encoded_chunk`](ChunkStore::write_encoded_chunk) call per chunk,
//! carrying the encoded payload and the per-chunk filter-failure mask.
//! Workers race on it from many threads; a single internal mutex
//! serialises index updates, so calls on distinct origins are safe
//! concurrently and each origin may be written exactly once.
//!
//! Chunk payloads land in an append-only region in arrival order, but the
//! index is keyed by origin, so [`records`](ChunkStore::records) and
//! [`snapshot`](ChunkStore::snapshot) are deterministic regardless of how
//! the workers raced.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::chunk_grid::{self, ChunkGrid};
use crate::error::FormatError;
use crate::filter_pipeline::FilterPipeline;
use crate::filters::decode_chunk;

/// One stored chunk, as seen through the origin-ordered index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    /// Logical origin of the chunk.
    pub origin: Vec<u64>,
    /// Offset of the payload within the store's data region.
    pub address: u64,
    /// Encoded payload size in bytes.
    pub nbytes: u64,
    /// Filter-failure mask: bit `i` set means pipeline position `i` was
    /// skipped or failed for this chunk.
    pub filter_mask: u32,
}

#[derive(Debug, Default)]
struct StoreInner {
    data: Vec<u8>,
    index: BTreeMap<Vec<u64>, (u64, u64, u32)>,
}

/// In-memory chunk storage with an origin-keyed index.
#[derive(Debug, Default)]
pub struct ChunkStore {
    inner: Mutex<StoreInner>,
}

impl ChunkStore {
    /// Create an empty store.
    pub fn new() -> ChunkStore {
        ChunkStore::default()
    }

    /// Write one encoded chunk at the given logical origin.
    ///
    /// Safe to call concurrently on distinct origins.
    ///
    /// # Errors
    ///
    /// Fails when a chunk was already stored at `origin`.
    pub fn write_encoded_chunk(
        &self,
        origin: &[u64],
        payload: &[u8],
        filter_mask: u32,
    ) -> Result<(), FormatError> {
        let mut inner = self.inner.lock().expect("chunk store poisoned");
        if inner.index.contains_key(origin) {
            return Err(FormatError::DuplicateChunk {
                origin: origin.to_vec(),
            });
        }
        let address = inner.data.len() as u64;
        inner.data.extend_from_slice(payload);
        inner
            .index
            .insert(origin.to_vec(), (address, payload.len() as u64, filter_mask));
        Ok(())
    }

    /// Number of chunks stored.
    pub fn chunk_count(&self) -> usize {
        self.inner.lock().expect("chunk store poisoned").index.len()
    }

    /// Total encoded bytes stored.
    pub fn stored_bytes(&self) -> u64 {
        self.inner.lock().expect("chunk store poisoned").data.len() as u64
    }

    /// Snapshot of the index, sorted by origin.
    pub fn records(&self) -> Vec<ChunkRecord> {
        let inner = self.inner.lock().expect("chunk store poisoned");
        inner
            .index
            .iter()
            .map(|(origin, &(address, nbytes, filter_mask))| ChunkRecord {
                origin: origin.clone(),
                address,
                nbytes,
                filter_mask,
            })
            .collect()
    }

    /// The encoded payload and mask of the chunk at `origin`.
    ///
    /// # Errors
    ///
    /// Fails when no chunk is stored there.
    pub fn read_chunk(&self, origin: &[u64]) -> Result<(Vec<u8>, u32), FormatError> {
        let inner = self.inner.lock().expect("chunk store poisoned");
        let &(address, nbytes, mask) =
            inner
                .index
                .get(origin)
                .ok_or_else(|| FormatError::ChunkNotFound {
                    origin: origin.to_vec(),
                })?;
        let start = address as usize;
        let end = start + nbytes as usize;
        Ok((inner.data[start..end].to_vec(), mask))
    }

    /// Deterministic byte serialisation of the whole store, ordered by
    /// origin: per chunk, the origin coordinates, the payload size, the
    /// filter mask, then the payload. Two stores holding the same chunks
    /// produce identical snapshots no matter the write order.
    pub fn snapshot(&self) -> Vec<u8> {
        let inner = self.inner.lock().expect("chunk store poisoned");
        let mut out = Vec::with_capacity(inner.data.len());
        for (origin, &(address, nbytes, mask)) in &inner.index {
            for &o in origin {
                out.extend_from_slice(&o.to_le_bytes());
            }
            out.extend_from_slice(&nbytes.to_le_bytes());
            out.extend_from_slice(&mask.to_le_bytes());
            let start = address as usize;
            out.extend_from_slice(&inner.data[start..start + nbytes as usize]);
        }
        out
    }

    /// Reassemble the logical dataset from the stored chunks.
    ///
    /// Every chunk is decoded through the reverse pipeline (honouring its
    /// failure mask), then its in-extent hyper-rectangle is copied into
    /// place; edge-chunk fill bytes are discarded.
    ///
    /// # Errors
    ///
    /// Fails when a chunk of the grid is missing, decoding fails, or a
    /// decoded chunk does not have the full chunk size.
    pub fn read_dataset(
        &self,
        grid: &ChunkGrid,
        pipeline: Option<&FilterPipeline>,
        element_size: usize,
    ) -> Result<Vec<u8>, FormatError> {
        let rank = grid.rank();
        let raw_chunk_bytes = grid.chunk_elements() * element_size;
        let dataset_strides = chunk_grid::row_major_strides(grid.shape());
        let chunk_strides = chunk_grid::row_major_strides(grid.chunk_dims());
        let mut out = vec![0u8; grid.dataset_elements() * element_size];

        for origin in grid.origins() {
            let (payload, mask) = self.read_chunk(&origin)?;
            let decoded = match pipeline {
                Some(pl) => decode_chunk(&payload, pl, mask, element_size)?,
                None => payload,
            };
            if decoded.len() != raw_chunk_bytes {
                return Err(FormatError::DataSizeMismatch {
                    expected: raw_chunk_bytes,
                    actual: decoded.len(),
                });
            }

            let clipped = grid.clipped_extent(&origin);
            let run_bytes = clipped[rank - 1] as usize * element_size;
            chunk_grid::for_each_index(&clipped[..rank - 1], |idx| {
                let mut src_elems = 0usize;
                let mut dst_elems = 0usize;
                for d in 0..rank - 1 {
                    src_elems += idx[d] as usize * chunk_strides[d];
                    dst_elems += (origin[d] + idx[d]) as usize * dataset_strides[d];
                }
                dst_elems += origin[rank - 1] as usize * dataset_strides[rank - 1];
                let src = src_elems * element_size;
                let dst = dst_elems * element_size;
                out[dst..dst + run_bytes].copy_from_slice(&decoded[src..src + run_bytes]);
            });
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter_pipeline::{FilterSpec, FILTER_DEFLATE};
    use crate::filters::deflate_compress;

    #[test]
    fn write_and_read_chunk() {
        let store = ChunkStore::new();
        store.write_encoded_chunk(&[0, 0], &[1, 2, 3], 0).unwrap();
        store.write_encoded_chunk(&[0, 2], &[4, 5], 0b10).unwrap();

        assert_eq!(store.chunk_count(), 2);
        assert_eq!(store.stored_bytes(), 5);
        let (payload, mask) = store.read_chunk(&[0, 2]).unwrap();
        assert_eq!(payload, vec![4, 5]);
        assert_eq!(mask, 0b10);
    }

    #[test]
    fn duplicate_origin_rejected() {
        let store = ChunkStore::new();
        store.write_encoded_chunk(&[4], &[0], 0).unwrap();
        assert!(matches!(
            store.write_encoded_chunk(&[4], &[0], 0),
            Err(FormatError::DuplicateChunk { .. })
        ));
    }

    #[test]
    fn missing_chunk_reported() {
        let store = ChunkStore::new();
        assert!(matches!(
            store.read_chunk(&[8]),
            Err(FormatError::ChunkNotFound { .. })
        ));
    }

    #[test]
    fn snapshot_is_write_order_independent() {
        let a = ChunkStore::new();
        a.write_encoded_chunk(&[0], &[1, 1], 0).unwrap();
        a.write_encoded_chunk(&[2], &[2, 2], 0).unwrap();

        let b = ChunkStore::new();
        b.write_encoded_chunk(&[2], &[2, 2], 0).unwrap();
        b.write_encoded_chunk(&[0], &[1, 1], 0).unwrap();

        assert_eq!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn read_dataset_unfiltered_2d() {
        // 4x4 i32 dataset in 2x2 chunks, chunks stored raw.
        let grid = ChunkGrid::new(&[4, 4], &[2, 2]).unwrap();
        let store = ChunkStore::new();
        let source: Vec<i32> = (0..16).collect();
        let chunk_for = |r0: usize, c0: usize| -> Vec<u8> {
            let mut bytes = Vec::new();
            for r in r0..r0 + 2 {
                for c in c0..c0 + 2 {
                    bytes.extend_from_slice(&source[r * 4 + c].to_le_bytes());
                }
            }
            bytes
        };
        store.write_encoded_chunk(&[0, 0], &chunk_for(0, 0), 0).unwrap();
        store.write_encoded_chunk(&[0, 2], &chunk_for(0, 2), 0).unwrap();
        store.write_encoded_chunk(&[2, 0], &chunk_for(2, 0), 0).unwrap();
        store.write_encoded_chunk(&[2, 2], &chunk_for(2, 2), 0).unwrap();

        let out = store.read_dataset(&grid, None, 4).unwrap();
        let expected: Vec<u8> = source.iter().flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn read_dataset_discards_edge_fill() {
        // 1-D extent of 5 in chunks of 4: tail chunk carries 3 fill elements.
        let grid = ChunkGrid::new(&[5], &[4]).unwrap();
        let store = ChunkStore::new();
        store
            .write_encoded_chunk(&[0], &[1, 2, 3, 4], 0)
            .unwrap();
        store
            .write_encoded_chunk(&[4], &[5, 0, 0, 0], 0)
            .unwrap();
        let out = store.read_dataset(&grid, None, 1).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn read_dataset_decodes_deflate() {
        let grid = ChunkGrid::new(&[8], &[8]).unwrap();
        let mut pipeline = FilterPipeline::new();
        pipeline
            .append(FilterSpec {
                client_data: vec![6],
                ..FilterSpec::new(FILTER_DEFLATE)
            })
            .unwrap();

        let raw: Vec<u8> = (0..8).collect();
        let store = ChunkStore::new();
        store
            .write_encoded_chunk(&[0], &deflate_compress(&raw, 6).unwrap(), 0)
            .unwrap();
        let out = store.read_dataset(&grid, Some(&pipeline), 1).unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn read_dataset_reports_missing_chunk() {
        let grid = ChunkGrid::new(&[4], &[2]).unwrap();
        let store = ChunkStore::new();
        store.write_encoded_chunk(&[0], &[1, 2], 0).unwrap();
        assert!(matches!(
            store.read_dataset(&grid, None, 1),
            Err(FormatError::ChunkNotFound { .. })
        ));
    }
}
