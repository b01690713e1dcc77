//! The chunk extractor: the producer side of the write engine.
//!
//! Walks the chunk grid in lexicographic order, materialises each chunk
//! into a freshly owned buffer, and hands the buffers to the queue. Runs
//! on the calling thread.

use parhdf5_format::chunk_grid::{self, ChunkGrid};

use crate::queue::WorkQueue;

/// One chunk in flight between the extractor and a worker.
///
/// Owned by exactly one thread at a time: the producer until push, the
/// consumer after pop. `buf[..nbytes]` is the payload; the origin never
/// changes while the buffer is rewritten by the filter pipeline.
#[derive(Debug)]
pub struct WorkItem {
    /// Logical origin of the chunk.
    pub origin: Vec<u64>,
    /// The chunk payload, raw on enqueue, encoded after the pipeline.
    pub buf: Vec<u8>,
    /// Valid bytes in `buf`.
    pub nbytes: usize,
}

/// Materialise the chunk at `origin` from the row-major `source` array.
///
/// The buffer is always the full chunk size. The in-extent
/// hyper-rectangle is copied as contiguous runs along the last axis;
/// positions past the dataset extent stay zero-filled, keeping edge
/// chunks deterministic.
pub fn materialize_chunk(
    source: &[u8],
    grid: &ChunkGrid,
    element_size: usize,
    origin: &[u64],
) -> WorkItem {
    let rank = grid.rank();
    let raw_chunk_bytes = grid.chunk_elements() * element_size;
    let mut buf = vec![0u8; raw_chunk_bytes];

    let dataset_strides = chunk_grid::row_major_strides(grid.shape());
    let chunk_strides = chunk_grid::row_major_strides(grid.chunk_dims());
    let clipped = grid.clipped_extent(origin);
    let run_bytes = clipped[rank - 1] as usize * element_size;

    chunk_grid::for_each_index(&clipped[..rank - 1], |idx| {
        let mut src_elems = origin[rank - 1] as usize * dataset_strides[rank - 1];
        let mut dst_elems = 0usize;
        for d in 0..rank - 1 {
            src_elems += (origin[d] + idx[d]) as usize * dataset_strides[d];
            dst_elems += idx[d] as usize * chunk_strides[d];
        }
        let src = src_elems * element_size;
        let dst = dst_elems * element_size;
        buf[dst..dst + run_bytes].copy_from_slice(&source[src..src + run_bytes]);
    });

    WorkItem {
        origin: origin.to_vec(),
        buf,
        nbytes: raw_chunk_bytes,
    }
}

/// Materialise and enqueue every chunk of the grid, then close the queue
/// so each worker receives its end-of-work signal.
pub fn extract_chunks(
    source: &[u8],
    grid: &ChunkGrid,
    element_size: usize,
    queue: &WorkQueue<WorkItem>,
) {
    for origin in grid.origins() {
        queue.push(materialize_chunk(source, grid, element_size, &origin));
    }
    queue.close();
    log::debug!("extractor enqueued {} chunks", queue.elements_added());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i32_bytes(values: &[i32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn interior_chunk_2d() {
        // 4x4 dataset of i32, 2x2 chunks; chunk at (0,2) holds [2,3,6,7].
        let grid = ChunkGrid::new(&[4, 4], &[2, 2]).unwrap();
        let source = i32_bytes(&(0..16).collect::<Vec<_>>());
        let item = materialize_chunk(&source, &grid, 4, &[0, 2]);
        assert_eq!(item.nbytes, 16);
        assert_eq!(item.buf, i32_bytes(&[2, 3, 6, 7]));
    }

    #[test]
    fn edge_chunk_is_zero_filled() {
        // 5x3 dataset, 2x2 chunks; chunk at (4,2) holds element 14 and fill.
        let grid = ChunkGrid::new(&[5, 3], &[2, 2]).unwrap();
        let source = i32_bytes(&(0..15).collect::<Vec<_>>());
        let item = materialize_chunk(&source, &grid, 4, &[4, 2]);
        assert_eq!(item.buf, i32_bytes(&[14, 0, 0, 0]));
    }

    #[test]
    fn one_dimensional_tail_chunk() {
        let grid = ChunkGrid::new(&[10], &[4]).unwrap();
        let source = i32_bytes(&(0..10).collect::<Vec<_>>());
        let item = materialize_chunk(&source, &grid, 4, &[8]);
        assert_eq!(item.buf, i32_bytes(&[8, 9, 0, 0]));
    }

    #[test]
    fn extract_enqueues_all_chunks_in_order() {
        let grid = ChunkGrid::new(&[4, 4], &[2, 2]).unwrap();
        let source = i32_bytes(&(0..16).collect::<Vec<_>>());
        let queue = WorkQueue::new();
        extract_chunks(&source, &grid, 4, &queue);

        assert_eq!(queue.elements_added(), 4);
        let mut origins = Vec::new();
        while let Some(item) = queue.pop() {
            origins.push(item.origin);
        }
        assert_eq!(
            origins,
            vec![vec![0, 0], vec![0, 2], vec![2, 0], vec![2, 2]]
        );
    }

    #[test]
    fn three_dimensional_chunk() {
        // 2x2x4 dataset, 2x2x2 chunks; second chunk holds the back half.
        let grid = ChunkGrid::new(&[2, 2, 4], &[2, 2, 2]).unwrap();
        let source: Vec<u8> = (0..16).collect();
        let item = materialize_chunk(&source, &grid, 1, &[0, 0, 2]);
        assert_eq!(item.buf, vec![2, 3, 6, 7, 10, 11, 14, 15]);
    }
}
