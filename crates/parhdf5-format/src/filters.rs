//! Builtin filter codecs: deflate, shuffle, fletcher32.
//!
//! These are the filters the library carries itself; everything else is
//! resolved through the plugin path. Each codec has an encode and a
//! decode direction. [`decode_chunk`] runs a whole pipeline in reverse,
//! honouring a per-chunk failure mask.

use std::io::{Read, Write};

use crate::error::FormatError;
use crate::filter_pipeline::{
    FilterPipeline, FILTER_DEFLATE, FILTER_FLETCHER32, FILTER_SHUFFLE,
};

/// Compress with zlib at the given level (0-9).
pub fn deflate_compress(data: &[u8], level: u32) -> Result<Vec<u8>, FormatError> {
    let mut encoder =
        flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::new(level.min(9)));
    encoder
        .write_all(data)
        .map_err(|e| FormatError::CompressionError(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| FormatError::CompressionError(e.to_string()))
}

/// Decompress zlib-compressed data.
pub fn deflate_decompress(data: &[u8]) -> Result<Vec<u8>, FormatError> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut result = Vec::new();
    decoder
        .read_to_end(&mut result)
        .map_err(|e| FormatError::DecompressionError(e.to_string()))?;
    Ok(result)
}

/// Shuffle (encode direction): group bytes by position within each element,
/// so all byte-0s come first, then all byte-1s, and so on.
pub fn shuffle(data: &[u8], element_size: usize) -> Result<Vec<u8>, FormatError> {
    if element_size <= 1 {
        return Ok(data.to_vec());
    }
    if data.len() % element_size != 0 {
        return Err(FormatError::FilterError(
            "shuffle: data length not a multiple of element size",
        ));
    }
    let num_elements = data.len() / element_size;
    let mut result = vec![0u8; data.len()];
    for i in 0..num_elements {
        for j in 0..element_size {
            result[j * num_elements + i] = data[i * element_size + j];
        }
    }
    Ok(result)
}

/// Unshuffle (decode direction): reconstruct interleaved element bytes.
pub fn unshuffle(data: &[u8], element_size: usize) -> Result<Vec<u8>, FormatError> {
    if element_size <= 1 {
        return Ok(data.to_vec());
    }
    if data.len() % element_size != 0 {
        return Err(FormatError::FilterError(
            "shuffle: data length not a multiple of element size",
        ));
    }
    let num_elements = data.len() / element_size;
    let mut result = vec![0u8; data.len()];
    for i in 0..num_elements {
        for j in 0..element_size {
            result[i * element_size + j] = data[j * num_elements + i];
        }
    }
    Ok(result)
}

/// Modified Fletcher32 over 16-bit big-endian words, as the storage format
/// defines it. Sums are folded modulo 65535 in blocks to keep the inner
/// loop free of division.
fn fletcher32_compute(data: &[u8]) -> u32 {
    const BLOCK_WORDS: usize = 360;
    const BLOCK_BYTES: usize = BLOCK_WORDS * 2;

    let mut sum1: u32 = 0;
    let mut sum2: u32 = 0;
    let len = data.len();
    let mut offset = 0;

    while offset + BLOCK_BYTES <= len {
        let end = offset + BLOCK_BYTES;
        let mut i = offset;
        while i < end {
            let val = ((data[i] as u32) << 8) | (data[i + 1] as u32);
            sum1 += val;
            sum2 += sum1;
            i += 2;
        }
        sum1 %= 65535;
        sum2 %= 65535;
        offset = end;
    }

    while offset < len {
        let val = if offset + 1 < len {
            ((data[offset] as u32) << 8) | (data[offset + 1] as u32)
        } else {
            (data[offset] as u32) << 8
        };
        sum1 = (sum1 + val) % 65535;
        sum2 = (sum2 + sum1) % 65535;
        offset += 2;
    }

    (sum2 << 16) | sum1
}

/// Append a fletcher32 checksum (encode direction).
pub fn fletcher32_append(data: &[u8]) -> Vec<u8> {
    let checksum = fletcher32_compute(data);
    let mut result = Vec::with_capacity(data.len() + 4);
    result.extend_from_slice(data);
    result.extend_from_slice(&checksum.to_le_bytes());
    result
}

/// Verify and strip a trailing fletcher32 checksum (decode direction).
pub fn fletcher32_verify(data: &[u8]) -> Result<Vec<u8>, FormatError> {
    if data.len() < 4 {
        return Err(FormatError::FilterError(
            "fletcher32: data too short for checksum",
        ));
    }
    let (payload, trailer) = data.split_at(data.len() - 4);
    let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let computed = fletcher32_compute(payload);
    if stored != computed {
        return Err(FormatError::Fletcher32Mismatch {
            expected: stored,
            computed,
        });
    }
    Ok(payload.to_vec())
}

/// Decode one encoded chunk by running `pipeline` in reverse.
///
/// Pipeline positions whose bit is set in `filter_mask` were skipped or
/// failed on the write path and are skipped here as well. Only builtin
/// codecs are decoded; an unmasked external filter id is an error.
pub fn decode_chunk(
    encoded: &[u8],
    pipeline: &FilterPipeline,
    filter_mask: u32,
    element_size: usize,
) -> Result<Vec<u8>, FormatError> {
    let mut data = encoded.to_vec();
    for (idx, filter) in pipeline.filters.iter().enumerate().rev() {
        if filter_mask & (1u32 << idx) != 0 {
            continue;
        }
        data = match filter.filter_id {
            FILTER_DEFLATE => deflate_decompress(&data)?,
            FILTER_SHUFFLE => unshuffle(&data, element_size)?,
            FILTER_FLETCHER32 => fletcher32_verify(&data)?,
            other => return Err(FormatError::UnsupportedFilter(other)),
        };
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter_pipeline::FilterSpec;

    #[test]
    fn deflate_roundtrip() {
        let data: Vec<u8> = (0..1000).map(|i| (i % 251) as u8).collect();
        let compressed = deflate_compress(&data, 6).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(deflate_decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn deflate_decompress_rejects_garbage() {
        assert!(matches!(
            deflate_decompress(&[0xde, 0xad, 0xbe, 0xef]),
            Err(FormatError::DecompressionError(_))
        ));
    }

    #[test]
    fn shuffle_known_pattern() {
        // Two 4-byte elements: [A0 A1 A2 A3 B0 B1 B2 B3]
        let data = vec![0xA0, 0xA1, 0xA2, 0xA3, 0xB0, 0xB1, 0xB2, 0xB3];
        let shuffled = shuffle(&data, 4).unwrap();
        assert_eq!(shuffled, vec![0xA0, 0xB0, 0xA1, 0xB1, 0xA2, 0xB2, 0xA3, 0xB3]);
        assert_eq!(unshuffle(&shuffled, 4).unwrap(), data);
    }

    #[test]
    fn shuffle_rejects_ragged_input() {
        assert!(shuffle(&[1, 2, 3], 2).is_err());
        assert!(unshuffle(&[1, 2, 3], 2).is_err());
    }

    #[test]
    fn shuffle_single_byte_elements_pass_through() {
        let data = vec![1u8, 2, 3];
        assert_eq!(shuffle(&data, 1).unwrap(), data);
    }

    #[test]
    fn fletcher32_roundtrip() {
        let data = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        let with_checksum = fletcher32_append(&data);
        assert_eq!(with_checksum.len(), data.len() + 4);
        assert_eq!(fletcher32_verify(&with_checksum).unwrap(), data);
    }

    #[test]
    fn fletcher32_detects_corruption() {
        let mut with_checksum = fletcher32_append(&[9u8, 8, 7, 6]);
        with_checksum[1] ^= 0xFF;
        assert!(matches!(
            fletcher32_verify(&with_checksum),
            Err(FormatError::Fletcher32Mismatch { .. })
        ));
    }

    #[test]
    fn fletcher32_odd_length_payload() {
        let data = vec![0xABu8; 7];
        let verified = fletcher32_verify(&fletcher32_append(&data)).unwrap();
        assert_eq!(verified, data);
    }

    #[test]
    fn decode_chunk_reverses_full_pipeline() {
        let mut pipeline = FilterPipeline::new();
        pipeline
            .append(FilterSpec {
                client_data: vec![4],
                ..FilterSpec::new(FILTER_SHUFFLE)
            })
            .unwrap();
        pipeline
            .append(FilterSpec {
                client_data: vec![6],
                ..FilterSpec::new(FILTER_DEFLATE)
            })
            .unwrap();
        pipeline.append(FilterSpec::new(FILTER_FLETCHER32)).unwrap();

        let raw: Vec<u8> = (0..160).map(|i| (i % 256) as u8).collect();
        let encoded = fletcher32_append(
            &deflate_compress(&shuffle(&raw, 4).unwrap(), 6).unwrap(),
        );
        let decoded = decode_chunk(&encoded, &pipeline, 0, 4).unwrap();
        assert_eq!(decoded, raw);
    }

    #[test]
    fn decode_chunk_honours_mask() {
        // Position 0 (an external compressor) masked out: payload is raw.
        let mut pipeline = FilterPipeline::new();
        pipeline
            .append(FilterSpec::new(crate::filter_pipeline::FILTER_LZ4))
            .unwrap();

        let raw = vec![5u8; 64];
        let decoded = decode_chunk(&raw, &pipeline, 0b1, 4).unwrap();
        assert_eq!(decoded, raw);

        // Unmasked external filter cannot be decoded here.
        assert!(matches!(
            decode_chunk(&raw, &pipeline, 0, 4),
            Err(FormatError::UnsupportedFilter(_))
        ));
    }
}
