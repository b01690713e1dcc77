//! Filter pipeline descriptors.
//!
//! A pipeline is an ordered sequence of filters applied to every chunk on
//! the write path and reversed on the read path. Each pipeline position
//! owns one bit in the per-chunk filter-failure mask: bit `i` set means
//! filter `i` was skipped or failed on that chunk, and the read path must
//! skip it too.

use crate::error::FormatError;

/// Builtin deflate (zlib) compression.
pub const FILTER_DEFLATE: u16 = 1;
/// Builtin byte-shuffle transform.
pub const FILTER_SHUFFLE: u16 = 2;
/// Builtin fletcher32 checksum.
pub const FILTER_FLETCHER32: u16 = 3;
/// LZ4 compression, resolved through the plugin path.
pub const FILTER_LZ4: u16 = 32004;
/// Zstandard compression, resolved through the plugin path.
pub const FILTER_ZSTD: u16 = 32015;

/// Filter ids below this value are reserved for the library itself.
pub const FILTER_RESERVED: u16 = 256;

/// Definition flag: a missing or failing filter is tolerated by masking
/// it out of the chunk instead of failing the write.
pub const FLAG_OPTIONAL: u16 = 0x0001;

/// Invocation flag: the filter runs in the decode (read) direction.
pub const FLAG_REVERSE: u32 = 0x0100;

/// Maximum pipeline length; the failure mask is one `u32` bit per slot.
pub const MAX_PIPELINE_FILTERS: usize = 32;

/// One entry in a filter pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    /// Filter identification value.
    pub filter_id: u16,
    /// Display name, mainly for diagnostics on external filters.
    pub name: Option<String>,
    /// Definition flags ([`FLAG_OPTIONAL`]).
    pub flags: u16,
    /// Client data values handed to the filter on every invocation.
    pub client_data: Vec<u32>,
}

impl FilterSpec {
    /// A spec with no name, no flags, and no client data.
    pub fn new(filter_id: u16) -> FilterSpec {
        FilterSpec {
            filter_id,
            name: None,
            flags: 0,
            client_data: Vec::new(),
        }
    }

    /// Whether the OPTIONAL definition flag is set.
    pub fn is_optional(&self) -> bool {
        self.flags & FLAG_OPTIONAL != 0
    }
}

/// Ordered sequence of filters applied to each chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPipeline {
    /// The filters, in write order.
    pub filters: Vec<FilterSpec>,
}

impl FilterPipeline {
    /// An empty pipeline.
    pub fn new() -> FilterPipeline {
        FilterPipeline::default()
    }

    /// Number of filters in the pipeline.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether the pipeline has no filters.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Append a filter at the end of the pipeline.
    ///
    /// # Errors
    ///
    /// Fails when the pipeline is already at [`MAX_PIPELINE_FILTERS`].
    pub fn append(&mut self, spec: FilterSpec) -> Result<(), FormatError> {
        if self.filters.len() >= MAX_PIPELINE_FILTERS {
            return Err(FormatError::PipelineTooLong(self.filters.len() + 1));
        }
        self.filters.push(spec);
        Ok(())
    }

    /// Remove the first filter with the given id.
    ///
    /// # Errors
    ///
    /// Fails when no filter with that id is in the pipeline.
    pub fn delete(&mut self, filter_id: u16) -> Result<(), FormatError> {
        match self.filters.iter().position(|f| f.filter_id == filter_id) {
            Some(idx) => {
                self.filters.remove(idx);
                Ok(())
            }
            None => Err(FormatError::UnsupportedFilter(filter_id)),
        }
    }

    /// Find the first filter with the given id.
    pub fn find(&self, filter_id: u16) -> Option<&FilterSpec> {
        self.filters.iter().find(|f| f.filter_id == filter_id)
    }

    /// Whether a filter with the given id is in the pipeline.
    pub fn contains(&self, filter_id: u16) -> bool {
        self.find(filter_id).is_some()
    }

    /// Check the pipeline length bound.
    pub fn validate(&self) -> Result<(), FormatError> {
        if self.filters.len() > MAX_PIPELINE_FILTERS {
            return Err(FormatError::PipelineTooLong(self.filters.len()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_find() {
        let mut pl = FilterPipeline::new();
        pl.append(FilterSpec::new(FILTER_SHUFFLE)).unwrap();
        pl.append(FilterSpec {
            client_data: vec![6],
            ..FilterSpec::new(FILTER_DEFLATE)
        })
        .unwrap();

        assert_eq!(pl.len(), 2);
        assert!(pl.contains(FILTER_SHUFFLE));
        assert_eq!(
            pl.find(FILTER_DEFLATE).unwrap().client_data,
            vec![6]
        );
        assert!(pl.find(FILTER_LZ4).is_none());
    }

    #[test]
    fn delete_removes_first_occurrence() {
        let mut pl = FilterPipeline::new();
        pl.append(FilterSpec::new(FILTER_SHUFFLE)).unwrap();
        pl.append(FilterSpec::new(FILTER_DEFLATE)).unwrap();
        pl.delete(FILTER_SHUFFLE).unwrap();
        assert_eq!(pl.len(), 1);
        assert_eq!(pl.filters[0].filter_id, FILTER_DEFLATE);

        assert!(matches!(
            pl.delete(FILTER_SHUFFLE),
            Err(FormatError::UnsupportedFilter(FILTER_SHUFFLE))
        ));
    }

    #[test]
    fn append_enforces_limit() {
        let mut pl = FilterPipeline::new();
        for _ in 0..MAX_PIPELINE_FILTERS {
            pl.append(FilterSpec::new(FILTER_DEFLATE)).unwrap();
        }
        assert!(matches!(
            pl.append(FilterSpec::new(FILTER_DEFLATE)),
            Err(FormatError::PipelineTooLong(33))
        ));
        pl.validate().unwrap();
    }

    #[test]
    fn optional_flag() {
        let mut spec = FilterSpec::new(FILTER_LZ4);
        assert!(!spec.is_optional());
        spec.flags |= FLAG_OPTIONAL;
        assert!(spec.is_optional());
    }
}
