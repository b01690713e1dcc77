//! Per-call filter resolution.
//!
//! Before any worker starts, every pipeline entry is turned into an
//! executable stage: a registered class (builtin or application-supplied),
//! a plugin loaded from the search path, or a skip slot for an optional
//! filter that could not be resolved. The resolved pipeline is immutable
//! for the duration of the call and shared read-only across workers.

use parhdf5_format::filter_pipeline::{FilterPipeline, FilterSpec};

use crate::error::WriteError;
use crate::plugin::{self, LoadedFilter};
use crate::registry::{self, FilterClass};

/// How one pipeline position executes.
#[derive(Debug, Clone)]
pub enum FilterExec {
    /// A class from the process-wide registry.
    Registered(FilterClass),
    /// A filter loaded from a shared object for this call.
    Plugin(LoadedFilter),
    /// Unresolvable optional filter: contributes a set mask bit on every
    /// chunk and is never invoked.
    Skip,
}

/// One resolved pipeline stage.
#[derive(Debug, Clone)]
pub struct ResolvedFilter {
    /// The pipeline entry, after `set_local` adjustments.
    pub spec: FilterSpec,
    /// The executable behind it.
    pub exec: FilterExec,
}

impl ResolvedFilter {
    /// Whether this stage is a skip slot.
    pub fn is_skip(&self) -> bool {
        matches!(self.exec, FilterExec::Skip)
    }

    /// Invoke the filter callable over `buf[..nbytes]`.
    ///
    /// Returns the new byte count, zero on failure. Skip slots are never
    /// invoked by the workers; calling one reports failure.
    pub fn apply(&self, flags: u32, nbytes: usize, buf: &mut Vec<u8>) -> usize {
        match &self.exec {
            FilterExec::Registered(class) => {
                (class.filter)(flags, &self.spec.client_data, nbytes, buf)
            }
            FilterExec::Plugin(loaded) => loaded.apply(flags, &self.spec.client_data, nbytes, buf),
            FilterExec::Skip => 0,
        }
    }
}

/// A fully resolved filter pipeline, shared read-only across workers.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPipeline {
    /// The stages, in write order.
    pub stages: Vec<ResolvedFilter>,
}

impl ResolvedPipeline {
    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Resolve every pipeline entry to an executable stage.
///
/// Registered classes win over plugins. The `can_apply` and `set_local`
/// prelude hooks of registered classes run here, once per call. An
/// optional entry that cannot be resolved (or whose `can_apply` says no)
/// becomes a skip slot; a required one aborts resolution.
///
/// # Errors
///
/// Resolution errors happen before any worker starts and leave the
/// target store untouched.
pub fn resolve_pipeline(
    pipeline: &FilterPipeline,
    element_size: usize,
    chunk_dims: &[u64],
) -> Result<ResolvedPipeline, WriteError> {
    pipeline
        .validate()
        .map_err(|e| WriteError::Argument(e.to_string()))?;
    registry::ensure_builtins();

    let mut stages = Vec::with_capacity(pipeline.len());
    for entry in &pipeline.filters {
        let mut spec = entry.clone();

        if let Some(class) = registry::find(spec.filter_id) {
            if let Some(can_apply) = class.can_apply {
                if !can_apply(element_size, chunk_dims) {
                    if spec.is_optional() {
                        log::warn!(
                            "optional filter {} ({}) cannot apply, masking it out",
                            spec.filter_id,
                            class.name
                        );
                        stages.push(ResolvedFilter {
                            spec,
                            exec: FilterExec::Skip,
                        });
                        continue;
                    }
                    return Err(WriteError::Resolution {
                        filter_id: spec.filter_id,
                        reason: format!("filter {} cannot apply to this dataset", class.name),
                    });
                }
            }
            if let Some(set_local) = class.set_local {
                set_local(&mut spec, element_size, chunk_dims).map_err(|e| {
                    WriteError::Resolution {
                        filter_id: spec.filter_id,
                        reason: e.to_string(),
                    }
                })?;
            }
            stages.push(ResolvedFilter {
                spec,
                exec: FilterExec::Registered(class),
            });
            continue;
        }

        match plugin::load_filter(spec.filter_id) {
            Ok(loaded) => stages.push(ResolvedFilter {
                spec,
                exec: FilterExec::Plugin(loaded),
            }),
            Err(err) if spec.is_optional() => {
                log::warn!(
                    "optional filter {} unavailable ({err}), masking it out",
                    spec.filter_id
                );
                stages.push(ResolvedFilter {
                    spec,
                    exec: FilterExec::Skip,
                });
            }
            Err(err) => return Err(err),
        }
    }

    Ok(ResolvedPipeline { stages })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parhdf5_format::filter_pipeline::{
        FILTER_DEFLATE, FILTER_LZ4, FILTER_SHUFFLE, FLAG_OPTIONAL,
    };

    fn empty_plugin_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var(crate::plugin::PLUGIN_PATH_ENV, dir.path());
        dir
    }

    #[test]
    fn builtin_pipeline_resolves_to_registered_stages() {
        let mut pl = FilterPipeline::new();
        pl.append(FilterSpec::new(FILTER_SHUFFLE)).unwrap();
        pl.append(FilterSpec {
            client_data: vec![6],
            ..FilterSpec::new(FILTER_DEFLATE)
        })
        .unwrap();

        let resolved = resolve_pipeline(&pl, 4, &[2, 2]).unwrap();
        assert_eq!(resolved.len(), 2);
        assert!(matches!(resolved.stages[0].exec, FilterExec::Registered(_)));
        // set_local stamped the element size into the shuffle entry.
        assert_eq!(resolved.stages[0].spec.client_data, vec![4]);
        assert!(matches!(resolved.stages[1].exec, FilterExec::Registered(_)));
    }

    #[test]
    fn missing_optional_plugin_becomes_skip_slot() {
        let _dir = empty_plugin_dir();
        let mut pl = FilterPipeline::new();
        pl.append(FilterSpec {
            flags: FLAG_OPTIONAL,
            ..FilterSpec::new(FILTER_LZ4)
        })
        .unwrap();

        let resolved = resolve_pipeline(&pl, 4, &[4]).unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(resolved.stages[0].is_skip());
    }

    #[test]
    fn missing_required_plugin_aborts_resolution() {
        let _dir = empty_plugin_dir();
        let mut pl = FilterPipeline::new();
        pl.append(FilterSpec::new(FILTER_LZ4)).unwrap();

        let err = resolve_pipeline(&pl, 4, &[4]).unwrap_err();
        assert!(matches!(
            err,
            WriteError::Resolution {
                filter_id: FILTER_LZ4,
                ..
            }
        ));
    }

    #[test]
    fn empty_pipeline_resolves_empty() {
        let resolved = resolve_pipeline(&FilterPipeline::new(), 8, &[16]).unwrap();
        assert!(resolved.is_empty());
    }
}
