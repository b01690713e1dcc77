//! Process-wide filter registry.
//!
//! Filters are flat capability bundles: an optional `can_apply` check, an
//! optional `set_local` parameter hook, and the filter callable itself.
//! The registry is a single lock-protected table shared by every write
//! call in the process; entries stay valid for the process lifetime.
//! Builtins (deflate, shuffle, fletcher32) are inserted on first use, and
//! applications may register their own classes — including statically
//! linked replacements for filters that would otherwise be loaded from a
//! shared object.

use std::sync::Mutex;

use parhdf5_format::error::FormatError;
use parhdf5_format::filter_pipeline::{
    FilterSpec, FILTER_DEFLATE, FILTER_FLETCHER32, FILTER_RESERVED, FILTER_SHUFFLE, FLAG_REVERSE,
};
use parhdf5_format::filters;

use crate::error::WriteError;

/// The filter callable.
///
/// `buf[..nbytes]` is the input; on success the filter replaces the
/// buffer contents with its output and returns the new byte count. A
/// return of zero indicates failure, in which case the buffer is left
/// with its input content. [`FLAG_REVERSE`] in `flags` selects the
/// decode direction.
pub type FilterCallable =
    fn(flags: u32, client_data: &[u32], nbytes: usize, buf: &mut Vec<u8>) -> usize;

/// Pre-write check: can this filter apply to the dataset at all?
pub type CanApplyFn = fn(element_size: usize, chunk_dims: &[u64]) -> bool;

/// Pre-write hook: adjust the pipeline entry's client data for this
/// dataset (e.g. shuffle records the element size).
pub type SetLocalFn =
    fn(spec: &mut FilterSpec, element_size: usize, chunk_dims: &[u64]) -> Result<(), FormatError>;

/// A registered filter implementation.
#[derive(Debug, Clone, Copy)]
pub struct FilterClass {
    /// Filter identification value this class implements.
    pub id: u16,
    /// Human-readable name for diagnostics.
    pub name: &'static str,
    /// Optional applicability check, run once before workers start.
    pub can_apply: Option<CanApplyFn>,
    /// Optional per-dataset parameter hook, run once before workers start.
    pub set_local: Option<SetLocalFn>,
    /// The filter callable.
    pub filter: FilterCallable,
}

static REGISTRY: Mutex<Vec<FilterClass>> = Mutex::new(Vec::new());

fn deflate_filter(flags: u32, client_data: &[u32], nbytes: usize, buf: &mut Vec<u8>) -> usize {
    let result = if flags & FLAG_REVERSE != 0 {
        filters::deflate_decompress(&buf[..nbytes])
    } else {
        let level = client_data.first().copied().unwrap_or(6);
        filters::deflate_compress(&buf[..nbytes], level)
    };
    match result {
        Ok(out) => {
            let n = out.len();
            *buf = out;
            n
        }
        Err(_) => 0,
    }
}

fn shuffle_filter(flags: u32, client_data: &[u32], nbytes: usize, buf: &mut Vec<u8>) -> usize {
    let element_size = client_data.first().copied().unwrap_or(1) as usize;
    let result = if flags & FLAG_REVERSE != 0 {
        filters::unshuffle(&buf[..nbytes], element_size)
    } else {
        filters::shuffle(&buf[..nbytes], element_size)
    };
    match result {
        Ok(out) => {
            let n = out.len();
            *buf = out;
            n
        }
        Err(_) => 0,
    }
}

fn shuffle_set_local(
    spec: &mut FilterSpec,
    element_size: usize,
    _chunk_dims: &[u64],
) -> Result<(), FormatError> {
    spec.client_data = vec![element_size as u32];
    Ok(())
}

fn fletcher32_filter(flags: u32, _client_data: &[u32], nbytes: usize, buf: &mut Vec<u8>) -> usize {
    if flags & FLAG_REVERSE != 0 {
        match filters::fletcher32_verify(&buf[..nbytes]) {
            Ok(out) => {
                let n = out.len();
                *buf = out;
                n
            }
            Err(_) => 0,
        }
    } else {
        let out = filters::fletcher32_append(&buf[..nbytes]);
        let n = out.len();
        *buf = out;
        n
    }
}

const BUILTINS: [FilterClass; 3] = [
    FilterClass {
        id: FILTER_DEFLATE,
        name: "deflate",
        can_apply: None,
        set_local: None,
        filter: deflate_filter,
    },
    FilterClass {
        id: FILTER_SHUFFLE,
        name: "shuffle",
        can_apply: None,
        set_local: Some(shuffle_set_local),
        filter: shuffle_filter,
    },
    FilterClass {
        id: FILTER_FLETCHER32,
        name: "fletcher32",
        can_apply: None,
        set_local: None,
        filter: fletcher32_filter,
    },
];

/// Make sure the builtin filter classes are registered.
pub fn ensure_builtins() {
    let mut table = REGISTRY.lock().expect("filter registry poisoned");
    for builtin in BUILTINS {
        if !table.iter().any(|c| c.id == builtin.id) {
            table.push(builtin);
        }
    }
}

/// Register a filter class, replacing any existing class with the same id.
pub fn register(class: FilterClass) {
    let mut table = REGISTRY.lock().expect("filter registry poisoned");
    match table.iter_mut().find(|c| c.id == class.id) {
        Some(slot) => *slot = class,
        None => table.push(class),
    }
}

/// Remove a previously registered filter class.
///
/// # Errors
///
/// Predefined ids (below [`FILTER_RESERVED`]) cannot be unregistered;
/// unknown ids are an error as well.
pub fn unregister(id: u16) -> Result<(), WriteError> {
    if id < FILTER_RESERVED {
        return Err(WriteError::Argument(format!(
            "cannot unregister predefined filter {id}"
        )));
    }
    let mut table = REGISTRY.lock().expect("filter registry poisoned");
    match table.iter().position(|c| c.id == id) {
        Some(idx) => {
            table.remove(idx);
            Ok(())
        }
        None => Err(WriteError::Argument(format!("filter {id} is not registered"))),
    }
}

/// Look up a filter class by id.
pub fn find(id: u16) -> Option<FilterClass> {
    let table = REGISTRY.lock().expect("filter registry poisoned");
    table.iter().find(|c| c.id == id).copied()
}

/// Whether a class for `id` is currently registered.
pub fn is_available(id: u16) -> bool {
    find(id).is_some()
}
