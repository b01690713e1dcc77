//! Dynamically loaded filter plugins.
//!
//! A filter plugin is a shared object exporting one symbol per filter id;
//! the symbol is a static [`PluginFilterClass`] descriptor whose key field
//! is the filter function. The library file name and symbol name for each
//! known external filter id are fixed; the directory they are loaded from
//! comes from `HDF5_PLUGIN_PATH`, falling back to the compiled-in default.
//!
//! Buffers crossing the plugin boundary are C-allocated. A filter that
//! must grow its buffer frees the one it was handed, returns a fresh
//! allocation through the in-out pointer, and updates the buffer size;
//! the bridge re-reads both after every call and owns whatever buffer
//! comes back.

use std::env;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::{Library, Symbol};
use parhdf5_format::filter_pipeline::{FILTER_LZ4, FILTER_ZSTD};

use crate::error::WriteError;

/// Directory searched for filter shared objects when the environment
/// variable is unset.
pub const DEFAULT_PLUGIN_PATH: &str = "/usr/local/hdf5/lib/plugin";

/// Environment variable overriding the plugin search directory.
pub const PLUGIN_PATH_ENV: &str = "HDF5_PLUGIN_PATH";

/// ABI version a plugin descriptor must carry.
pub const PLUGIN_ABI_VERSION: u32 = 1;

/// The C filter entry point exported by a plugin.
///
/// `*buf` points at a C allocation holding `nbytes` input bytes with
/// `*buf_size` bytes allocated. Returns the output byte count, or zero on
/// failure. On success the function may have replaced `*buf` with a
/// larger allocation (freeing the old one) and updated `*buf_size`.
pub type PluginFilterFn = unsafe extern "C" fn(
    flags: u32,
    cd_nelmts: usize,
    cd_values: *const u32,
    nbytes: usize,
    buf_size: *mut usize,
    buf: *mut *mut c_void,
) -> usize;

/// The descriptor a plugin exports per filter id.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PluginFilterClass {
    /// Must equal [`PLUGIN_ABI_VERSION`].
    pub version: u32,
    /// The filter id this descriptor implements.
    pub id: u32,
    /// The filter entry point.
    pub filter: PluginFilterFn,
}

/// Library file and exported symbol for the known external filter ids.
pub fn filter_lib_entry(filter_id: u16) -> Option<(&'static str, &'static str)> {
    match filter_id {
        FILTER_LZ4 => Some(("libh5lz4.so.0", "H5Z_LZ4")),
        FILTER_ZSTD => Some(("libh5zstd.so.0", "H5Z_ZSTD")),
        _ => None,
    }
}

/// The plugin search directory for this call.
pub fn plugin_search_path() -> PathBuf {
    match env::var(PLUGIN_PATH_ENV) {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => PathBuf::from(DEFAULT_PLUGIN_PATH),
    }
}

/// A filter callable backed by a loaded shared object.
///
/// The library handle stays open as long as any clone of this value is
/// alive, so the descriptor's function pointer remains valid for the
/// whole write call.
#[derive(Debug, Clone)]
pub struct LoadedFilter {
    class: PluginFilterClass,
    _lib: Arc<Library>,
}

impl LoadedFilter {
    /// Run the plugin filter over `buf[..nbytes]`.
    ///
    /// Follows the callable contract: returns the output byte count, zero
    /// on failure. On success the buffer contents are replaced with the
    /// output.
    pub fn apply(&self, flags: u32, client_data: &[u32], nbytes: usize, buf: &mut Vec<u8>) -> usize {
        unsafe {
            let raw = libc::malloc(nbytes);
            if raw.is_null() {
                return 0;
            }
            std::ptr::copy_nonoverlapping(buf.as_ptr(), raw as *mut u8, nbytes);

            let mut buf_size = nbytes;
            let mut moving = raw;
            let ret = (self.class.filter)(
                flags,
                client_data.len(),
                client_data.as_ptr(),
                nbytes,
                &mut buf_size,
                &mut moving,
            );
            // The filter may have swapped the allocation; `moving` is
            // whatever buffer it left behind, and it is ours to free.
            if ret != 0 {
                let out = std::slice::from_raw_parts(moving as *const u8, ret);
                buf.clear();
                buf.extend_from_slice(out);
            }
            libc::free(moving);
            ret
        }
    }
}

/// Load the plugin filter for `filter_id` from `dir`.
pub fn load_filter_from(dir: &Path, filter_id: u16) -> Result<LoadedFilter, WriteError> {
    let (lib_name, symbol_name) =
        filter_lib_entry(filter_id).ok_or_else(|| WriteError::Resolution {
            filter_id,
            reason: "no plugin library is known for this filter id".into(),
        })?;
    let path = dir.join(lib_name);

    let lib = unsafe { Library::new(&path) }.map_err(|e| WriteError::Resolution {
        filter_id,
        reason: format!("cannot open plugin {}: {e}", path.display()),
    })?;

    let class = unsafe {
        let sym: Symbol<*const PluginFilterClass> =
            lib.get(symbol_name.as_bytes()).map_err(|e| WriteError::Resolution {
                filter_id,
                reason: format!("symbol {symbol_name} not found in {}: {e}", path.display()),
            })?;
        std::ptr::read(*sym)
    };

    if class.version != PLUGIN_ABI_VERSION {
        return Err(WriteError::Resolution {
            filter_id,
            reason: format!("plugin ABI version {} is not supported", class.version),
        });
    }
    if class.id != u32::from(filter_id) {
        return Err(WriteError::Resolution {
            filter_id,
            reason: format!("plugin descriptor implements filter {}, not {filter_id}", class.id),
        });
    }

    log::debug!("loaded filter {filter_id} from {}", path.display());
    Ok(LoadedFilter {
        class,
        _lib: Arc::new(lib),
    })
}

/// Load the plugin filter for `filter_id` from the search path.
pub fn load_filter(filter_id: u16) -> Result<LoadedFilter, WriteError> {
    load_filter_from(&plugin_search_path(), filter_id)
}
