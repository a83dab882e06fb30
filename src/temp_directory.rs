//! The engine's process-wide temporary storage directory.
//!
//! SQLite keeps this in a single global variable which must be allocated with
//! the engine's allocator. The engine reads it under its static temporary
//! directory mutex while naming temporary files, so every write takes that
//! mutex as well as [`LOCK`], which serializes writers and remembers the last
//! value written.

use core::ffi::c_char;
use core::ptr;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::error::{EngineError, Error, Result};
use crate::ffi;

/// Tracks the value last written to the engine.
static LOCK: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Set the process-wide temporary directory.
///
/// Writing the value which is already configured does nothing. Otherwise the
/// previous engine allocation is freed and replaced, so the last writer wins.
pub fn set(path: &Path) -> Result<()> {
    let mut current = LOCK.lock().unwrap_or_else(PoisonError::into_inner);

    if current.as_deref() == Some(path) {
        return Ok(());
    }

    let c_path = ffi::path_to_cstring(path)?;
    let bytes = c_path.as_bytes_with_nul();

    // SAFETY: The new value is allocated through the engine allocator as it
    // requires, and the global is swapped and the previous value freed while
    // holding the same mutex the engine's readers hold.
    unsafe {
        let raw = ffi::sqlite3_malloc64(bytes.len() as u64).cast::<c_char>();

        if raw.is_null() {
            return Err(Error::Open(EngineError::from_code(crate::Code::NOMEM)));
        }

        ptr::copy_nonoverlapping(bytes.as_ptr().cast::<c_char>(), raw, bytes.len());

        let mutex = ffi::sqlite3_mutex_alloc(ffi::SQLITE_MUTEX_STATIC_VFS1);
        ffi::sqlite3_mutex_enter(mutex);

        let old = ffi::sqlite3_temp_directory;
        ffi::sqlite3_temp_directory = raw;

        if !old.is_null() {
            ffi::sqlite3_free(old.cast());
        }

        ffi::sqlite3_mutex_leave(mutex);
    }

    tracing::debug!(path = %path.display(), "configured temporary directory");
    *current = Some(path.to_path_buf());
    Ok(())
}

/// The temporary directory most recently configured through [`set`].
///
/// A `PRAGMA temp_store_directory` issued on any connection bypasses this
/// record.
pub fn current() -> Option<PathBuf> {
    LOCK.lock().unwrap_or_else(PoisonError::into_inner).clone()
}
