use core::ffi::{CStr, c_char, c_int};

use std::ffi::CString;
use std::path::Path;

pub(crate) use libsqlite3_sys::*;

use crate::error::{Error, Result};

// Part of the bundled engine but missing from the pregenerated bindings.
unsafe extern "C" {
    pub(crate) fn sqlite3_close_v2(db: *mut sqlite3) -> c_int;
}

/// Helper to evaluate sqlite3 calls which report through a connection.
///
/// On failure the supplied variant of [`Error`] is constructed from the
/// connection's current error state.
macro_rules! __sqlite3_try {
    ($variant:ident, $db:expr, $expr:expr) => {{
        let code = $expr;

        if code != $crate::ffi::SQLITE_OK {
            return Err($crate::error::Error::$variant(
                $crate::error::EngineError::from_connection(code, $db),
            ));
        }
    }};
}

pub(crate) use __sqlite3_try as sqlite3_try;

/// Read the message of the last error reported on the given connection.
///
/// # Safety
///
/// The connection pointer must be null or point to a live connection.
pub(crate) unsafe fn last_message(db: *mut sqlite3) -> Box<str> {
    if db.is_null() {
        return Box::from("out of memory");
    }

    unsafe { c_to_text(sqlite3_errmsg(db)) }
}

/// Convert a possibly null c-string into owned text, lossily.
pub(crate) unsafe fn c_to_text(ptr: *const c_char) -> Box<str> {
    if ptr.is_null() {
        return Box::from("");
    }

    unsafe { Box::from(CStr::from_ptr(ptr).to_string_lossy()) }
}

/// Convert a rust string into a c-string.
pub(crate) fn str_to_cstring(s: &str) -> Result<CString> {
    match CString::new(s) {
        Ok(string) => Ok(string),
        Err(..) => Err(Error::Misuse("string contains an interior nul byte")),
    }
}

pub(crate) fn path_to_cstring(p: &Path) -> Result<CString> {
    let Some(s) = p.to_str() else {
        return Err(Error::Misuse("path is not valid utf-8"));
    };

    str_to_cstring(s)
}

/// Convert a length into the engine's length type.
pub(crate) fn len_to_c_int(len: usize) -> Result<c_int> {
    match c_int::try_from(len) {
        Ok(len) => Ok(len),
        Err(..) => Err(Error::Capacity {
            required: len,
            capacity: c_int::MAX as usize,
        }),
    }
}

