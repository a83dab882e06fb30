use core::ffi::{CStr, c_int};
use core::fmt;

use crate::ffi;
use crate::handle::HandleKind;

/// A result type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Error code.
///
/// This is the engine's result code. Extended result codes are kept as-is, but
/// are displayed through their primary code.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Code {
    raw: c_int,
}

impl Code {
    /// Construct a new code from the specified raw code.
    #[inline]
    pub(crate) const fn new(raw: c_int) -> Self {
        Self { raw }
    }
}

macro_rules! define_codes {
    ($(
        $vis:vis const $name:ident = $value:ident;
    )*) => {
        impl Code {
            $(
                $vis const $name: Code = Code::new($crate::ffi::$value);
            )*
        }

        impl fmt::Display for Code {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.primary() {
                    $(Code::$name => write!(f, stringify!($name)),)*
                    Code { raw } => write!(f, "UNKNOWN({raw})"),
                }
            }
        }

        impl fmt::Debug for Code {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(self, f)
            }
        }
    };
}

define_codes! {
    pub const OK = SQLITE_OK;
    pub const ERROR = SQLITE_ERROR;
    pub const INTERNAL = SQLITE_INTERNAL;
    pub const PERM = SQLITE_PERM;
    pub const ABORT = SQLITE_ABORT;
    pub const BUSY = SQLITE_BUSY;
    pub const LOCKED = SQLITE_LOCKED;
    pub const NOMEM = SQLITE_NOMEM;
    pub const READONLY = SQLITE_READONLY;
    pub const INTERRUPT = SQLITE_INTERRUPT;
    pub const IOERR = SQLITE_IOERR;
    pub const CORRUPT = SQLITE_CORRUPT;
    pub const NOTFOUND = SQLITE_NOTFOUND;
    pub const FULL = SQLITE_FULL;
    pub const CANTOPEN = SQLITE_CANTOPEN;
    pub const PROTOCOL = SQLITE_PROTOCOL;
    pub const EMPTY = SQLITE_EMPTY;
    pub const SCHEMA = SQLITE_SCHEMA;
    pub const TOOBIG = SQLITE_TOOBIG;
    pub const CONSTRAINT = SQLITE_CONSTRAINT;
    pub const MISMATCH = SQLITE_MISMATCH;
    pub const MISUSE = SQLITE_MISUSE;
    pub const NOLFS = SQLITE_NOLFS;
    pub const AUTH = SQLITE_AUTH;
    pub const FORMAT = SQLITE_FORMAT;
    pub const RANGE = SQLITE_RANGE;
    pub const NOTADB = SQLITE_NOTADB;
    pub const NOTICE = SQLITE_NOTICE;
    pub const WARNING = SQLITE_WARNING;
    pub const ROW = SQLITE_ROW;
    pub const DONE = SQLITE_DONE;
}

impl Code {
    /// Return the numeric representation of the error code.
    #[inline]
    pub fn as_raw(self) -> c_int {
        self.raw
    }

    /// The primary code, with any extended information stripped.
    ///
    /// # Examples
    ///
    /// ```
    /// use handlite::Code;
    ///
    /// assert_eq!(Code::BUSY.primary(), Code::BUSY);
    /// ```
    #[inline]
    pub fn primary(self) -> Code {
        Code::new(self.raw & 0xff)
    }

    /// Return the engine's generic description of the code.
    pub fn message(self) -> &'static str {
        // SAFETY: sqlite3_errstr returns a pointer to a static string for
        // every input.
        unsafe {
            let ptr = ffi::sqlite3_errstr(self.raw);

            if ptr.is_null() {
                return "unknown error";
            }

            CStr::from_ptr(ptr).to_str().unwrap_or("unknown error")
        }
    }
}

/// An error reported by the engine.
///
/// Carries the result code and the text of the owning connection's last error
/// at the point the failure was observed.
#[derive(Clone, PartialEq, Eq)]
pub struct EngineError {
    code: Code,
    message: Box<str>,
}

impl EngineError {
    /// Construct a new engine error.
    #[inline]
    pub(crate) fn new(code: Code, message: impl Into<Box<str>>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Construct an engine error from a raw code and the connection's current
    /// error message.
    ///
    /// If the raw code is `SQLITE_OK` the connection's own error code is used
    /// instead.
    pub(crate) fn from_connection(raw: c_int, db: *mut ffi::sqlite3) -> Self {
        // SAFETY: callers only pass null or live connections.
        unsafe {
            let raw = if raw == ffi::SQLITE_OK && !db.is_null() {
                ffi::sqlite3_errcode(db)
            } else {
                raw
            };

            Self::new(Code::new(raw), ffi::last_message(db))
        }
    }

    /// Construct an engine error which carries no connection message.
    pub(crate) fn from_code(code: Code) -> Self {
        Self::new(code, code.message())
    }

    /// The result code.
    #[inline]
    pub fn code(&self) -> Code {
        self.code
    }

    /// The connection's error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Debug for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineError")
            .field("code", &self.code)
            .field("message", &self.message)
            .finish()
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// An error.
///
/// Every operation which reaches the engine reports failures through the
/// variant matching the operation, so a failed bind is always
/// [`Error::Bind`] regardless of what code the engine produced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The database could not be opened.
    #[error("failed to open database: {0}")]
    Open(EngineError),
    /// The SQL text could not be compiled.
    #[error("failed to prepare statement: {0}")]
    Prepare(EngineError),
    /// A parameter could not be bound.
    #[error("failed to bind parameter: {0}")]
    Bind(EngineError),
    /// Stepping the statement failed.
    #[error("failed to step statement: {0}")]
    Step(EngineError),
    /// Resetting the statement failed.
    #[error("failed to reset statement: {0}")]
    Reset(EngineError),
    /// Finalizing the statement failed. The statement is released regardless.
    #[error("failed to finalize statement: {0}")]
    Finalize(EngineError),
    /// Closing the connection failed.
    #[error("failed to close database: {0}")]
    Close(EngineError),
    /// A transaction control statement failed.
    #[error("transaction control failed: {0}")]
    Transaction(EngineError),
    /// Applying an encryption key failed.
    #[error("failed to apply key: {0}")]
    Key(EngineError),
    /// Executing a non-query statement failed.
    #[error("failed to execute statement: {0}")]
    Execute(EngineError),
    /// A column could not be read.
    #[error("failed to read column: {0}")]
    Column(EngineError),
    /// The handle does not refer to a live resource.
    #[error("{kind} handle {handle:#x} is not live")]
    InvalidHandle {
        /// The kind of handle.
        kind: HandleKind,
        /// The raw handle value.
        handle: u64,
    },
    /// A buffer is too small for the data it should hold.
    #[error("buffer of {capacity} bytes cannot hold {required} bytes")]
    Capacity {
        /// Number of bytes needed.
        required: usize,
        /// Number of bytes available.
        capacity: usize,
    },
    /// The API was used incorrectly.
    #[error("misuse: {0}")]
    Misuse(&'static str),
}

impl Error {
    /// The result code associated with the error.
    ///
    /// Errors which do not originate in the engine map to the closest engine
    /// code.
    pub fn code(&self) -> Code {
        match self {
            Error::Open(e)
            | Error::Prepare(e)
            | Error::Bind(e)
            | Error::Step(e)
            | Error::Reset(e)
            | Error::Finalize(e)
            | Error::Close(e)
            | Error::Transaction(e)
            | Error::Key(e)
            | Error::Execute(e)
            | Error::Column(e) => e.code(),
            Error::InvalidHandle { .. } | Error::Misuse(..) => Code::MISUSE,
            Error::Capacity { .. } => Code::TOOBIG,
        }
    }

    /// The engine error, if this error originated in the engine.
    pub fn engine(&self) -> Option<&EngineError> {
        match self {
            Error::Open(e)
            | Error::Prepare(e)
            | Error::Bind(e)
            | Error::Step(e)
            | Error::Reset(e)
            | Error::Finalize(e)
            | Error::Close(e)
            | Error::Transaction(e)
            | Error::Key(e)
            | Error::Execute(e)
            | Error::Column(e) => Some(e),
            _ => None,
        }
    }
}
