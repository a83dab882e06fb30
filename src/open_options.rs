use core::ffi::{CStr, c_int};
use core::ptr::{self, NonNull};
use core::time::Duration;

use std::path::{Path, PathBuf};

use secrecy::SecretString;

use crate::connection::{Connection, TransactionErrors};
use crate::error::{Code, EngineError, Error, Result};
use crate::{ffi, temp_directory};

/// Options that can be used to customize the opening of a database.
///
/// By default the database is opened for reading and writing and created if
/// it does not exist, and the file is checked to be a database before the
/// connection is returned.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use handlite::{OpenOptions, TransactionErrors};
///
/// let dir = tempfile::tempdir()?;
///
/// let c = OpenOptions::new()
///     .temp_directory(dir.path())
///     .busy_timeout(Duration::from_millis(250))
///     .transaction_errors(TransactionErrors::Propagate)
///     .open(dir.path().join("app.db"))?;
///
/// c.execute("CREATE TABLE t (a INTEGER)")?;
/// c.close()?;
/// # Ok::<_, Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct OpenOptions {
    raw: c_int,
    temp_directory: Option<PathBuf>,
    busy_timeout: Option<Duration>,
    key: Option<SecretString>,
    transaction_errors: TransactionErrors,
    validate: bool,
}

impl OpenOptions {
    /// Create options for opening a database connection.
    #[inline]
    pub fn new() -> Self {
        Self {
            raw: ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE,
            temp_directory: None,
            busy_timeout: None,
            key: None,
            transaction_errors: TransactionErrors::default(),
            validate: true,
        }
    }

    /// Open the database for reading only.
    ///
    /// The database must already exist.
    #[inline]
    pub fn read_only(&mut self) -> &mut Self {
        self.raw &= !(ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE);
        self.raw |= ffi::SQLITE_OPEN_READONLY;
        self
    }

    /// Open the database for reading and writing, creating it if needed.
    #[inline]
    pub fn read_write(&mut self) -> &mut Self {
        self.raw &= !ffi::SQLITE_OPEN_READONLY;
        self.raw |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        self
    }

    /// Open the database in the multi-thread [threading mode][1].
    ///
    /// [1]: https://www.sqlite.org/threadsafe.html
    #[inline]
    pub fn no_mutex(&mut self) -> &mut Self {
        self.raw &= !ffi::SQLITE_OPEN_FULLMUTEX;
        self.raw |= ffi::SQLITE_OPEN_NOMUTEX;
        self
    }

    /// Open the database in the serialized [threading mode][1].
    ///
    /// [1]: https://www.sqlite.org/threadsafe.html
    #[inline]
    pub fn full_mutex(&mut self) -> &mut Self {
        self.raw &= !ffi::SQLITE_OPEN_NOMUTEX;
        self.raw |= ffi::SQLITE_OPEN_FULLMUTEX;
        self
    }

    /// Configure the process-wide temporary storage directory once the
    /// database has been opened.
    ///
    /// The directory is left untouched if opening fails. See
    /// [`temp_directory::set`] for how concurrent writers are handled.
    #[inline]
    pub fn temp_directory(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.temp_directory = Some(path.as_ref().to_path_buf());
        self
    }

    /// Install the engine's busy handler which sleeps and retries locked
    /// operations until `timeout` has elapsed.
    ///
    /// Without this a lock conflict is reported immediately as
    /// [`State::Busy`].
    ///
    /// [`State::Busy`]: crate::State::Busy
    #[inline]
    pub fn busy_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.busy_timeout = Some(timeout);
        self
    }

    /// Apply an encryption key right after opening, before the file is first
    /// read.
    #[inline]
    pub fn key(&mut self, key: SecretString) -> &mut Self {
        self.key = Some(key);
        self
    }

    /// Select how failures of transaction control statements are reported.
    #[inline]
    pub fn transaction_errors(&mut self, policy: TransactionErrors) -> &mut Self {
        self.transaction_errors = policy;
        self
    }

    /// Whether to read the schema while opening so that a file which is not a
    /// database fails to open. Enabled by default.
    #[inline]
    pub fn validate(&mut self, validate: bool) -> &mut Self {
        self.validate = validate;
        self
    }

    /// Open a database connection with the current options.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<Connection> {
        let path = ffi::path_to_cstring(path.as_ref())?;
        self._open(&path)
    }

    /// Open an in-memory database connection with the current options.
    #[inline]
    pub fn open_in_memory(&self) -> Result<Connection> {
        self._open(c":memory:")
    }

    fn _open(&self, name: &CStr) -> Result<Connection> {
        let raw = unsafe {
            let mut raw = ptr::null_mut();
            let code = ffi::sqlite3_open_v2(name.as_ptr(), &mut raw, self.raw, ptr::null());

            if code != ffi::SQLITE_OK {
                let error = EngineError::from_connection(code, raw);
                // A connection object is allocated even if opening failed.
                ffi::sqlite3_close_v2(raw);
                return Err(Error::Open(error));
            }

            match NonNull::new(raw) {
                Some(raw) => raw,
                None => return Err(Error::Open(EngineError::from_code(Code::NOMEM))),
            }
        };

        let mut c = Connection::from_raw(raw, self.transaction_errors);

        if let Some(path) = &self.temp_directory {
            temp_directory::set(path)?;
        }

        if let Some(timeout) = self.busy_timeout {
            c.set_busy_timeout(timeout).map_err(into_open)?;
        }

        if let Some(key) = &self.key {
            c.apply_key(key).map_err(into_open)?;
        }

        if self.validate {
            c.validate().map_err(into_open)?;
        }

        tracing::debug!(path = %name.to_string_lossy(), "opened connection");
        Ok(c)
    }
}

impl Default for OpenOptions {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// Report an engine failure during setup as an open failure.
fn into_open(error: Error) -> Error {
    match error.engine() {
        Some(engine) => Error::Open(engine.clone()),
        None => error,
    }
}
