use core::ffi::{c_char, c_int};
use core::mem::ManuallyDrop;
use core::ptr::{self, NonNull};
use core::time::Duration;

use std::path::Path;

use secrecy::{ExposeSecret, SecretSlice, SecretString};

use crate::error::{Code, EngineError, Error, Result};
use crate::ffi::{self, sqlite3_try};
use crate::open_options::OpenOptions;
use crate::statement::{State, Statement};
use crate::value::{Conflict, Value};

/// How failures of transaction control statements are reported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TransactionErrors {
    /// Report failures as [`Error::Transaction`].
    #[default]
    Propagate,
    /// Log failures and carry on as if the statement succeeded.
    Ignore,
}

/// A database connection.
///
/// The connection exclusively owns the underlying engine connection. It is
/// released by [`Connection::close`], or on drop if it was never closed.
///
/// # Thread safety
///
/// A connection is [`Send`] but not [`Sync`]. All operations which modify it
/// take `&mut self`, so operations on one connection are always serialized by
/// its owner. Use one connection per thread, or wrap it in a mutex.
///
/// # Examples
///
/// ```
/// use handlite::{Connection, State};
///
/// let c = Connection::open_in_memory()?;
/// c.execute("CREATE TABLE t (a INTEGER, b TEXT)")?;
///
/// let mut insert = c.prepare("INSERT INTO t VALUES (?, ?)")?;
/// insert.bind_int(1, 42)?;
/// insert.bind_string(2, "hello")?;
/// let row_id = insert.execute_insert()?;
/// assert_eq!(row_id, Some(1));
/// insert.finalize()?;
///
/// let mut select = c.prepare("SELECT a, b FROM t")?;
/// assert_eq!(select.step()?, State::Row);
/// assert_eq!(select.column_int(0)?, 42);
/// assert_eq!(select.column_string(1)?, Some("hello"));
/// assert_eq!(select.step()?, State::Done);
/// select.finalize()?;
///
/// c.close()?;
/// # Ok::<_, handlite::Error>(())
/// ```
#[derive(Debug)]
pub struct Connection {
    raw: NonNull<ffi::sqlite3>,
    transaction: bool,
    transaction_errors: TransactionErrors,
}

// SAFETY: The engine is built in serialized threading mode, and a connection
// is only ever used through its single owner.
unsafe impl Send for Connection {}

impl Connection {
    pub(crate) fn from_raw(raw: NonNull<ffi::sqlite3>, transaction_errors: TransactionErrors) -> Self {
        Self {
            raw,
            transaction: false,
            transaction_errors,
        }
    }

    /// Open a read-write connection to a new or existing database, and set
    /// the process-wide temporary directory to `temp_directory`.
    pub fn open(path: impl AsRef<Path>, temp_directory: impl AsRef<Path>) -> Result<Connection> {
        OpenOptions::new().temp_directory(temp_directory).open(path)
    }

    /// Open an in-memory database.
    #[inline]
    pub fn open_in_memory() -> Result<Connection> {
        OpenOptions::new().open_in_memory()
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut ffi::sqlite3 {
        self.raw.as_ptr()
    }

    /// Execute one or more statements without processing any resulting rows.
    ///
    /// # Examples
    ///
    /// ```
    /// use handlite::{Code, Connection};
    ///
    /// let c = Connection::open_in_memory()?;
    ///
    /// c.execute(r#"
    ///     CREATE TABLE users (name TEXT);
    ///     INSERT INTO users VALUES ('Alice');
    /// "#)?;
    ///
    /// let e = c.execute(":)").unwrap_err();
    /// assert_eq!(e.code(), Code::ERROR);
    /// # Ok::<_, handlite::Error>(())
    /// ```
    pub fn execute(&self, sql: impl AsRef<str>) -> Result<()> {
        let sql = ffi::str_to_cstring(sql.as_ref())?;

        unsafe {
            sqlite3_try! {
                Execute,
                self.as_ptr(),
                ffi::sqlite3_exec(self.as_ptr(), sql.as_ptr(), None, ptr::null_mut(), ptr::null_mut())
            };
        }

        Ok(())
    }

    /// Compile a single statement.
    ///
    /// The number of parameters in the statement is available through
    /// [`Statement::parameter_count`]. The connection remains usable if
    /// preparing fails.
    #[inline]
    pub fn prepare(&self, sql: impl AsRef<str>) -> Result<Statement> {
        Statement::prepare(self.raw, sql.as_ref())
    }

    /// Begin an explicit transaction.
    ///
    /// Fails with [`Error::Transaction`] if this connection already has a
    /// transaction open.
    pub fn begin_transaction(&mut self) -> Result<()> {
        if self.transaction {
            return Err(Error::Transaction(EngineError::new(
                Code::MISUSE,
                "already in a transaction",
            )));
        }

        let result = self.transaction_control(c"BEGIN");
        self.transaction = !self.is_autocommit() || self.transaction_errors == TransactionErrors::Ignore;
        result
    }

    /// Commit the transaction opened with [`begin_transaction`].
    ///
    /// Does nothing if no transaction is open. If the commit fails, for
    /// example because the database is busy, the transaction stays open and
    /// the commit can be retried.
    ///
    /// [`begin_transaction`]: Self::begin_transaction
    pub fn commit_transaction(&mut self) -> Result<()> {
        if !self.transaction {
            return Ok(());
        }

        let result = self.transaction_control(c"COMMIT");
        self.transaction = !self.is_autocommit() && self.transaction_errors == TransactionErrors::Propagate;
        result
    }

    fn transaction_control(&self, sql: &core::ffi::CStr) -> Result<()> {
        let code = unsafe {
            ffi::sqlite3_exec(self.as_ptr(), sql.as_ptr(), None, ptr::null_mut(), ptr::null_mut())
        };

        if code == ffi::SQLITE_OK {
            return Ok(());
        }

        let error = EngineError::from_connection(code, self.as_ptr());

        match self.transaction_errors {
            TransactionErrors::Propagate => Err(Error::Transaction(error)),
            TransactionErrors::Ignore => {
                tracing::warn!(sql = %sql.to_string_lossy(), %error, "ignoring transaction control failure");
                Ok(())
            }
        }
    }

    /// Test if a transaction was opened with [`begin_transaction`] and not yet
    /// committed.
    ///
    /// [`begin_transaction`]: Self::begin_transaction
    #[inline]
    pub fn in_transaction(&self) -> bool {
        self.transaction
    }

    /// Test if the engine is in autocommit mode, which is the case whenever no
    /// transaction is active.
    #[inline]
    pub fn is_autocommit(&self) -> bool {
        unsafe { ffi::sqlite3_get_autocommit(self.as_ptr()) != 0 }
    }

    /// Apply an encryption key to the open connection.
    ///
    /// Returns whether the engine accepted the key. The key is passed through
    /// as-is and is only meaningful if the engine was built with a codec, see
    /// the `sqlcipher` feature.
    pub fn set_key(&mut self, key: &SecretString) -> bool {
        match self.apply_key(key) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%error, "failed to apply key");
                false
            }
        }
    }

    /// Apply `old_key`, then ask the engine to re-encrypt the database with
    /// `new_key`.
    pub fn rekey(&mut self, old_key: &SecretString, new_key: &SecretString) -> Result<()> {
        self.apply_key(old_key)?;
        self.key_pragma("rekey", new_key)
    }

    pub(crate) fn apply_key(&mut self, key: &SecretString) -> Result<()> {
        self.key_pragma("key", key)
    }

    fn key_pragma(&mut self, pragma: &str, key: &SecretString) -> Result<()> {
        let key = key.expose_secret();

        if key.contains('\0') {
            return Err(Error::Misuse("key contains an interior nul byte"));
        }

        let mut sql = Vec::with_capacity(pragma.len() + key.len() + 16);
        sql.extend_from_slice(b"PRAGMA ");
        sql.extend_from_slice(pragma.as_bytes());
        sql.extend_from_slice(b" = '");

        for b in key.bytes() {
            if b == b'\'' {
                sql.push(b'\'');
            }

            sql.push(b);
        }

        sql.extend_from_slice(b"'\0");

        // Zeroized when dropped.
        let sql = SecretSlice::from(sql);

        unsafe {
            sqlite3_try! {
                Key,
                self.as_ptr(),
                ffi::sqlite3_exec(
                    self.as_ptr(),
                    sql.expose_secret().as_ptr().cast::<c_char>(),
                    None,
                    ptr::null_mut(),
                    ptr::null_mut(),
                )
            };
        }

        Ok(())
    }

    /// Set the engine's busy handler to sleep and retry until `timeout` has
    /// elapsed. A zero timeout removes the handler.
    pub fn set_busy_timeout(&mut self, timeout: Duration) -> Result<()> {
        let millis = c_int::try_from(timeout.as_millis()).unwrap_or(c_int::MAX);

        unsafe {
            sqlite3_try! {
                Execute,
                self.as_ptr(),
                ffi::sqlite3_busy_timeout(self.as_ptr(), millis)
            };
        }

        Ok(())
    }

    /// Read the schema so that a file which is not a database is detected.
    pub(crate) fn validate(&self) -> Result<()> {
        let mut stmt = self.prepare("PRAGMA schema_version")?;
        stmt.step()?;
        stmt.finalize()
    }

    /// Run a query and return the first column of its first row as an
    /// integer, or `None` if it produced no rows.
    ///
    /// # Examples
    ///
    /// ```
    /// use handlite::{Connection, Value};
    ///
    /// let c = Connection::open_in_memory()?;
    /// c.execute("CREATE TABLE t (a INTEGER); INSERT INTO t VALUES (7);")?;
    ///
    /// assert_eq!(c.execute_int("SELECT a FROM t WHERE a = ?", &[Value::from(7)])?, Some(7));
    /// assert_eq!(c.execute_int("SELECT a FROM t WHERE a = ?", &[Value::from(8)])?, None);
    /// # Ok::<_, handlite::Error>(())
    /// ```
    pub fn execute_int(&self, sql: impl AsRef<str>, args: &[Value]) -> Result<Option<i32>> {
        let mut stmt = self.prepare(sql)?;
        stmt.bind_values(args)?;

        let value = match stmt.step()? {
            State::Row => Some(stmt.column_int(0)?),
            State::Done => None,
            State::Busy => {
                return Err(Error::Step(EngineError::from_connection(
                    ffi::SQLITE_BUSY,
                    self.as_ptr(),
                )));
            }
        };

        stmt.finalize()?;
        Ok(value)
    }

    /// Test if a table with the given name exists.
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let value = self.execute_int(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?",
            &[Value::from(name)],
        )?;

        Ok(value.is_some())
    }

    /// Insert a single row built from column name and value pairs.
    ///
    /// If `values` is empty, `null_column` names a nullable column which is
    /// set to `NULL` so that an otherwise empty row can be inserted.
    ///
    /// Returns the row id of the inserted row, or `None` if no row was
    /// inserted, which can happen with [`Conflict::Ignore`].
    ///
    /// # Examples
    ///
    /// ```
    /// use handlite::{Conflict, Connection, Value};
    ///
    /// let c = Connection::open_in_memory()?;
    /// c.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT UNIQUE)")?;
    ///
    /// let values = [("name", Value::from("Alice"))];
    /// assert_eq!(c.insert("users", None, &values, Conflict::None)?, Some(1));
    /// assert_eq!(c.insert("users", None, &values, Conflict::Ignore)?, None);
    /// # Ok::<_, handlite::Error>(())
    /// ```
    pub fn insert(
        &self,
        table: &str,
        null_column: Option<&str>,
        values: &[(&str, Value)],
        conflict: Conflict,
    ) -> Result<Option<i64>> {
        let mut sql = String::from("INSERT");
        sql.push_str(conflict.clause());
        sql.push_str(" INTO ");
        push_identifier(&mut sql, table);
        sql.push_str(" (");

        if values.is_empty() {
            let Some(null_column) = null_column else {
                return Err(Error::Misuse("insert requires at least one value or a null column"));
            };

            push_identifier(&mut sql, null_column);
            sql.push_str(") VALUES (NULL)");
        } else {
            for (n, (column, _)) in values.iter().enumerate() {
                if n > 0 {
                    sql.push_str(", ");
                }

                push_identifier(&mut sql, column);
            }

            sql.push_str(") VALUES (");

            for n in 0..values.len() {
                sql.push_str(if n > 0 { ", ?" } else { "?" });
            }

            sql.push(')');
        }

        let mut stmt = self.prepare(&sql)?;

        for (n, (_, value)) in values.iter().enumerate() {
            let index = c_int::try_from(n + 1).unwrap_or(c_int::MAX);
            stmt.bind_value(index, value)?;
        }

        let row_id = stmt.execute_insert()?;
        stmt.finalize()?;
        Ok(row_id)
    }

    /// Return the number of rows inserted, updated, or deleted by the most
    /// recent INSERT, UPDATE, or DELETE statement.
    #[inline]
    pub fn changes(&self) -> usize {
        unsafe { ffi::sqlite3_changes(self.as_ptr()) as usize }
    }

    /// Return the total number of rows inserted, updated, and deleted by all
    /// INSERT, UPDATE, and DELETE statements since the connection was opened.
    #[inline]
    pub fn total_changes(&self) -> usize {
        unsafe { ffi::sqlite3_total_changes(self.as_ptr()) as usize }
    }

    /// Return the row id of the most recent successful insert.
    #[inline]
    pub fn last_insert_rowid(&self) -> i64 {
        unsafe { ffi::sqlite3_last_insert_rowid(self.as_ptr()) }
    }

    /// Close the connection.
    ///
    /// A transaction opened with [`begin_transaction`] is committed first. If
    /// that commit fails the connection is still released, which rolls the
    /// transaction back, and the commit failure is returned as
    /// [`Error::Transaction`]. Under [`TransactionErrors::Ignore`] the failure
    /// is only logged.
    ///
    /// Fails with [`Error::Close`] if the engine refuses to close, most notably
    /// because statements prepared on this connection have not been
    /// finalized. In that case the engine resource is released as soon as the
    /// last of those statements is finalized or dropped.
    ///
    /// [`begin_transaction`]: Self::begin_transaction
    pub fn close(self) -> Result<()> {
        let mut this = ManuallyDrop::new(self);

        // Only fails under TransactionErrors::Propagate.
        let committed = this.commit_transaction();

        if let Err(error) = &committed {
            tracing::warn!(%error, "pending transaction rolled back while closing");
        }

        let raw = this.as_ptr();

        let closed = unsafe {
            let code = ffi::sqlite3_close(raw);

            if code != ffi::SQLITE_OK {
                let error = EngineError::from_connection(code, raw);
                tracing::warn!(%error, "close refused, deferring release");
                ffi::sqlite3_close_v2(raw);
                Err(Error::Close(error))
            } else {
                Ok(())
            }
        };

        committed?;
        closed?;
        tracing::debug!("closed connection");
        Ok(())
    }
}

impl Drop for Connection {
    #[inline]
    fn drop(&mut self) {
        // Will close the connection unconditionally. The database will stay
        // alive until all associated prepared statements have been closed since
        // we're using v2.
        let code = unsafe { ffi::sqlite3_close_v2(self.raw.as_ptr()) };
        debug_assert_eq!(code, ffi::SQLITE_OK);
    }
}

fn push_identifier(sql: &mut String, name: &str) {
    sql.push('"');

    for c in name.chars() {
        if c == '"' {
            sql.push('"');
        }

        sql.push(c);
    }

    sql.push('"');
}
