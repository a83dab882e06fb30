//! Access to connections and statements through opaque integer handles.
//!
//! [`Bindings`] owns every connection and statement it hands out a handle for.
//! Each operation resolves its handles, forwards to [`Connection`] or
//! [`Statement`], and translates the result. Handles which were never issued,
//! or whose resource has been released, fail with [`Error::InvalidHandle`].

use core::ffi::c_int;
use core::fmt;

use std::path::Path;
use std::sync::Arc;

use secrecy::SecretString;

use crate::connection::Connection;
use crate::error::{Code, EngineError, Error, Result};
use crate::handle::{ConnectionHandle, HandleTable, StatementHandle};
use crate::open_options::OpenOptions;
use crate::statement::{State, Statement};
use crate::value::Type;

struct Entry {
    statement: Statement,
    owner: ConnectionHandle,
}

/// A registry of connections and statements addressed by handles.
///
/// # Examples
///
/// ```
/// use handlite::{Bindings, State};
///
/// let dir = tempfile::tempdir()?;
/// let mut b = Bindings::new();
///
/// let c = b.open(dir.path().join("app.db"), dir.path())?;
/// b.execute(c, "CREATE TABLE t (a INTEGER)")?;
///
/// let (s, count) = b.prepare(c, "INSERT INTO t VALUES (?)")?;
/// assert_eq!(count, 1);
/// b.bind_int(s, 1, 42)?;
/// assert_eq!(b.execute_for_last_inserted_row_id(c, s)?, 1);
/// b.finalize(s)?;
///
/// let (s, _) = b.prepare(c, "SELECT a FROM t")?;
/// assert_eq!(b.step(s)?, State::Row);
/// assert_eq!(b.column_int_value(s, 0)?, 42);
/// assert_eq!(b.step(s)?.as_raw(), 1);
/// b.finalize(s)?;
///
/// b.close(c)?;
/// assert!(b.close(c).is_err());
/// # Ok::<_, Box<dyn std::error::Error>>(())
/// ```
pub struct Bindings {
    connections: HandleTable<Connection>,
    statements: HandleTable<Entry>,
}

impl Bindings {
    /// Construct an empty registry.
    pub const fn new() -> Self {
        Self {
            connections: HandleTable::new(),
            statements: HandleTable::new(),
        }
    }

    /// The number of connections which have not been closed.
    #[inline]
    pub fn live_connections(&self) -> usize {
        self.connections.len()
    }

    /// The number of statements which have not been finalized.
    #[inline]
    pub fn live_statements(&self) -> usize {
        self.statements.len()
    }

    fn connection(&self, handle: ConnectionHandle) -> Result<&Connection> {
        self.connections
            .get(handle.handle())
            .ok_or_else(|| handle.invalid())
    }

    fn connection_mut(&mut self, handle: ConnectionHandle) -> Result<&mut Connection> {
        self.connections
            .get_mut(handle.handle())
            .ok_or_else(|| handle.invalid())
    }

    fn statement(&self, handle: StatementHandle) -> Result<&Statement> {
        match self.statements.get(handle.handle()) {
            Some(entry) => Ok(&entry.statement),
            None => Err(handle.invalid()),
        }
    }

    fn statement_mut(&mut self, handle: StatementHandle) -> Result<&mut Statement> {
        match self.statements.get_mut(handle.handle()) {
            Some(entry) => Ok(&mut entry.statement),
            None => Err(handle.invalid()),
        }
    }

    /// Resolve a statement for execution, checking that it was prepared on
    /// `connection`.
    fn owned_statement_mut(
        &mut self,
        connection: ConnectionHandle,
        statement: StatementHandle,
    ) -> Result<&mut Statement> {
        self.connection(connection)?;

        let Some(entry) = self.statements.get_mut(statement.handle()) else {
            return Err(statement.invalid());
        };

        if entry.owner != connection {
            return Err(Error::Misuse("statement was prepared on another connection"));
        }

        Ok(&mut entry.statement)
    }

    fn insert_connection(&mut self, c: Connection) -> Result<ConnectionHandle> {
        let handle = ConnectionHandle::new(self.connections.insert(c)?);
        tracing::debug!(?handle, "issued connection handle");
        Ok(handle)
    }

    /// Open a read-write connection, creating the database if needed, after
    /// setting the process-wide temporary directory.
    pub fn open(
        &mut self,
        path: impl AsRef<Path>,
        temp_directory: impl AsRef<Path>,
    ) -> Result<ConnectionHandle> {
        let c = Connection::open(path, temp_directory)?;
        self.insert_connection(c)
    }

    /// Open a connection with custom options.
    pub fn open_with(
        &mut self,
        options: &OpenOptions,
        path: impl AsRef<Path>,
    ) -> Result<ConnectionHandle> {
        let c = options.open(path)?;
        self.insert_connection(c)
    }

    /// Close a connection and invalidate its handle.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Close`] and [`Code::BUSY`] if statements prepared on
    /// the connection are still live. The handle then stays valid so that the
    /// statements can be finalized and the close retried.
    ///
    /// If the engine itself refuses to close the handle is released anyway and
    /// the engine resource is freed once it is no longer in use.
    pub fn close(&mut self, handle: ConnectionHandle) -> Result<()> {
        self.connection(handle)?;

        let open = self
            .statements
            .values()
            .filter(|entry| entry.owner == handle)
            .count();

        if open > 0 {
            return Err(Error::Close(EngineError::new(
                Code::BUSY,
                format!("unable to close connection, {open} statements are not finalized"),
            )));
        }

        let Some(c) = self.connections.remove(handle.handle()) else {
            return Err(handle.invalid());
        };

        c.close()
    }

    /// Execute one or more statements without reading rows.
    pub fn execute(&mut self, handle: ConnectionHandle, sql: &str) -> Result<()> {
        self.connection(handle)?.execute(sql)
    }

    /// Begin an explicit transaction.
    pub fn begin_transaction(&mut self, handle: ConnectionHandle) -> Result<()> {
        self.connection_mut(handle)?.begin_transaction()
    }

    /// Commit the open transaction, if any.
    pub fn commit_transaction(&mut self, handle: ConnectionHandle) -> Result<()> {
        self.connection_mut(handle)?.commit_transaction()
    }

    /// Apply an encryption key. Returns whether the engine accepted it.
    pub fn set_key(&mut self, handle: ConnectionHandle, key: &str) -> Result<bool> {
        let key = SecretString::from(key);
        Ok(self.connection_mut(handle)?.set_key(&key))
    }

    /// Change the encryption key of the database.
    pub fn rekey(&mut self, handle: ConnectionHandle, old_key: &str, new_key: &str) -> Result<()> {
        let old_key = SecretString::from(old_key);
        let new_key = SecretString::from(new_key);
        self.connection_mut(handle)?.rekey(&old_key, &new_key)
    }

    /// Prepare a statement on a connection.
    ///
    /// Returns the statement handle together with the number of parameters
    /// the statement accepts.
    pub fn prepare(
        &mut self,
        connection: ConnectionHandle,
        sql: &str,
    ) -> Result<(StatementHandle, i32)> {
        let statement = self.connection(connection)?.prepare(sql)?;
        let count = statement.parameter_count();

        let handle = self.statements.insert(Entry {
            statement,
            owner: connection,
        })?;

        Ok((StatementHandle::new(handle), count))
    }

    /// Bind a 32-bit integer.
    #[inline]
    pub fn bind_int(&mut self, handle: StatementHandle, index: c_int, value: i32) -> Result<()> {
        self.statement_mut(handle)?.bind_int(index, value)
    }

    /// Bind a 64-bit integer.
    #[inline]
    pub fn bind_long(&mut self, handle: StatementHandle, index: c_int, value: i64) -> Result<()> {
        self.statement_mut(handle)?.bind_long(index, value)
    }

    /// Bind a floating point number.
    #[inline]
    pub fn bind_double(&mut self, handle: StatementHandle, index: c_int, value: f64) -> Result<()> {
        self.statement_mut(handle)?.bind_double(index, value)
    }

    /// Bind text, copied by the engine.
    #[inline]
    pub fn bind_string(&mut self, handle: StatementHandle, index: c_int, value: &str) -> Result<()> {
        self.statement_mut(handle)?.bind_string(index, value)
    }

    /// Bind a blob, copied by the engine.
    #[inline]
    pub fn bind_blob(&mut self, handle: StatementHandle, index: c_int, value: &[u8]) -> Result<()> {
        self.statement_mut(handle)?.bind_blob(index, value)
    }

    /// Bind the first `length` bytes of a shared buffer without copying.
    #[inline]
    pub fn bind_byte_buffer(
        &mut self,
        handle: StatementHandle,
        index: c_int,
        buffer: Arc<[u8]>,
        length: usize,
    ) -> Result<()> {
        self.statement_mut(handle)?
            .bind_shared_blob(index, buffer, length)
    }

    /// Bind `NULL`.
    #[inline]
    pub fn bind_null(&mut self, handle: StatementHandle, index: c_int) -> Result<()> {
        self.statement_mut(handle)?.bind_null(index)
    }

    /// Step a statement. Use [`State::as_raw`] for the numeric code.
    #[inline]
    pub fn step(&mut self, handle: StatementHandle) -> Result<State> {
        self.statement_mut(handle)?.step()
    }

    /// Reset a statement, keeping its bindings.
    #[inline]
    pub fn reset(&mut self, handle: StatementHandle) -> Result<()> {
        self.statement_mut(handle)?.reset()
    }

    /// Finalize a statement and invalidate its handle.
    ///
    /// The handle is invalidated even if finalizing reports an error.
    pub fn finalize(&mut self, handle: StatementHandle) -> Result<()> {
        let Some(entry) = self.statements.remove(handle.handle()) else {
            return Err(handle.invalid());
        };

        entry.statement.finalize()
    }

    /// Execute an insert and return the row id of the inserted row, or `-1`
    /// if no row was changed.
    pub fn execute_for_last_inserted_row_id(
        &mut self,
        connection: ConnectionHandle,
        statement: StatementHandle,
    ) -> Result<i64> {
        let statement = self.owned_statement_mut(connection, statement)?;
        Ok(statement.execute_insert()?.unwrap_or(-1))
    }

    /// Execute a statement and return the number of rows it changed.
    pub fn execute_for_changed_row_count(
        &mut self,
        connection: ConnectionHandle,
        statement: StatementHandle,
    ) -> Result<i32> {
        let statement = self.owned_statement_mut(connection, statement)?;
        let changes = statement.execute_update()?;
        Ok(i32::try_from(changes).unwrap_or(i32::MAX))
    }

    /// The storage class of a cell in the current row.
    #[inline]
    pub fn column_type(&self, handle: StatementHandle, index: c_int) -> Result<Type> {
        self.statement(handle)?.column_type(index)
    }

    /// Test if a cell in the current row is `NULL`.
    #[inline]
    pub fn column_is_null(&self, handle: StatementHandle, index: c_int) -> Result<bool> {
        self.statement(handle)?.column_is_null(index)
    }

    /// Read a cell as a 32-bit integer, `0` if `NULL`.
    #[inline]
    pub fn column_int_value(&self, handle: StatementHandle, index: c_int) -> Result<i32> {
        self.statement(handle)?.column_int(index)
    }

    /// Read a cell as a 64-bit integer, `0` if `NULL`.
    #[inline]
    pub fn column_long_value(&self, handle: StatementHandle, index: c_int) -> Result<i64> {
        self.statement(handle)?.column_long(index)
    }

    /// Read a cell as a floating point number, `0.0` if `NULL`.
    #[inline]
    pub fn column_double_value(&self, handle: StatementHandle, index: c_int) -> Result<f64> {
        self.statement(handle)?.column_double(index)
    }

    /// Read a cell as owned text, `None` if `NULL`.
    pub fn column_string_value(
        &self,
        handle: StatementHandle,
        index: c_int,
    ) -> Result<Option<String>> {
        let value = self.statement(handle)?.column_string(index)?;
        Ok(value.map(str::to_owned))
    }

    /// Copy a cell into a new vector, `None` if `NULL` or empty.
    #[inline]
    pub fn column_byte_array_value(
        &self,
        handle: StatementHandle,
        index: c_int,
    ) -> Result<Option<Vec<u8>>> {
        self.statement(handle)?.column_byte_array(index)
    }

    /// The length in bytes of a cell.
    #[inline]
    pub fn column_byte_array_length(&self, handle: StatementHandle, index: c_int) -> Result<usize> {
        self.statement(handle)?.column_bytes(index)
    }

    /// Copy a cell into `buffer` and return the number of bytes written.
    ///
    /// Without a buffer nothing is copied and `0` is returned, once the handle
    /// and the column have been checked.
    pub fn column_byte_buffer_value(
        &self,
        handle: StatementHandle,
        index: c_int,
        buffer: Option<&mut [u8]>,
    ) -> Result<usize> {
        let statement = self.statement(handle)?;

        match buffer {
            Some(buffer) => statement.column_blob_into(index, buffer),
            None => {
                statement.column_type(index)?;
                Ok(0)
            }
        }
    }
}

impl Default for Bindings {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bindings")
            .field("live_connections", &self.live_connections())
            .field("live_statements", &self.live_statements())
            .finish()
    }
}

impl Drop for Bindings {
    fn drop(&mut self) {
        for entry in self.statements.drain() {
            if let Err(error) = entry.statement.finalize() {
                tracing::warn!(%error, "failed to finalize statement on drop");
            }
        }

        for c in self.connections.drain() {
            if let Err(error) = c.close() {
                tracing::warn!(%error, "failed to close connection on drop");
            }
        }
    }
}
