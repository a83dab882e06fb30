use core::ffi::{CStr, c_int};
use core::fmt;
use core::mem::{self, ManuallyDrop};
use core::ptr::{self, NonNull};

use std::sync::Arc;

use crate::error::{Code, EngineError, Error, Result};
use crate::ffi;
use crate::value::Value;

/// The outcome of [`Statement::step`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum State {
    /// A row is available and its columns can be read.
    Row,
    /// Execution has finished and no further rows will be produced.
    Done,
    /// A lock held by another connection prevented progress.
    ///
    /// This is not an error. The caller decides whether and when to call
    /// [`Statement::step`] again.
    Busy,
}

impl State {
    /// Test if the state is [`State::Row`].
    #[inline]
    pub fn is_row(self) -> bool {
        matches!(self, State::Row)
    }

    /// Test if the state is [`State::Done`].
    #[inline]
    pub fn is_done(self) -> bool {
        matches!(self, State::Done)
    }

    /// Test if the state is [`State::Busy`].
    #[inline]
    pub fn is_busy(self) -> bool {
        matches!(self, State::Busy)
    }

    /// The numeric code used at the handle boundary: `0` for a row, `1` when
    /// done and `-1` when busy.
    ///
    /// # Examples
    ///
    /// ```
    /// use handlite::State;
    ///
    /// assert_eq!(State::Row.as_raw(), 0);
    /// assert_eq!(State::Done.as_raw(), 1);
    /// assert_eq!(State::Busy.as_raw(), -1);
    /// ```
    #[inline]
    pub fn as_raw(self) -> i32 {
        match self {
            State::Row => 0,
            State::Done => 1,
            State::Busy => -1,
        }
    }
}

/// Where a statement is in its execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Phase {
    /// Freshly prepared or reset.
    Prepared,
    /// Positioned on a row.
    Row,
    /// The last step reported [`State::Busy`] and can be retried.
    Busy,
    /// Execution finished. Stepping again reports [`State::Done`] until the
    /// statement is reset.
    Done,
    /// The last step failed. The statement must be reset before it is stepped
    /// again.
    Failed,
}

impl Phase {
    /// Whether reset and finalize report the outcome of the last step again.
    #[inline]
    fn repeats_step_error(self) -> bool {
        matches!(self, Phase::Busy | Phase::Failed)
    }
}

/// A prepared statement.
///
/// The statement is finalized by [`Statement::finalize`], or on drop.
///
/// Statements must be finalized before the connection they were prepared on
/// can be closed.
pub struct Statement {
    raw: NonNull<ffi::sqlite3_stmt>,
    parameter_count: c_int,
    phase: Phase,
    /// Buffers the engine references without owning them, by parameter.
    retained: Vec<Option<Arc<[u8]>>>,
}

impl fmt::Debug for Statement {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("parameter_count", &self.parameter_count)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

// SAFETY: The engine is built in serialized threading mode, and a statement is
// only ever used through its single owner.
unsafe impl Send for Statement {}

impl Statement {
    pub(crate) fn prepare(db: NonNull<ffi::sqlite3>, sql: &str) -> Result<Statement> {
        let len = ffi::len_to_c_int(sql.len())?;

        let raw = unsafe {
            let mut raw = ptr::null_mut();

            let code = ffi::sqlite3_prepare_v2(
                db.as_ptr(),
                sql.as_ptr().cast(),
                len,
                &mut raw,
                ptr::null_mut(),
            );

            if code != ffi::SQLITE_OK {
                return Err(Error::Prepare(EngineError::from_connection(code, db.as_ptr())));
            }

            // Empty statements, such as only whitespace or a comment, compile
            // to nothing.
            let Some(raw) = NonNull::new(raw) else {
                return Err(Error::Prepare(EngineError::new(
                    Code::MISUSE,
                    "sql does not contain a statement",
                )));
            };

            raw
        };

        let parameter_count = unsafe { ffi::sqlite3_bind_parameter_count(raw.as_ptr()) };

        tracing::debug!(sql, parameter_count, "prepared statement");

        Ok(Statement {
            raw,
            parameter_count,
            phase: Phase::Prepared,
            retained: vec![None; usize::try_from(parameter_count).unwrap_or_default()],
        })
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut ffi::sqlite3_stmt {
        self.raw.as_ptr()
    }

    /// The connection the statement was prepared on.
    #[inline]
    fn db(&self) -> *mut ffi::sqlite3 {
        unsafe { ffi::sqlite3_db_handle(self.raw.as_ptr()) }
    }

    /// The number of bindable parameters, derived from the SQL text when the
    /// statement was prepared.
    ///
    /// Parameters are numbered from `1` through this value. Repeated named
    /// parameters are counted once.
    ///
    /// # Examples
    ///
    /// ```
    /// use handlite::Connection;
    ///
    /// let c = Connection::open_in_memory()?;
    /// c.execute("CREATE TABLE t (a, b)")?;
    ///
    /// let stmt = c.prepare("SELECT * FROM t WHERE a = :x OR b = :x OR a > ?")?;
    /// assert_eq!(stmt.parameter_count(), 2);
    /// # Ok::<_, handlite::Error>(())
    /// ```
    #[inline]
    pub fn parameter_count(&self) -> c_int {
        self.parameter_count
    }

    /// The current execution phase.
    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The SQL text the statement was prepared from.
    pub fn sql(&self) -> Option<&str> {
        unsafe {
            let ptr = ffi::sqlite3_sql(self.raw.as_ptr());

            if ptr.is_null() {
                return None;
            }

            CStr::from_ptr(ptr).to_str().ok()
        }
    }

    /// Return the number of columns in the result set.
    #[inline]
    pub fn column_count(&self) -> c_int {
        unsafe { ffi::sqlite3_column_count(self.raw.as_ptr()) }
    }

    /// Return the name of the column at `index`, if it exists.
    pub fn column_name(&self, index: c_int) -> Option<&str> {
        unsafe {
            let ptr = ffi::sqlite3_column_name(self.raw.as_ptr(), index);

            if ptr.is_null() {
                return None;
            }

            CStr::from_ptr(ptr).to_str().ok()
        }
    }

    fn check_index(&self, index: c_int) -> Result<usize> {
        if index < 1 || index > self.parameter_count {
            return Err(Error::Bind(EngineError::new(
                Code::RANGE,
                format!(
                    "parameter index {index} is out of range, statement has {} parameters",
                    self.parameter_count
                ),
            )));
        }

        Ok((index - 1) as usize)
    }

    /// Bind through `f` after checking the index, then drop any buffer which
    /// was retained for the previous value.
    fn bind_with(
        &mut self,
        index: c_int,
        f: impl FnOnce(*mut ffi::sqlite3_stmt) -> c_int,
    ) -> Result<usize> {
        let slot = self.check_index(index)?;
        let code = f(self.raw.as_ptr());

        if code != ffi::SQLITE_OK {
            return Err(Error::Bind(EngineError::from_connection(code, self.db())));
        }

        self.retained[slot] = None;
        Ok(slot)
    }

    /// Bind a 32-bit integer to the 1-based parameter `index`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Bind`] if `index` is outside of
    /// `1..=parameter_count` or if the engine rejects the binding, for example
    /// because the statement is running.
    ///
    /// ```
    /// use handlite::{Code, Connection};
    ///
    /// let c = Connection::open_in_memory()?;
    /// let mut stmt = c.prepare("SELECT ?")?;
    ///
    /// stmt.bind_int(1, 42)?;
    ///
    /// let e = stmt.bind_int(2, 42).unwrap_err();
    /// assert_eq!(e.code(), Code::RANGE);
    /// # Ok::<_, handlite::Error>(())
    /// ```
    pub fn bind_int(&mut self, index: c_int, value: i32) -> Result<()> {
        self.bind_with(index, |raw| unsafe { ffi::sqlite3_bind_int(raw, index, value) })?;
        Ok(())
    }

    /// Bind a 64-bit integer to the 1-based parameter `index`.
    pub fn bind_long(&mut self, index: c_int, value: i64) -> Result<()> {
        self.bind_with(index, |raw| unsafe { ffi::sqlite3_bind_int64(raw, index, value) })?;
        Ok(())
    }

    /// Bind a floating point number to the 1-based parameter `index`.
    pub fn bind_double(&mut self, index: c_int, value: f64) -> Result<()> {
        self.bind_with(index, |raw| unsafe { ffi::sqlite3_bind_double(raw, index, value) })?;
        Ok(())
    }

    /// Bind text to the 1-based parameter `index`.
    ///
    /// The engine takes its own copy of the text.
    pub fn bind_string(&mut self, index: c_int, value: &str) -> Result<()> {
        let len = ffi::len_to_c_int(value.len())?;

        self.bind_with(index, |raw| unsafe {
            ffi::sqlite3_bind_text(raw, index, value.as_ptr().cast(), len, ffi::SQLITE_TRANSIENT())
        })?;

        Ok(())
    }

    /// Bind a blob to the 1-based parameter `index`.
    ///
    /// The engine takes its own copy of the bytes.
    pub fn bind_blob(&mut self, index: c_int, value: &[u8]) -> Result<()> {
        let len = ffi::len_to_c_int(value.len())?;

        self.bind_with(index, |raw| unsafe {
            ffi::sqlite3_bind_blob(raw, index, value.as_ptr().cast(), len, ffi::SQLITE_TRANSIENT())
        })?;

        Ok(())
    }

    /// Bind the first `length` bytes of a shared buffer to the 1-based
    /// parameter `index` without copying it.
    ///
    /// The statement holds on to `buffer` until the parameter is bound again,
    /// the bindings are cleared, or the statement is finalized.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Capacity`] if `length` exceeds the length of
    /// `buffer`.
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use handlite::{Connection, Error, State};
    ///
    /// let c = Connection::open_in_memory()?;
    /// let mut stmt = c.prepare("SELECT ?")?;
    ///
    /// let buffer: Arc<[u8]> = Arc::from(&b"hello world"[..]);
    ///
    /// assert!(matches!(
    ///     stmt.bind_shared_blob(1, buffer.clone(), 12),
    ///     Err(Error::Capacity { required: 12, capacity: 11 })
    /// ));
    ///
    /// stmt.bind_shared_blob(1, buffer, 5)?;
    /// assert_eq!(stmt.step()?, State::Row);
    /// assert_eq!(stmt.column_blob(0)?, Some(&b"hello"[..]));
    /// # Ok::<_, Error>(())
    /// ```
    pub fn bind_shared_blob(&mut self, index: c_int, buffer: Arc<[u8]>, length: usize) -> Result<()> {
        if length > buffer.len() {
            return Err(Error::Capacity {
                required: length,
                capacity: buffer.len(),
            });
        }

        let len = ffi::len_to_c_int(length)?;
        let data = buffer.as_ptr();

        let slot = self.bind_with(index, |raw| unsafe {
            ffi::sqlite3_bind_blob(raw, index, data.cast(), len, ffi::SQLITE_STATIC())
        })?;

        self.retained[slot] = Some(buffer);
        Ok(())
    }

    /// Bind `NULL` to the 1-based parameter `index`.
    pub fn bind_null(&mut self, index: c_int) -> Result<()> {
        self.bind_with(index, |raw| unsafe { ffi::sqlite3_bind_null(raw, index) })?;
        Ok(())
    }

    /// Bind a dynamic value to the 1-based parameter `index`.
    pub fn bind_value(&mut self, index: c_int, value: &Value) -> Result<()> {
        match value {
            Value::Null => self.bind_null(index),
            Value::Integer(value) => self.bind_long(index, *value),
            Value::Float(value) => self.bind_double(index, *value),
            Value::Text(value) => self.bind_string(index, value),
            Value::Blob(value) => self.bind_blob(index, value),
        }
    }

    /// Bind one value per parameter, in order.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Bind`] unless exactly [`parameter_count`] values
    /// are provided.
    ///
    /// [`parameter_count`]: Self::parameter_count
    ///
    /// ```
    /// use handlite::{Code, Connection, Value};
    ///
    /// let c = Connection::open_in_memory()?;
    /// let mut stmt = c.prepare("SELECT ?, ?")?;
    ///
    /// let e = stmt.bind_values(&[Value::from(1)]).unwrap_err();
    /// assert_eq!(e.code(), Code::RANGE);
    ///
    /// stmt.bind_values(&[Value::from(1), Value::from("two")])?;
    /// # Ok::<_, handlite::Error>(())
    /// ```
    pub fn bind_values(&mut self, values: &[Value]) -> Result<()> {
        if values.len() != self.retained.len() {
            return Err(Error::Bind(EngineError::new(
                Code::RANGE,
                format!(
                    "expected {} bind arguments but {} were provided",
                    self.parameter_count,
                    values.len()
                ),
            )));
        }

        for (index, value) in (1..).zip(values) {
            self.bind_value(index, value)?;
        }

        Ok(())
    }

    /// Set every parameter back to `NULL` and release retained buffers.
    pub fn clear_bindings(&mut self) -> Result<()> {
        let code = unsafe { ffi::sqlite3_clear_bindings(self.raw.as_ptr()) };

        if code != ffi::SQLITE_OK {
            return Err(Error::Bind(EngineError::from_connection(code, self.db())));
        }

        self.retained.fill(None);
        Ok(())
    }

    /// Step the statement.
    ///
    /// Once [`State::Done`] has been reported every further call reports
    /// [`State::Done`] again without running the statement, until it is
    /// [`reset`]. After an error the statement has to be reset before it can
    /// be stepped again.
    ///
    /// [`reset`]: Self::reset
    pub fn step(&mut self) -> Result<State> {
        match self.phase {
            Phase::Done => return Ok(State::Done),
            Phase::Failed => {
                return Err(Error::Step(EngineError::new(
                    Code::MISUSE,
                    "statement failed and must be reset before stepping",
                )));
            }
            _ => {}
        }

        let code = unsafe { ffi::sqlite3_step(self.raw.as_ptr()) };

        let state = match code {
            ffi::SQLITE_ROW => State::Row,
            ffi::SQLITE_DONE => State::Done,
            code if code & 0xff == ffi::SQLITE_BUSY => State::Busy,
            code => {
                self.phase = Phase::Failed;
                let error = EngineError::from_connection(code, self.db());
                tracing::trace!(%error, "step failed");
                return Err(Error::Step(error));
            }
        };

        self.phase = match state {
            State::Row => Phase::Row,
            State::Done => Phase::Done,
            State::Busy => Phase::Busy,
        };

        tracing::trace!(?state, "stepped");
        Ok(state)
    }

    /// Run a statement which is not expected to produce rows and report
    /// whether it changed any.
    ///
    /// `sqlite3_changes` is left as is by statements such as `CREATE TABLE`,
    /// so the connection's running total is compared instead.
    fn execute_non_query(&mut self) -> Result<bool> {
        if !matches!(self.phase, Phase::Prepared | Phase::Busy) {
            return Err(Error::Execute(EngineError::new(
                Code::MISUSE,
                "statement must be reset before it is executed again",
            )));
        }

        let before = unsafe { ffi::sqlite3_total_changes(self.db()) };

        match self.step() {
            Ok(State::Done) => Ok(unsafe { ffi::sqlite3_total_changes(self.db()) } != before),
            Ok(State::Row) => Err(Error::Execute(EngineError::new(
                Code::MISUSE,
                "statement produced a row, queries must be read by stepping",
            ))),
            Ok(State::Busy) => Err(Error::Execute(EngineError::from_connection(
                ffi::SQLITE_BUSY,
                self.db(),
            ))),
            Err(Error::Step(error)) => Err(Error::Execute(error)),
            Err(error) => Err(error),
        }
    }

    /// Execute the statement to completion and return the row id of the
    /// inserted row.
    ///
    /// Returns `None` if the statement completed without changing any rows,
    /// which includes statements such as `CREATE TABLE`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Execute`] if the statement produces a row, if the
    /// engine reports an error or a lock conflict, or if the statement was
    /// already executed and not reset.
    pub fn execute_insert(&mut self) -> Result<Option<i64>> {
        if !self.execute_non_query()? {
            return Ok(None);
        }

        let db = self.db();

        unsafe {
            if ffi::sqlite3_changes(db) > 0 {
                Ok(Some(ffi::sqlite3_last_insert_rowid(db)))
            } else {
                Ok(None)
            }
        }
    }

    /// Execute the statement to completion and return the number of rows it
    /// changed.
    ///
    /// Fails under the same conditions as [`execute_insert`].
    ///
    /// [`execute_insert`]: Self::execute_insert
    pub fn execute_update(&mut self) -> Result<usize> {
        if !self.execute_non_query()? {
            return Ok(0);
        }

        let changes = unsafe { ffi::sqlite3_changes(self.db()) };
        Ok(usize::try_from(changes).unwrap_or_default())
    }

    /// Reset the statement so that it can be stepped from the start.
    ///
    /// Bound parameters are kept.
    pub fn reset(&mut self) -> Result<()> {
        let code = unsafe { ffi::sqlite3_reset(self.raw.as_ptr()) };
        let previous = mem::replace(&mut self.phase, Phase::Prepared);

        // The engine repeats the error of the last step, which has already
        // been reported.
        if code != ffi::SQLITE_OK && !previous.repeats_step_error() {
            return Err(Error::Reset(EngineError::from_connection(code, self.db())));
        }

        Ok(())
    }

    /// Finalize the statement, releasing the engine resource.
    ///
    /// The statement is released even if this returns an error.
    pub fn finalize(self) -> Result<()> {
        let mut this = ManuallyDrop::new(self);
        let retained = mem::take(&mut this.retained);

        // NB: the connection might be released as a consequence of finalizing
        // the last statement of a closed connection, so no connection state
        // can be read afterwards.
        let code = unsafe { ffi::sqlite3_finalize(this.raw.as_ptr()) };
        drop(retained);

        if code != ffi::SQLITE_OK && !this.phase.repeats_step_error() {
            let error = EngineError::from_code(Code::new(code));
            tracing::warn!(%error, "finalize failed, statement released regardless");
            return Err(Error::Finalize(error));
        }

        tracing::debug!("finalized statement");
        Ok(())
    }
}

impl Drop for Statement {
    #[inline]
    fn drop(&mut self) {
        unsafe { ffi::sqlite3_finalize(self.raw.as_ptr()) };
    }
}
