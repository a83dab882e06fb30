//! Typed access to the columns of the row a statement is positioned on.
//!
//! Reads are only valid while the statement is in [`Phase::Row`]. Values
//! borrowed from the row cannot outlive it, since moving to the next row
//! requires mutable access to the statement.
//!
//! Numeric readers return zero for `NULL` cells, so absence and zero cannot be
//! told apart through them. Use [`Statement::column_is_null`] first when the
//! difference matters.

use core::ffi::c_int;
use core::slice;

use crate::error::{Code, EngineError, Error, Result};
use crate::ffi;
use crate::statement::{Phase, Statement};
use crate::value::{Type, Value};

impl Statement {
    /// Check that a row is available and that `index` is one of its columns.
    fn column_ptr(&self, index: c_int) -> Result<*mut ffi::sqlite3_stmt> {
        if self.phase() != Phase::Row {
            return Err(Error::Column(EngineError::new(
                Code::MISUSE,
                "statement is not positioned on a row",
            )));
        }

        let count = self.column_count();

        if index < 0 || index >= count {
            return Err(Error::Column(EngineError::new(
                Code::RANGE,
                format!("column index {index} is out of range, row has {count} columns"),
            )));
        }

        Ok(self.as_ptr())
    }

    /// Return the storage class of the cell at `index` in the current row.
    ///
    /// # Examples
    ///
    /// ```
    /// use handlite::{Connection, Type};
    ///
    /// let c = Connection::open_in_memory()?;
    /// let mut stmt = c.prepare("SELECT 1, 2.5, 'text', X'00', NULL")?;
    /// assert!(stmt.step()?.is_row());
    ///
    /// assert_eq!(stmt.column_type(0)?, Type::Integer);
    /// assert_eq!(stmt.column_type(1)?, Type::Float);
    /// assert_eq!(stmt.column_type(2)?, Type::Text);
    /// assert_eq!(stmt.column_type(3)?, Type::Blob);
    /// assert_eq!(stmt.column_type(4)?, Type::Null);
    /// # Ok::<_, handlite::Error>(())
    /// ```
    pub fn column_type(&self, index: c_int) -> Result<Type> {
        let raw = self.column_ptr(index)?;
        Ok(Type::from_raw(unsafe { ffi::sqlite3_column_type(raw, index) }))
    }

    /// Test if the cell at `index` is `NULL`.
    #[inline]
    pub fn column_is_null(&self, index: c_int) -> Result<bool> {
        Ok(self.column_type(index)? == Type::Null)
    }

    /// Read the cell at `index` as a 32-bit integer.
    ///
    /// `NULL` reads as `0`. Other storage classes are converted by the engine,
    /// so text is parsed and out of range values are truncated.
    pub fn column_int(&self, index: c_int) -> Result<i32> {
        let raw = self.column_ptr(index)?;

        unsafe {
            if ffi::sqlite3_column_type(raw, index) == ffi::SQLITE_NULL {
                return Ok(0);
            }

            Ok(ffi::sqlite3_column_int(raw, index))
        }
    }

    /// Read the cell at `index` as a 64-bit integer.
    ///
    /// `NULL` reads as `0`. Other storage classes are converted by the engine.
    pub fn column_long(&self, index: c_int) -> Result<i64> {
        let raw = self.column_ptr(index)?;

        unsafe {
            if ffi::sqlite3_column_type(raw, index) == ffi::SQLITE_NULL {
                return Ok(0);
            }

            Ok(ffi::sqlite3_column_int64(raw, index))
        }
    }

    /// Read the cell at `index` as a floating point number.
    ///
    /// `NULL` reads as `0.0`. Other storage classes are converted by the
    /// engine.
    pub fn column_double(&self, index: c_int) -> Result<f64> {
        let raw = self.column_ptr(index)?;

        unsafe {
            if ffi::sqlite3_column_type(raw, index) == ffi::SQLITE_NULL {
                return Ok(0.0);
            }

            Ok(ffi::sqlite3_column_double(raw, index))
        }
    }

    /// Read the cell at `index` as text.
    ///
    /// Returns `None` for `NULL`. Numbers are rendered as text by the engine.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Column`] if the cell holds a blob which is not
    /// valid UTF-8.
    pub fn column_string(&self, index: c_int) -> Result<Option<&str>> {
        let raw = self.column_ptr(index)?;

        // SAFETY: The text stays valid until the statement is stepped, reset
        // or finalized, which all require exclusive access. No UTF-16
        // accessors are used, so the representation is never converted.
        let bytes = unsafe {
            let ptr = ffi::sqlite3_column_text(raw, index);

            if ptr.is_null() {
                return Ok(None);
            }

            let len = usize::try_from(ffi::sqlite3_column_bytes(raw, index)).unwrap_or_default();
            slice::from_raw_parts(ptr, len)
        };

        match str::from_utf8(bytes) {
            Ok(s) => Ok(Some(s)),
            Err(..) => Err(Error::Column(EngineError::new(
                Code::MISMATCH,
                format!("column {index} is not valid utf-8"),
            ))),
        }
    }

    /// Borrow the cell at `index` as a blob.
    ///
    /// Returns `None` if the cell is `NULL` or empty.
    pub fn column_blob(&self, index: c_int) -> Result<Option<&[u8]>> {
        let raw = self.column_ptr(index)?;

        // SAFETY: See `column_string`.
        unsafe {
            let ptr = ffi::sqlite3_column_blob(raw, index);
            let len = usize::try_from(ffi::sqlite3_column_bytes(raw, index)).unwrap_or_default();

            if ptr.is_null() || len == 0 {
                return Ok(None);
            }

            Ok(Some(slice::from_raw_parts(ptr.cast::<u8>(), len)))
        }
    }

    /// Copy the cell at `index` into a new vector.
    ///
    /// Returns `None` if the cell is `NULL` or empty.
    #[inline]
    pub fn column_byte_array(&self, index: c_int) -> Result<Option<Vec<u8>>> {
        Ok(self.column_blob(index)?.map(<[u8]>::to_vec))
    }

    /// The length in bytes of the cell at `index`, without copying it.
    pub fn column_bytes(&self, index: c_int) -> Result<usize> {
        let raw = self.column_ptr(index)?;
        let len = unsafe { ffi::sqlite3_column_bytes(raw, index) };
        Ok(usize::try_from(len).unwrap_or_default())
    }

    /// Copy the cell at `index` into the front of `buffer` and return the
    /// number of bytes written.
    ///
    /// Writes nothing and returns `0` if the cell is `NULL` or empty.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Capacity`] if `buffer` is shorter than
    /// [`column_bytes`], in which case nothing is written.
    ///
    /// [`column_bytes`]: Self::column_bytes
    ///
    /// # Examples
    ///
    /// ```
    /// use handlite::{Connection, Error};
    ///
    /// let c = Connection::open_in_memory()?;
    /// let mut stmt = c.prepare("SELECT X'01020304'")?;
    /// assert!(stmt.step()?.is_row());
    ///
    /// let mut small = [0u8; 2];
    /// assert!(matches!(
    ///     stmt.column_blob_into(0, &mut small),
    ///     Err(Error::Capacity { required: 4, capacity: 2 })
    /// ));
    ///
    /// let mut buffer = [0u8; 8];
    /// assert_eq!(stmt.column_blob_into(0, &mut buffer)?, 4);
    /// assert_eq!(&buffer[..4], &[1, 2, 3, 4]);
    /// # Ok::<_, Error>(())
    /// ```
    pub fn column_blob_into(&self, index: c_int, buffer: &mut [u8]) -> Result<usize> {
        let Some(bytes) = self.column_blob(index)? else {
            return Ok(0);
        };

        let Some(target) = buffer.get_mut(..bytes.len()) else {
            return Err(Error::Capacity {
                required: bytes.len(),
                capacity: buffer.len(),
            });
        };

        target.copy_from_slice(bytes);
        Ok(bytes.len())
    }

    /// Read the cell at `index` as an owned value of its own storage class.
    pub fn column_value(&self, index: c_int) -> Result<Value> {
        let value = match self.column_type(index)? {
            Type::Null => Value::Null,
            Type::Integer => Value::Integer(self.column_long(index)?),
            Type::Float => Value::Float(self.column_double(index)?),
            Type::Text => Value::Text(self.column_string(index)?.unwrap_or_default().to_owned()),
            Type::Blob => Value::Blob(self.column_byte_array(index)?.unwrap_or_default()),
        };

        Ok(value)
    }
}
