use core::ffi::c_int;
use core::fmt;

use crate::ffi;

/// The dynamic storage class of a single cell.
///
/// This is independent of any declared column type, and can differ from row
/// to row within the same column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Type {
    /// The cell is `NULL`.
    Null,
    /// A 64-bit signed integer.
    Integer,
    /// A 64-bit floating point number.
    Float,
    /// UTF-8 text.
    Text,
    /// A blob of bytes.
    Blob,
}

impl Type {
    #[inline]
    pub(crate) fn from_raw(raw: c_int) -> Self {
        match raw {
            ffi::SQLITE_INTEGER => Type::Integer,
            ffi::SQLITE_FLOAT => Type::Float,
            ffi::SQLITE_TEXT => Type::Text,
            ffi::SQLITE_BLOB => Type::Blob,
            _ => Type::Null,
        }
    }

    /// The engine's numeric code for the storage class.
    ///
    /// # Examples
    ///
    /// ```
    /// use handlite::Type;
    ///
    /// assert_eq!(Type::Integer.as_raw(), 1);
    /// assert_eq!(Type::Null.as_raw(), 5);
    /// ```
    #[inline]
    pub fn as_raw(self) -> c_int {
        match self {
            Type::Null => ffi::SQLITE_NULL,
            Type::Integer => ffi::SQLITE_INTEGER,
            Type::Float => ffi::SQLITE_FLOAT,
            Type::Text => ffi::SQLITE_TEXT,
            Type::Blob => ffi::SQLITE_BLOB,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Null => write!(f, "NULL"),
            Type::Integer => write!(f, "INTEGER"),
            Type::Float => write!(f, "FLOAT"),
            Type::Text => write!(f, "TEXT"),
            Type::Blob => write!(f, "BLOB"),
        }
    }
}

/// An owned dynamic value.
///
/// Used to bind a whole argument list at once through
/// [`Statement::bind_values`], and to read a cell without knowing its
/// storage class ahead of time.
///
/// [`Statement::bind_values`]: crate::Statement::bind_values
///
/// # Examples
///
/// ```
/// use handlite::{Type, Value};
///
/// assert_eq!(Value::from(42).ty(), Type::Integer);
/// assert_eq!(Value::from(true), Value::Integer(1));
/// assert_eq!(Value::from(None::<&str>), Value::Null);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// `NULL`.
    Null,
    /// An integer.
    Integer(i64),
    /// A floating point number.
    Float(f64),
    /// Text.
    Text(String),
    /// A blob.
    Blob(Vec<u8>),
}

impl Value {
    /// The storage class the value binds as.
    pub fn ty(&self) -> Type {
        match self {
            Value::Null => Type::Null,
            Value::Integer(..) => Type::Integer,
            Value::Float(..) => Type::Float,
            Value::Text(..) => Type::Text,
            Value::Blob(..) => Type::Blob,
        }
    }

    /// Test if the value is `NULL`.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

macro_rules! from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                #[inline]
                fn from(value: $ty) -> Self {
                    Value::Integer(i64::from(value))
                }
            }
        )*
    };
}

from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    #[inline]
    fn from(value: bool) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<f32> for Value {
    #[inline]
    fn from(value: f32) -> Self {
        Value::Float(f64::from(value))
    }
}

impl From<f64> for Value {
    #[inline]
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    #[inline]
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    #[inline]
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&[u8]> for Value {
    #[inline]
    fn from(value: &[u8]) -> Self {
        Value::Blob(value.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    #[inline]
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl<T> From<Option<T>> for Value
where
    Value: From<T>,
{
    #[inline]
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Value::from(value),
            None => Value::Null,
        }
    }
}

/// Conflict resolution used by [`Connection::insert`].
///
/// [`Connection::insert`]: crate::Connection::insert
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Conflict {
    /// No conflict clause, the engine default (`ABORT`) applies.
    #[default]
    None,
    /// Roll back the current transaction on a constraint violation.
    Rollback,
    /// Abort the current statement, keeping prior changes of the transaction.
    Abort,
    /// Fail the statement, keeping changes it already made.
    Fail,
    /// Skip the conflicting row.
    Ignore,
    /// Replace the conflicting row.
    Replace,
}

impl Conflict {
    pub(crate) fn clause(self) -> &'static str {
        match self {
            Conflict::None => "",
            Conflict::Rollback => " OR ROLLBACK",
            Conflict::Abort => " OR ABORT",
            Conflict::Fail => " OR FAIL",
            Conflict::Ignore => " OR IGNORE",
            Conflict::Replace => " OR REPLACE",
        }
    }
}
