//! A thin binding layer over an embedded [SQLite] engine.
//!
//! <br>
//!
//! ## Usage
//!
//! There are two ways of driving the engine through this crate.
//!
//! The typed surface is [`Connection`] and [`Statement`], which own the
//! underlying engine objects and release them when closed, finalized, or
//! dropped. Statements are [stepped] one row at a time and the current row is
//! read through the typed column readers such as [`column_int`] and
//! [`column_string`].
//!
//! The handle surface is [`Bindings`], which owns connections and statements
//! on behalf of a caller that can only hold integers. Every handle is checked
//! before use, so a handle which was closed or finalized is rejected with
//! [`Error::InvalidHandle`] instead of touching released memory.
//!
//! <br>
//!
//! #### Connecting and querying
//!
//! ```
//! use handlite::{Connection, State, Type};
//!
//! let c = Connection::open_in_memory()?;
//!
//! c.execute(r#"
//!     CREATE TABLE users (name TEXT, age INTEGER, photo BLOB);
//!
//!     INSERT INTO users VALUES ('Alice', 42, NULL);
//!     INSERT INTO users VALUES ('Bob', 52, X'0102');
//! "#)?;
//!
//! let mut stmt = c.prepare("SELECT name, age, photo FROM users WHERE age > ?")?;
//! assert_eq!(stmt.parameter_count(), 1);
//! stmt.bind_int(1, 50)?;
//!
//! assert_eq!(stmt.step()?, State::Row);
//! assert_eq!(stmt.column_string(0)?, Some("Bob"));
//! assert_eq!(stmt.column_long(1)?, 52);
//! assert_eq!(stmt.column_type(2)?, Type::Blob);
//! assert_eq!(stmt.column_blob(2)?, Some(&[1u8, 2][..]));
//!
//! assert_eq!(stmt.step()?, State::Done);
//! // Stays done until reset.
//! assert_eq!(stmt.step()?, State::Done);
//!
//! stmt.finalize()?;
//! c.close()?;
//! # Ok::<_, handlite::Error>(())
//! ```
//!
//! <br>
//!
//! #### Busy databases
//!
//! A lock held by another connection is reported by [`Statement::step`] as
//! [`State::Busy`]. This is not an error and the caller decides when to retry.
//! Alternatively [`OpenOptions::busy_timeout`] installs the engine's own
//! sleeping busy handler.
//!
//! <br>
//!
//! ## Features
//!
//! * `bundled` - Build and statically link the engine. Enabled by default.
//! * `sqlcipher` - Build the engine with an encryption codec, which gives the
//!   keys passed to [`Connection::set_key`] and [`Connection::rekey`] effect.
//!
//! <br>
//!
//! ## Logging
//!
//! Lifecycle events are emitted through [`tracing`]. Opening, closing,
//! preparing and finalizing are logged at `debug`, stepping at `trace`, and
//! failures which are handled internally at `warn`. No subscriber is installed
//! by this crate.
//!
//! [`column_int`]: Statement::column_int
//! [`column_string`]: Statement::column_string
//! [stepped]: Statement::step
//! [`tracing`]: https://docs.rs/tracing
//! [SQLite]: https://www.sqlite.org

#![warn(rustdoc::broken_intra_doc_links)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(test)]
mod tests;

mod bindings;
mod connection;
mod cursor;
mod error;
mod ffi;
mod handle;
mod open_options;
mod statement;
pub mod temp_directory;
mod value;

#[doc(inline)]
pub use self::bindings::Bindings;
#[doc(inline)]
pub use self::connection::{Connection, TransactionErrors};
#[doc(inline)]
pub use self::error::{Code, EngineError, Error, Result};
#[doc(inline)]
pub use self::handle::{ConnectionHandle, HandleKind, StatementHandle};
#[doc(inline)]
pub use self::open_options::OpenOptions;
#[doc(inline)]
pub use self::statement::{Phase, State, Statement};
#[doc(inline)]
pub use self::value::{Conflict, Type, Value};
