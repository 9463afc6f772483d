//! Application-defined SQL functions and collations for SQLite connections using sqlx.
//!
//! SQLite scopes functions and collations to a single connection, so they must
//! be installed on every connection a pool opens. This crate provides the
//! pieces to do that:
//!
//! - [`CustomFunction`]: a named scalar function backed by a Rust closure
//! - [`FunctionRegistry`]: a shared, growable set of functions with an
//!   async [`install`](FunctionRegistry::install) for a sqlx connection
//! - [`collation`]: primary-strength collation keys and the comparison
//!   functions behind the `LOCALIZED` and `UNICODE` collations
//!
//! # Example
//!
//! ```no_run
//! use sqlx::Connection;
//! use sqlx::sqlite::SqliteConnection;
//! use sqlx_sqlcipher_functions::{CustomFunction, FunctionRegistry, SqliteValue};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = FunctionRegistry::new();
//! registry.add(CustomFunction::new("double_it", 1, |args| {
//!     Ok(args[0].as_i64().map(|v| SqliteValue::Integer(v * 2)))
//! })?);
//!
//! let mut conn = SqliteConnection::connect("sqlite::memory:").await?;
//! registry.install(&mut conn).await?;
//! let doubled: i64 = sqlx::query_scalar("SELECT double_it(21)").fetch_one(&mut conn).await?;
//! assert_eq!(doubled, 42);
//! # Ok(())
//! # }
//! ```

pub mod collation;
pub mod error;
pub mod function;
pub mod registry;
pub mod value;

pub use collation::{
   LOCALIZED, UNICODE, collation_key, hex_collation_key, localized_compare, unicode_compare,
};
pub use error::Error;
pub use function::{CustomFunction, FunctionCallback, register_function};
pub use registry::FunctionRegistry;
pub use value::SqliteValue;

pub type Result<T> = std::result::Result<T, Error>;
