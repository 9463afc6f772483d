//! # sqlcipher-db
//!
//! An Android-style database API over SQLCipher (or plain SQLite) built on
//! sqlx.
//!
//! ## Core Types
//!
//! - **[`SqlCipherDatabase`]**: An open database handle with nested transactions
//! - **[`OpenOptions`]**: Key, open mode, error handler and functions used at open
//! - **[`Cursor`]**: A fully read result set with row positioning and typed getters
//! - **[`ContentValues`]**: Ordered column/value pairs for inserts and updates
//! - **[`CompiledStatement`]**: A reusable statement with 1-based bindings
//! - **[`DatabaseErrorHandler`]**: Called when the engine reports corruption;
//!   [`DefaultDatabaseErrorHandler`] deletes the damaged files
//! - **[`Error`]**: Error type for every operation
//!
//! ## Usage
//!
//! ```no_run
//! use sqlcipher_db::{ContentValues, OpenOptions, SqlCipherDatabase};
//!
//! # async fn example() -> sqlcipher_db::Result<()> {
//! let db = SqlCipherDatabase::open("app.db", OpenOptions::new().key("secret")).await?;
//! db.exec_sql("CREATE TABLE IF NOT EXISTS t (_id INTEGER PRIMARY KEY, data TEXT)").await?;
//!
//! db.begin_transaction().await?;
//! let mut values = ContentValues::new();
//! values.put("data", "first");
//! db.insert("t", values).await?;
//! db.set_transaction_successful().await?;
//! db.end_transaction().await?;
//!
//! let mut cursor = db.query("t").columns(&["data"]).order_by("_id").await?;
//! while cursor.move_to_next() {
//!    println!("{:?}", cursor.get_string(0)?);
//! }
//! db.close().await?;
//! # Ok(())
//! # }
//! ```

mod builders;
mod content_values;
mod cursor;
mod database;
mod decode;
mod error;
mod error_handler;
mod options;
mod session;
mod statement;
mod transactions;
mod value;

pub use builders::{
   ConflictAlgorithm, ContentValuesBuilder, DeleteBuilder, QueryBuilder, UpdateBuilder,
   build_query_string,
};
pub use content_values::ContentValues;
pub use cursor::{CharArrayBuffer, Cursor, FieldType};
pub use database::{MAX_SQL_CACHE_SIZE, SqlCipherDatabase};
pub use decode::to_value;
pub use error::{Error, Result, SQLITE_CORRUPT, SQLITE_NOTADB};
pub use error_handler::{DatabaseErrorHandler, DefaultDatabaseErrorHandler};
pub use options::OpenOptions;
pub use statement::CompiledStatement;
pub use transactions::{TransactionListener, TransactionMode};
pub use value::SqlValue;

pub use sqlx_sqlcipher_conn_mgr::{CipherKey, Migrator, SqliteDatabaseConfig};
pub use sqlx_sqlcipher_functions::SqliteValue;
