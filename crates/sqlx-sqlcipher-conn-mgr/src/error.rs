//! Error types for sqlx-sqlcipher-conn-mgr

use thiserror::Error;

/// Errors that may occur when working with sqlx-sqlcipher-conn-mgr
#[derive(Error, Debug)]
pub enum Error {
   /// IO error when accessing database files. Standard library IO errors
   /// are converted to this variant.
   #[error("IO error: {0}")]
   Io(#[from] std::io::Error),

   /// Error from the sqlx library. Standard sqlx errors are converted to this variant
   #[error("Sqlx error: {0}")]
   Sqlx(#[from] sqlx::Error),

   /// Migration error from the sqlx migrate framework
   #[error("Migration error: {0}")]
   Migration(#[from] sqlx::migrate::MigrateError),

   /// Database has been closed and cannot be used
   #[error("Database has been closed")]
   DatabaseClosed,

   /// The database file does not exist and the configuration forbids creating it
   #[error("Database file '{0}' does not exist")]
   DatabaseNotFound(String),

   /// Invalid schema name provided for attached database
   #[error(
      "Invalid schema name '{0}': must contain only alphanumeric characters and underscores, and cannot start with a digit"
   )]
   InvalidSchemaName(String),

   /// The schema name is reserved by SQLite (`main` and `temp`)
   #[error("Schema name '{0}' is reserved")]
   ReservedSchemaName(String),

   /// A connection initialiser (e.g. custom function installation) failed
   #[error("Connection initialisation failed: {0}")]
   ConnectionInit(String),
}

impl Error {
   /// Returns the SQLite primary result code carried by this error, if any.
   ///
   /// Extended result codes are reduced to their primary code (the low byte),
   /// so `SQLITE_CORRUPT_VTAB` reports as `SQLITE_CORRUPT`.
   pub fn sqlite_code(&self) -> Option<i32> {
      match self {
         Error::Sqlx(e) => sqlite_code(e),
         _ => None,
      }
   }
}

/// Extracts the primary SQLite result code from a sqlx error.
pub fn sqlite_code(error: &sqlx::Error) -> Option<i32> {
   error
      .as_database_error()
      .and_then(|db_err| db_err.code())
      .and_then(|code| code.parse::<i32>().ok())
      .map(|code| code & 0xff)
}
