/// Result type alias for database operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `SQLITE_CORRUPT`
pub const SQLITE_CORRUPT: i32 = 11;

/// `SQLITE_NOTADB`, also reported by SQLCipher when the key is wrong.
pub const SQLITE_NOTADB: i32 = 26;

/// Error types for database, cursor and statement operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Error from SQLx operations, including every error reported by the engine.
   #[error(transparent)]
   Sqlx(#[from] sqlx::Error),

   /// Error from the connection manager.
   #[error(transparent)]
   ConnectionManager(#[from] sqlx_sqlcipher_conn_mgr::Error),

   /// Error defining or installing an application-defined function.
   #[error(transparent)]
   Function(#[from] sqlx_sqlcipher_functions::Error),

   /// The call is not valid in the current state, e.g. ending a transaction
   /// that was never begun.
   #[error("{0}")]
   IllegalState(String),

   /// An argument is out of range or malformed.
   #[error("{0}")]
   IllegalArgument(String),

   /// The database handle has been closed.
   #[error("attempt to re-open an already-closed object: {0}")]
   DatabaseClosed(String),

   /// The cursor has been closed.
   #[error("cursor is closed")]
   CursorClosed,

   /// The cursor is not positioned on a row.
   #[error("Index {index} requested, with a size of {count}")]
   CursorIndexOutOfBounds { index: i64, count: usize },

   /// The column index is outside the result set.
   #[error("column index {index} out of range, {count} columns")]
   ColumnIndexOutOfBounds { index: usize, count: usize },

   /// A single-value query produced no rows.
   #[error("query returned no rows")]
   NoRows,

   /// A stored value cannot be converted to the requested type.
   #[error("unsupported datatype: {0}")]
   UnsupportedDatatype(String),

   /// A transaction listener rejected the transaction.
   #[error("transaction listener failed: {0}")]
   Listener(String),

   /// I/O error when accessing database files.
   #[error("io error: {0}")]
   Io(#[from] std::io::Error),
}

impl Error {
   /// Extract a structured error code from the error type.
   ///
   /// This provides machine-readable error codes for error handling.
   pub fn error_code(&self) -> String {
      match self {
         Error::Sqlx(e) => {
            if let Some(code) = e.as_database_error().and_then(|db_err| db_err.code()) {
               return format!("SQLITE_{}", code);
            }
            "SQLX_ERROR".to_string()
         }
         Error::ConnectionManager(sqlx_sqlcipher_conn_mgr::Error::Sqlx(e)) => {
            Error::sqlx_code(e).unwrap_or_else(|| "CONNECTION_ERROR".to_string())
         }
         Error::ConnectionManager(sqlx_sqlcipher_conn_mgr::Error::DatabaseClosed) => {
            "DATABASE_CLOSED".to_string()
         }
         Error::ConnectionManager(_) => "CONNECTION_ERROR".to_string(),
         Error::Function(_) => "FUNCTION_ERROR".to_string(),
         Error::IllegalState(_) => "ILLEGAL_STATE".to_string(),
         Error::IllegalArgument(_) => "ILLEGAL_ARGUMENT".to_string(),
         Error::DatabaseClosed(_) => "DATABASE_CLOSED".to_string(),
         Error::CursorClosed => "CURSOR_CLOSED".to_string(),
         Error::CursorIndexOutOfBounds { .. } => "CURSOR_INDEX_OUT_OF_BOUNDS".to_string(),
         Error::ColumnIndexOutOfBounds { .. } => "COLUMN_INDEX_OUT_OF_BOUNDS".to_string(),
         Error::NoRows => "NO_ROWS".to_string(),
         Error::UnsupportedDatatype(_) => "UNSUPPORTED_DATATYPE".to_string(),
         Error::Listener(_) => "LISTENER_ERROR".to_string(),
         Error::Io(_) => "IO_ERROR".to_string(),
      }
   }

   fn sqlx_code(e: &sqlx::Error) -> Option<String> {
      e.as_database_error()
         .and_then(|db_err| db_err.code())
         .map(|code| format!("SQLITE_{}", code))
   }

   /// Primary SQLite result code carried by this error, if any.
   pub fn sqlite_code(&self) -> Option<i32> {
      match self {
         Error::Sqlx(e) => sqlx_sqlcipher_conn_mgr::sqlite_code(e),
         Error::ConnectionManager(e) => e.sqlite_code(),
         Error::Function(sqlx_sqlcipher_functions::Error::Database(e)) => {
            sqlx_sqlcipher_conn_mgr::sqlite_code(e)
         }
         _ => None,
      }
   }

   /// Whether the engine reported a damaged or undecryptable database file.
   pub fn is_corruption(&self) -> bool {
      matches!(self.sqlite_code(), Some(SQLITE_CORRUPT | SQLITE_NOTADB))
   }

   /// Whether the handle, or the database behind it, was already closed.
   pub fn is_closed(&self) -> bool {
      matches!(
         self,
         Error::DatabaseClosed(_) | Error::ConnectionManager(sqlx_sqlcipher_conn_mgr::Error::DatabaseClosed)
      )
   }
}
