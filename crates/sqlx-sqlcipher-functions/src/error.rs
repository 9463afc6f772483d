//! Error types for the sqlx-sqlcipher-functions crate.

/// Errors that can occur while defining or installing SQL functions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// The function name is empty or not a plain identifier.
   #[error("Invalid function name '{0}'")]
   InvalidName(String),

   /// SQLite accepts between -1 (variadic) and 127 arguments.
   #[error("Invalid argument count {0} (expected -1..=127)")]
   InvalidArgumentCount(i32),

   /// `sqlite3_create_function_v2` rejected the function.
   #[error("Failed to register function '{name}': SQLite error {code}")]
   Registration { name: String, code: i32 },

   /// Could not reach the raw connection handle.
   #[error("Database error: {0}")]
   Database(#[from] sqlx::Error),
}
