//! Configuration for SQLCipher database connections

use serde::{Deserialize, Serialize};

/// Configuration for SqliteDatabase connections
///
/// # Examples
///
/// ```
/// use sqlx_sqlcipher_conn_mgr::SqliteDatabaseConfig;
///
/// // Use defaults
/// let config = SqliteDatabaseConfig::default();
///
/// // Override just a few fields
/// let config = SqliteDatabaseConfig {
///     write_ahead_logging: true,
///     max_read_connections: 3,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteDatabaseConfig {
   /// Maximum number of concurrent read connections
   ///
   /// Only used when `write_ahead_logging` is enabled for a file-backed
   /// database. Without WAL every statement runs on the primary connection.
   ///
   /// Default: 6
   pub max_read_connections: u32,

   /// Idle timeout for read connections (in seconds)
   ///
   /// The primary connection never idles out: attached databases, temp tables
   /// and in-memory contents live on it for as long as the database is open.
   ///
   /// Default: 30
   pub idle_timeout_secs: u64,

   /// Number of prepared statements cached per connection
   ///
   /// Default: 25
   pub statement_cache_capacity: usize,

   /// Open the database read-only
   ///
   /// Default: false
   pub read_only: bool,

   /// Create the database file when it does not exist
   ///
   /// Default: true
   pub create_if_missing: bool,

   /// Switch the database to WAL journal mode on first write and serve
   /// reads outside transactions from a pool of read-only connections
   ///
   /// Default: false
   pub write_ahead_logging: bool,

   /// How long a connection waits on a locked database before failing
   ///
   /// Default: 5000
   pub busy_timeout_ms: u64,
}

impl Default for SqliteDatabaseConfig {
   fn default() -> Self {
      Self {
         max_read_connections: 6,
         idle_timeout_secs: 30,
         statement_cache_capacity: 25,
         read_only: false,
         create_if_missing: true,
         write_ahead_logging: false,
         busy_timeout_ms: 5000,
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_partial_config_deserializes_with_defaults() {
      let config: SqliteDatabaseConfig =
         serde_json::from_str(r#"{"write_ahead_logging": true}"#).unwrap();
      assert!(config.write_ahead_logging);
      assert_eq!(config.max_read_connections, 6);
      assert_eq!(config.statement_cache_capacity, 25);
      assert!(config.create_if_missing);
   }
}
