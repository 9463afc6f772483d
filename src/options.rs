//! Settings applied when a database is opened

use std::fmt;
use std::sync::Arc;

use sqlx_sqlcipher_conn_mgr::{CipherKey, SqliteDatabaseConfig};
use sqlx_sqlcipher_functions::{CustomFunction, SqliteValue};

use crate::Result;
use crate::error_handler::{DatabaseErrorHandler, DefaultDatabaseErrorHandler};

/// Builder for [`SqlCipherDatabase::open`](crate::SqlCipherDatabase::open).
///
/// ```no_run
/// use sqlcipher_db::{OpenOptions, SqlCipherDatabase};
///
/// # async fn example() -> sqlcipher_db::Result<()> {
/// let options = OpenOptions::new()
///    .key("correct horse battery staple")
///    .write_ahead_logging(true);
/// let db = SqlCipherDatabase::open("notes.db", options).await?;
/// # db.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct OpenOptions {
   pub(crate) config: SqliteDatabaseConfig,
   pub(crate) key: Option<CipherKey>,
   pub(crate) error_handler: Arc<dyn DatabaseErrorHandler>,
   pub(crate) functions: Vec<CustomFunction>,
}

impl Default for OpenOptions {
   fn default() -> Self {
      Self {
         config: SqliteDatabaseConfig::default(),
         key: None,
         error_handler: Arc::new(DefaultDatabaseErrorHandler),
         functions: Vec::new(),
      }
   }
}

impl OpenOptions {
   pub fn new() -> Self {
      Self::default()
   }

   /// Replaces the whole connection configuration.
   pub fn config(mut self, config: SqliteDatabaseConfig) -> Self {
      self.config = config;
      self
   }

   /// Key for an encrypted database.
   pub fn key(mut self, key: impl Into<CipherKey>) -> Self {
      self.key = Some(key.into());
      self
   }

   pub fn read_only(mut self, read_only: bool) -> Self {
      self.config.read_only = read_only;
      self
   }

   pub fn create_if_missing(mut self, create: bool) -> Self {
      self.config.create_if_missing = create;
      self
   }

   pub fn write_ahead_logging(mut self, enabled: bool) -> Self {
      self.config.write_ahead_logging = enabled;
      self
   }

   /// Handler called when the database reports corruption. Defaults to
   /// [`DefaultDatabaseErrorHandler`].
   pub fn error_handler(mut self, handler: impl DatabaseErrorHandler + 'static) -> Self {
      self.error_handler = Arc::new(handler);
      self
   }

   /// Registers a scalar SQL function on every connection of the database.
   pub fn function<F>(mut self, name: &str, num_args: i32, callback: F) -> Result<Self>
   where
      F: Fn(&[SqliteValue]) -> std::result::Result<Option<SqliteValue>, String> + Send + Sync + 'static,
   {
      self.functions.push(CustomFunction::new(name, num_args, callback)?);
      Ok(self)
   }
}

impl fmt::Debug for OpenOptions {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("OpenOptions")
         .field("config", &self.config)
         .field("key", &self.key)
         .field("functions", &self.functions)
         .finish_non_exhaustive()
   }
}
