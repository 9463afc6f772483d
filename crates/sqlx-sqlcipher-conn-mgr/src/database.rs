//! SQLite/SQLCipher database owning a primary connection and optional readers

use crate::Result;
use crate::cipher::CipherKey;
use crate::config::SqliteDatabaseConfig;
use crate::error::Error;
use crate::files::delete_database_files;
use crate::hooks::ConnectionHooks;
use crate::registry::{get_or_open_database, is_memory_database, release_database, uncache_database};
use crate::write_guard::{ReadGuard, WriteGuard};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{ConnectOptions, Connection, Pool, Sqlite};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, error};

/// An open database file (or private in-memory database).
///
/// Every database owns one **primary** connection, handed out exclusively by
/// [`acquire_writer`](Self::acquire_writer). It never idles out, so state that
/// SQLite scopes to a connection (attached databases, temp tables, an open
/// transaction, the contents of `:memory:`) survives for as long as the
/// database is open.
///
/// With `write_ahead_logging` enabled, a file-backed database also gets a pool
/// of read-only connections used by [`acquire_reader`](Self::acquire_reader).
/// Otherwise readers share the primary connection. Once the primary
/// connection holds state the readers cannot see, reads move back to it (see
/// [`keep_reads_on_primary`](Self::keep_reads_on_primary)).
///
/// # Example
///
/// ```no_run
/// use sqlx_sqlcipher_conn_mgr::{CipherKey, ConnectionHooks, SqliteDatabase};
///
/// # async fn example() -> Result<(), sqlx_sqlcipher_conn_mgr::Error> {
/// let key = CipherKey::from("correct horse battery staple");
/// let db = SqliteDatabase::connect("secure.db", None, Some(key), ConnectionHooks::default()).await?;
///
/// let mut writer = db.acquire_writer().await?;
/// sqlx::query("CREATE TABLE IF NOT EXISTS notes (body TEXT)")
///     .execute(&mut *writer)
///     .await?;
/// drop(writer);
///
/// db.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SqliteDatabase {
   /// Single-connection pool holding the primary read-write connection
   primary: Pool<Sqlite>,

   /// Read-only connections, present only for file-backed WAL databases
   readers: Option<Pool<Sqlite>>,

   config: SqliteDatabaseConfig,

   key: Option<CipherKey>,

   /// Set once `journal_mode = WAL` has been applied on the primary connection
   wal_initialized: AtomicBool,

   /// Set once reads must see the primary connection's attachments or temp
   /// tables
   reads_on_primary: AtomicBool,

   /// Handles returned by `connect` and not yet released
   handles: AtomicUsize,

   closed: AtomicBool,

   path: PathBuf,
}

impl SqliteDatabase {
   /// Connect to a database
   ///
   /// Connecting to a path that is already open with the same configuration
   /// and key returns the existing instance and counts one more handle on it.
   /// Different settings get a separate, uncached instance with their own
   /// connections, so a read-only or differently keyed caller never borrows
   /// another caller's connection. `:memory:` always opens a fresh, private
   /// database.
   ///
   /// # Arguments
   ///
   /// * `path` - Database file path, or `:memory:`
   /// * `config` - Pool and open-mode settings; `None` uses the defaults
   /// * `key` - Encryption key applied as the first pragma on every
   ///   connection. Ignored when the linked engine has no codec.
   /// * `hooks` - Collations and a per-connection initialiser
   ///
   /// # Errors
   ///
   /// Fails when the path is empty, when the file is missing and may not be
   /// created, or when the first page cannot be read (`SQLITE_NOTADB` for a
   /// wrong key or a file that is not a database). A failing initialiser
   /// reports [`Error::ConnectionInit`].
   pub async fn connect(
      path: impl AsRef<Path>,
      config: Option<SqliteDatabaseConfig>,
      key: Option<CipherKey>,
      hooks: ConnectionHooks,
   ) -> Result<Arc<Self>> {
      let config = config.unwrap_or_default();
      let path = path.as_ref();

      if path.as_os_str().is_empty() {
         return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Database path cannot be empty",
         )));
      }

      let path = path.to_path_buf();
      let requested = (config.clone(), key.clone());

      get_or_open_database(
         &path,
         |db| db.opened_with(&requested.0, requested.1.as_ref()),
         || Self::open(path.clone(), config, key, hooks),
      )
      .await
   }

   async fn open(
      path: PathBuf,
      config: SqliteDatabaseConfig,
      key: Option<CipherKey>,
      hooks: ConnectionHooks,
   ) -> Result<Self> {
      let memory = is_memory_database(&path);

      if !memory && !path.exists() && (config.read_only || !config.create_if_missing) {
         return Err(Error::DatabaseNotFound(path.display().to_string()));
      }

      let mut options = SqliteConnectOptions::new()
         .filename(&path)
         .create_if_missing(memory || (config.create_if_missing && !config.read_only))
         .read_only(config.read_only)
         .foreign_keys(false)
         .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
         .statement_cache_capacity(config.statement_cache_capacity);

      if let Some(key) = &key {
         options = options.pragma("key", key.pragma_value().to_string());
      }

      for (name, compare) in &hooks.collations {
         let compare = Arc::clone(compare);
         options = options.collation(name.clone(), move |a: &str, b: &str| compare(a, b));
      }

      // A failing `after_connect` makes the pool retry until its acquire
      // timeout, so the initialiser gets one standalone run first
      if let Some(init) = &hooks.init {
         let mut conn = options.connect().await?;
         let installed = init(&mut conn).await;
         if let Err(e) = conn.close().await {
            debug!("Closing the init check connection failed: {}", e);
         }
         installed.map_err(|e| Error::ConnectionInit(e.to_string()))?;
      }

      let mut primary_options = SqlitePoolOptions::new()
         .max_connections(1)
         .min_connections(1)
         .idle_timeout(None)
         .max_lifetime(None)
         .test_before_acquire(false);

      if let Some(init) = hooks.init.clone() {
         primary_options = primary_options.after_connect(move |conn, _meta| init(conn));
      }

      let primary = primary_options.connect_with(options.clone()).await?;

      // Reading the schema forces the first page through the codec, so a bad
      // key fails here rather than on the first application query.
      if let Err(e) = sqlx::query("SELECT count(*) FROM sqlite_master")
         .execute(&primary)
         .await
      {
         primary.close().await;
         return Err(e.into());
      }

      let readers = if config.write_ahead_logging && !memory {
         let mut reader_options = SqlitePoolOptions::new()
            .max_connections(config.max_read_connections.max(1))
            .min_connections(0)
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)));

         if let Some(init) = hooks.init.clone() {
            let reinit = Arc::clone(&init);
            reader_options = reader_options
               .after_connect(move |conn, _meta| init(conn))
               .before_acquire(move |conn, _meta| {
                  let installed = reinit(conn);
                  Box::pin(async move { installed.await.map(|()| true) })
               });
         }

         Some(reader_options.connect_lazy_with(options.read_only(true).create_if_missing(false)))
      } else {
         None
      };

      debug!(
         "Opened database {} (readers: {}, keyed: {})",
         path.display(),
         readers.is_some(),
         key.is_some()
      );

      Ok(Self {
         primary,
         readers,
         config,
         key,
         wal_initialized: AtomicBool::new(false),
         reads_on_primary: AtomicBool::new(false),
         handles: AtomicUsize::new(1),
         closed: AtomicBool::new(false),
         path,
      })
   }

   /// Acquire exclusive access to the primary connection
   ///
   /// Waits while another guard is alive. When write-ahead logging is
   /// configured, the first call switches the database to WAL mode.
   pub async fn acquire_writer(&self) -> Result<WriteGuard> {
      if self.is_closed() {
         return Err(Error::DatabaseClosed);
      }

      let mut conn = self.primary.acquire().await?;

      if self.wants_wal() && !self.wal_initialized.load(Ordering::SeqCst) {
         sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&mut *conn)
            .await?;

         // https://www.sqlite.org/wal.html#performance_considerations
         sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&mut *conn)
            .await?;

         self.wal_initialized.store(true, Ordering::SeqCst);
      }

      Ok(WriteGuard::new(conn))
   }

   /// Acquire a connection for read-only statements
   ///
   /// Do not call this while holding a [`WriteGuard`] on a database without a
   /// reader pool: both guards wait on the same connection.
   pub async fn acquire_reader(&self) -> Result<ReadGuard> {
      if self.is_closed() {
         return Err(Error::DatabaseClosed);
      }

      let conn = match &self.readers {
         Some(readers) if self.reads_from_pool() => readers.acquire().await?,
         _ => self.primary.acquire().await?,
      };
      Ok(ReadGuard::new(conn))
   }

   /// Whether this database has a separate reader pool
   pub fn has_readers(&self) -> bool {
      self.readers.is_some()
   }

   /// Whether [`acquire_reader`](Self::acquire_reader) currently hands out
   /// reader-pool connections
   pub fn reads_from_pool(&self) -> bool {
      self.readers.is_some()
         && self.wal_initialized.load(Ordering::SeqCst)
         && !self.reads_on_primary.load(Ordering::SeqCst)
   }

   /// Serve every later read from the primary connection
   ///
   /// Call this after attaching a database or creating a temp table on the
   /// primary connection: both are invisible to reader connections. There is
   /// no way back short of closing the database.
   pub fn keep_reads_on_primary(&self) {
      if self.readers.is_some() && !self.reads_on_primary.swap(true, Ordering::SeqCst) {
         debug!("Reads on {} now use the primary connection", self.path.display());
      }
   }

   /// Run pending sqlx migrations on the primary connection
   ///
   /// Applied migrations are recorded in `_sqlx_migrations`, so calling this
   /// repeatedly is safe.
   pub async fn run_migrations(&self, migrator: &Migrator) -> Result<()> {
      let mut writer = self.acquire_writer().await?;
      migrator.run(&mut *writer).await?;
      Ok(())
   }

   pub fn path(&self) -> &Path {
      &self.path
   }

   /// Lossy UTF-8 rendering of [`path`](Self::path)
   pub fn path_str(&self) -> String {
      self.path.to_string_lossy().into_owned()
   }

   pub fn config(&self) -> &SqliteDatabaseConfig {
      &self.config
   }

   pub fn is_memory(&self) -> bool {
      is_memory_database(&self.path)
   }

   pub fn is_read_only(&self) -> bool {
      self.config.read_only
   }

   pub fn is_closed(&self) -> bool {
      self.closed.load(Ordering::SeqCst)
   }

   fn opened_with(&self, config: &SqliteDatabaseConfig, key: Option<&CipherKey>) -> bool {
      self.config == *config && self.key.as_ref() == key
   }

   pub(crate) fn retain(&self) {
      self.handles.fetch_add(1, Ordering::SeqCst);
   }

   /// Drops one handle, returning whether none are left.
   pub(crate) fn drop_handle(&self) -> bool {
      let previous = self
         .handles
         .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
         .unwrap_or_else(|n| n);
      previous <= 1
   }

   pub(crate) fn mark_closed(&self) {
      self.closed.store(true, Ordering::SeqCst);
   }

   fn wants_wal(&self) -> bool {
      self.config.write_ahead_logging && !self.config.read_only && !self.is_memory()
   }

   /// Close the database and release its connections
   ///
   /// Waits for outstanding guards to be returned. Any other `Arc` to this
   /// database observes `Error::DatabaseClosed` afterwards.
   pub async fn close(self: Arc<Self>) -> Result<()> {
      self.mark_closed();
      uncache_database(&self.path).await;
      self.shutdown().await;
      Ok(())
   }

   /// Release one handle obtained from [`connect`](Self::connect)
   ///
   /// The database is closed, as by [`close`](Self::close), when the last
   /// handle is released or no other `Arc` to it remains. Returns whether
   /// this call closed it.
   pub async fn release(self: Arc<Self>) -> Result<bool> {
      if !release_database(&self).await {
         return Ok(false);
      }
      self.shutdown().await;
      Ok(true)
   }

   async fn shutdown(&self) {
      if let Some(readers) = &self.readers {
         readers.close().await;
      }

      // Flush and truncate the WAL so the main file is self-contained
      if self.wal_initialized.load(Ordering::SeqCst)
         && let Ok(mut conn) = self.primary.acquire().await
         && let Err(e) = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&mut *conn)
            .await
      {
         error!("WAL checkpoint failed while closing {}: {}", self.path.display(), e);
      }

      self.primary.close().await;
      debug!("Closed database {}", self.path.display());
   }

   /// Close the database and delete its files
   ///
   /// Removes the main file along with its journal, WAL and shared-memory
   /// files. Use with caution!
   pub async fn remove(self: Arc<Self>) -> Result<()> {
      let path = self.path.clone();
      self.close().await?;
      delete_database_files(&path);
      Ok(())
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use tempfile::TempDir;

   #[tokio::test]
   async fn test_missing_file_with_create_disabled() {
      let dir = TempDir::new().unwrap();
      let config = SqliteDatabaseConfig {
         create_if_missing: false,
         ..Default::default()
      };

      let result =
         SqliteDatabase::connect(dir.path().join("absent.db"), Some(config), None, ConnectionHooks::default())
            .await;

      assert!(matches!(result, Err(Error::DatabaseNotFound(_))));
   }

   #[tokio::test]
   async fn test_memory_database_keeps_contents_between_guards() {
      let db = SqliteDatabase::connect(":memory:", None, None, ConnectionHooks::default())
         .await
         .unwrap();

      let mut writer = db.acquire_writer().await.unwrap();
      sqlx::query("CREATE TABLE t (x INTEGER)")
         .execute(&mut *writer)
         .await
         .unwrap();
      drop(writer);

      let mut reader = db.acquire_reader().await.unwrap();
      let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM t")
         .fetch_one(&mut *reader)
         .await
         .unwrap();
      assert_eq!(count, 0);
      assert!(db.is_memory());
      assert!(!db.has_readers());
   }
}
