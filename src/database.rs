//! The database handle

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::future::BoxFuture;
use sqlx::sqlite::{SqliteConnection, SqliteQueryResult};
use sqlx::{Column, Connection, Executor, Row, Statement};
use sqlx_sqlcipher_conn_mgr::{
   ConnectionHooks, Migrator, SqliteDatabase, SqliteDatabaseConfig, WriteGuard, attach, cipher_version,
   delete_database_files, detach, has_codec, integrity_check, list_attached,
};
use sqlx_sqlcipher_functions::{
   CustomFunction, FunctionRegistry, LOCALIZED, SqliteValue, UNICODE, localized_compare,
   unicode_compare,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::builders::{ContentValuesBuilder, DeleteBuilder, QueryBuilder, UpdateBuilder};
use crate::content_values::ContentValues;
use crate::cursor::Cursor;
use crate::decode::decode_rows;
use crate::error_handler::DatabaseErrorHandler;
use crate::options::OpenOptions;
use crate::session::{Access, Session};
use crate::statement::CompiledStatement;
use crate::transactions::{NO_TRANSACTION, TransactionListener, TransactionMode};
use crate::value::{SqlValue, bind_value};
use crate::{Error, Result};

/// Upper bound accepted by [`SqlCipherDatabase::set_max_sql_cache_size`].
pub const MAX_SQL_CACHE_SIZE: usize = 100;

/// An open database, in the manner of Android's `SQLiteDatabase`.
///
/// Each handle is one session: statements run one at a time, and a
/// transaction begun on the handle holds the database's primary connection
/// until it ends, so every statement issued through the handle joins it.
/// Handles opened on the same file with the same options and key share their
/// connections; statements from another handle wait while a transaction is
/// open. A handle opened with different options or another key gets its own
/// connections.
///
/// With write-ahead logging, `SELECT` statements outside a transaction run on
/// reader connections until something attaches a database or creates a temp
/// table. From then on every statement uses the primary connection, which is
/// the only one that sees them.
///
/// Errors reporting a corrupt or undecryptable file are passed to the
/// configured [`DatabaseErrorHandler`] before being returned.
///
/// # Example
///
/// ```no_run
/// use sqlcipher_db::{ContentValues, SqlCipherDatabase};
///
/// # async fn example() -> sqlcipher_db::Result<()> {
/// let db = SqlCipherDatabase::open_or_create_database("notes.db").await?;
/// db.exec_sql("CREATE TABLE IF NOT EXISTS notes (_id INTEGER PRIMARY KEY, body TEXT)").await?;
///
/// let mut values = ContentValues::new();
/// values.put("body", "hello");
/// let id = db.insert("notes", values).await?;
///
/// let mut cursor = db.query("notes").selection("_id = ?", &[&id.to_string()]).await?;
/// while cursor.move_to_next() {
///    println!("{:?}", cursor.get_string(1)?);
/// }
/// db.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct SqlCipherDatabase {
   path: String,
   config: SqliteDatabaseConfig,
   memory: bool,
   readers: bool,
   session: Mutex<Session>,
   open: AtomicBool,
   functions: FunctionRegistry,
   error_handler: Arc<dyn DatabaseErrorHandler>,
   max_sql_cache_size: AtomicUsize,
   handling_corruption: AtomicBool,
}

/// Collations and functions installed on every connection of a database.
fn connection_hooks(functions: &FunctionRegistry) -> ConnectionHooks {
   let functions = functions.clone();
   ConnectionHooks::new()
      .with_collation(LOCALIZED, localized_compare)
      .with_collation(UNICODE, unicode_compare)
      .with_init(move |conn| {
         let functions = functions.clone();
         Box::pin(async move {
            functions.install(conn).await.map_err(|e| match e {
               sqlx_sqlcipher_functions::Error::Database(e) => e,
               other => sqlx::Error::Configuration(Box::new(other)),
            })
         })
      })
}

/// Strips trailing whitespace and semicolons, which SQLite would otherwise
/// treat as empty statements.
pub(crate) fn trim_statement(sql: &str) -> &str {
   sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}

fn first_keyword(sql: &str) -> &str {
   sql.trim_start().split(|c: char| !c.is_ascii_alphabetic()).next().unwrap_or("")
}

/// `SELECT` statements may run on a reader connection.
pub(crate) fn statement_access(sql: &str) -> Access {
   if first_keyword(sql).eq_ignore_ascii_case("SELECT") {
      Access::Read
   } else {
      Access::Write
   }
}

/// Statements leaving state on the primary connection that reader
/// connections cannot see.
pub(crate) fn creates_connection_state(sql: &str) -> bool {
   let keyword = first_keyword(sql);
   if keyword.eq_ignore_ascii_case("ATTACH") {
      return true;
   }
   let mut words = sql.split_whitespace().skip(1);
   keyword.eq_ignore_ascii_case("CREATE")
      && words
         .next()
         .is_some_and(|w| w.eq_ignore_ascii_case("TEMP") || w.eq_ignore_ascii_case("TEMPORARY"))
}

/// Statements after which cached statements may report stale columns.
pub(crate) fn is_schema_change(sql: &str) -> bool {
   let keyword = first_keyword(sql);
   ["CREATE", "ALTER", "DROP"].iter().any(|k| keyword.eq_ignore_ascii_case(k))
}

async fn rollback_quietly(writer: &mut WriteGuard) {
   if let Err(e) = sqlx::query("ROLLBACK;").execute(&mut **writer).await {
      warn!("ROLLBACK failed: {}", e);
   }
}

impl SqlCipherDatabase {
   /// Opens the database at `path`, creating it if needed, with default
   /// options. Use `":memory:"` for a private in-memory database.
   pub async fn open_or_create_database(path: impl AsRef<Path>) -> Result<Self> {
      Self::open(path, OpenOptions::default()).await
   }

   /// Opens the database at `path`.
   ///
   /// Opening a file that is already open through another handle with the
   /// same configuration and key shares that handle's connections. Otherwise
   /// the new handle opens connections of its own, so its read-only mode and
   /// key take effect.
   pub async fn open(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
      let path = path.as_ref();
      let OpenOptions {
         config,
         key,
         error_handler,
         functions: initial_functions,
      } = options;

      let functions = FunctionRegistry::new();
      for function in initial_functions {
         functions.add(function);
      }

      let db =
         SqliteDatabase::connect(path, Some(config.clone()), key, connection_hooks(&functions)).await?;

      // A database already opened by another handle was set up with that
      // handle's functions.
      if !functions.is_empty() {
         let installed = match db.acquire_writer().await {
            Ok(mut writer) => functions.install(&mut writer).await.map_err(Error::from),
            Err(e) => Err(e.into()),
         };
         if let Err(e) = installed {
            db.release().await?;
            return Err(e);
         }
      }

      let path = path.to_string_lossy().into_owned();
      debug!("Opened database {} (readers: {})", path, db.has_readers());

      Ok(Self {
         memory: db.is_memory(),
         readers: db.has_readers(),
         session: Mutex::new(Session::new(db, path.clone(), functions.clone())),
         max_sql_cache_size: AtomicUsize::new(config.statement_cache_capacity.min(MAX_SQL_CACHE_SIZE)),
         path,
         config,
         open: AtomicBool::new(true),
         functions,
         error_handler,
         handling_corruption: AtomicBool::new(false),
      })
   }

   pub fn path(&self) -> &str {
      &self.path
   }

   pub fn is_open(&self) -> bool {
      self.open.load(Ordering::SeqCst)
   }

   pub fn is_read_only(&self) -> bool {
      self.config.read_only
   }

   pub fn is_in_memory(&self) -> bool {
      self.memory
   }

   /// Whether the linked engine encrypts pages (SQLCipher).
   pub fn has_codec() -> bool {
      has_codec()
   }

   /// Deletes a database file and its journal, WAL and shared-memory files.
   ///
   /// Returns whether anything was deleted. Close every handle first.
   pub fn delete_database(path: impl AsRef<Path>) -> bool {
      delete_database_files(path)
   }

   /// Closes the handle.
   ///
   /// An open transaction is rolled back. The connections are released once
   /// every handle on the same database has been closed. Closing twice is a
   /// no-op.
   pub async fn close(&self) -> Result<()> {
      let db = {
         let mut session = self.session.lock().await;
         if let Some(mut writer) = session.writer.take() {
            warn!(
               "Closing {} with {} open transaction(s), rolling back",
               self.path,
               session.transactions.depth()
            );
            rollback_quietly(&mut writer).await;
         }
         session.transactions.clear();
         session.db.take()
      };

      self.open.store(false, Ordering::SeqCst);

      let Some(db) = db else {
         return Ok(());
      };
      if db.release().await? {
         debug!("Closed database {}", self.path);
      } else {
         debug!("Closed database handle {}, other handles remain", self.path);
      }
      Ok(())
   }

   /// Passes corruption errors to the error handler. A handler that hits
   /// corruption again while recovering is not re-entered.
   async fn checked<T>(&self, result: Result<T>) -> Result<T> {
      match result {
         Err(error) if error.is_corruption() => {
            if !self.handling_corruption.swap(true, Ordering::SeqCst) {
               self.error_handler.on_corruption(self, &error).await;
               self.handling_corruption.store(false, Ordering::SeqCst);
            }
            Err(error)
         }
         other => other,
      }
   }

   async fn run_on_connection<T, F>(&self, access: Access, op: F) -> Result<T>
   where
      F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>>,
   {
      let mut session = self.session.lock().await;
      let mut conn = session.lease(access).await?;
      op(&mut *conn).await
   }

   /// Runs `op` on the handle's connection for `access`, then reports
   /// corruption.
   pub(crate) async fn with_connection<T, F>(&self, access: Access, op: F) -> Result<T>
   where
      T: Send + 'static,
      F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>> + Send,
   {
      let result = self.run_on_connection(access, op).await;
      self.checked(result).await
   }

   /// Routes later reads to the primary connection.
   async fn keep_reads_on_primary(&self) {
      if !self.readers {
         return;
      }
      if let Some(db) = self.session.lock().await.db.as_ref() {
         db.keep_reads_on_primary();
      }
   }

   fn statement_caching(&self) -> bool {
      self.max_sql_cache_size.load(Ordering::SeqCst) > 0
   }

   /// Executes a statement, discarding any rows.
   pub(crate) async fn execute_sql(&self, sql: String, args: Vec<SqlValue>) -> Result<SqliteQueryResult> {
      let persistent = self.statement_caching();
      let pins_reads = creates_connection_state(&sql);
      let result = self
         .with_connection(Access::Write, move |conn| {
            Box::pin(async move {
               let mut query = sqlx::query(trim_statement(&sql)).persistent(persistent);
               for arg in args {
                  query = bind_value(query, arg);
               }
               let result = query.execute(&mut *conn).await?;

               // Cached statements keep the column list they were prepared
               // with, even after SQLite recompiles them
               if is_schema_change(&sql) {
                  conn.clear_cached_statements().await?;
               }
               Ok(result)
            })
         })
         .await?;

      if pins_reads {
         self.keep_reads_on_primary().await;
      }
      Ok(result)
   }

   /// Runs a query and collects its rows into a [`Cursor`].
   pub(crate) async fn query_sql(&self, sql: String, args: Vec<SqlValue>) -> Result<Cursor> {
      let access = statement_access(&sql);
      // Reader connections never see the cache eviction of a schema change
      let persistent = self.statement_caching() && !(access == Access::Read && self.readers);
      let pins_reads = creates_connection_state(&sql);
      let cursor = self
         .with_connection(access, move |conn| {
            Box::pin(async move {
               let sql = trim_statement(&sql);

               let mut query = sqlx::query(sql).persistent(persistent);
               for arg in args {
                  query = bind_value(query, arg);
               }
               let rows = query.fetch_all(&mut *conn).await?;

               // An empty result still reports its columns
               let columns: Vec<String> = match rows.first() {
                  Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
                  None => {
                     let statement = conn.prepare(sql).await?;
                     statement.columns().iter().map(|c| c.name().to_string()).collect()
                  }
               };
               Ok(Cursor::new(columns, decode_rows(rows)?))
            })
         })
         .await?;

      if pins_reads {
         self.keep_reads_on_primary().await;
      }
      Ok(cursor)
   }

   /// Executes a single SQL statement that returns no data.
   ///
   /// Trailing semicolons are ignored.
   pub async fn exec_sql(&self, sql: &str) -> Result<()> {
      self.execute_sql(sql.to_string(), Vec::new()).await?;
      Ok(())
   }

   /// Executes a single SQL statement with positional `?` arguments.
   pub async fn exec_sql_with_args(&self, sql: &str, args: Vec<SqlValue>) -> Result<()> {
      self.execute_sql(sql.to_string(), args).await?;
      Ok(())
   }

   /// Runs `sql` with string arguments bound to its `?` placeholders.
   pub async fn raw_query(&self, sql: &str, selection_args: &[&str]) -> Result<Cursor> {
      let args = selection_args.iter().map(|&a| SqlValue::from(a)).collect();
      self.query_sql(sql.to_string(), args).await
   }

   /// Starts a `SELECT` on `table`.
   pub fn query(&self, table: &str) -> QueryBuilder<'_> {
      QueryBuilder::new(self, table)
   }

   /// Starts an `INSERT` of `values` into `table`; resolves to the new row
   /// id, or -1 when no row was inserted.
   pub fn insert(&self, table: &str, values: ContentValues) -> ContentValuesBuilder<'_> {
      ContentValuesBuilder::insert(self, table, values)
   }

   /// Starts an `INSERT OR REPLACE` of `values` into `table`.
   pub fn replace(&self, table: &str, values: ContentValues) -> ContentValuesBuilder<'_> {
      ContentValuesBuilder::replace(self, table, values)
   }

   /// Starts an `UPDATE` of `table`; resolves to the number of rows changed.
   pub fn update(&self, table: &str, values: ContentValues) -> UpdateBuilder<'_> {
      UpdateBuilder::new(self, table, values)
   }

   /// Starts a `DELETE` from `table`; resolves to the number of rows deleted.
   pub fn delete(&self, table: &str) -> DeleteBuilder<'_> {
      DeleteBuilder::new(self, table)
   }

   /// Compiles `sql` into a reusable statement.
   ///
   /// Syntax errors and unknown tables are reported here rather than at
   /// execution.
   pub async fn compile_statement(&self, sql: &str) -> Result<CompiledStatement<'_>> {
      let sql = trim_statement(sql).to_string();
      let prepared = sql.clone();
      let parameters = self
         .with_connection(statement_access(&sql), move |conn| {
            Box::pin(async move {
               let statement = conn.prepare(&prepared).await?;
               Ok(match statement.parameters() {
                  Some(sqlx::Either::Right(count)) => count,
                  Some(sqlx::Either::Left(types)) => types.len(),
                  None => 0,
               })
            })
         })
         .await?;
      Ok(CompiledStatement::new(self, sql, parameters))
   }

   /// The schema version stored in `PRAGMA user_version`.
   pub async fn version(&self) -> Result<i64> {
      self
         .with_connection(Access::Write, |conn| {
            Box::pin(async move {
               Ok(sqlx::query_scalar::<_, i64>("PRAGMA user_version;").fetch_one(conn).await?)
            })
         })
         .await
   }

   pub async fn set_version(&self, version: i64) -> Result<()> {
      self.exec_sql(&format!("PRAGMA user_version = {};", version)).await
   }

   pub fn max_sql_cache_size(&self) -> usize {
      self.max_sql_cache_size.load(Ordering::SeqCst)
   }

   /// Sets how many compiled statements the handle keeps for reuse.
   ///
   /// Shrinking the cache evicts the statements cached on the primary
   /// connection; 0 turns caching off for statements run afterwards.
   pub async fn set_max_sql_cache_size(&self, size: usize) -> Result<()> {
      if size > MAX_SQL_CACHE_SIZE {
         return Err(Error::IllegalState(format!(
            "expected value between 0 and {}",
            MAX_SQL_CACHE_SIZE
         )));
      }

      let previous = self.max_sql_cache_size.swap(size, Ordering::SeqCst);
      if size < previous {
         self
            .with_connection(Access::Write, |conn| {
               Box::pin(async move { Ok(conn.clear_cached_statements().await?) })
            })
            .await?;
      }
      Ok(())
   }

   /// Registers a scalar SQL function callable as `name(...)`.
   ///
   /// The callback's return value becomes the SQL result; returning
   /// `Ok(None)` yields NULL and `Err(message)` fails the statement.
   pub async fn add_custom_function<F>(&self, name: &str, num_args: i32, callback: F) -> Result<()>
   where
      F: Fn(&[SqliteValue]) -> std::result::Result<Option<SqliteValue>, String> + Send + Sync + 'static,
   {
      self.functions.add(CustomFunction::new(name, num_args, callback)?);

      let functions = self.functions.clone();
      self
         .with_connection(Access::Write, move |conn| {
            Box::pin(async move { Ok(functions.install(conn).await?) })
         })
         .await
   }

   /// `(schema, file)` for the main database and every attached database,
   /// or `None` once the handle is closed.
   pub async fn attached_dbs(&self) -> Result<Option<Vec<(String, String)>>> {
      if !self.is_open() {
         return Ok(None);
      }

      let attached = self
         .with_connection(Access::Write, |conn| {
            Box::pin(async move { Ok(list_attached(conn).await?) })
         })
         .await;

      match attached {
         Ok(attached) => Ok(Some(attached.into_iter().map(|a| (a.name, a.file)).collect())),
         Err(e) if e.is_closed() => Ok(None),
         Err(e) => Err(e),
      }
   }

   /// Attaches the database file at `path` as `schema`.
   ///
   /// An encrypted main database shares its key with the attachment. With
   /// write-ahead logging, reads use the primary connection from now on.
   pub async fn attach_database(&self, path: &str, schema: &str) -> Result<()> {
      let path = path.to_string();
      let schema = schema.to_string();
      self
         .with_connection(Access::Write, move |conn| {
            Box::pin(async move { Ok(attach(conn, &path, &schema, None).await?) })
         })
         .await?;
      self.keep_reads_on_primary().await;
      Ok(())
   }

   pub async fn detach_database(&self, schema: &str) -> Result<()> {
      let schema = schema.to_string();
      self
         .with_connection(Access::Write, move |conn| {
            Box::pin(async move { Ok(detach(conn, &schema).await?) })
         })
         .await
   }

   /// Runs `PRAGMA integrity_check` over the main and attached databases.
   pub async fn is_database_integrity_ok(&self) -> Result<bool> {
      self
         .with_connection(Access::Write, |conn| {
            Box::pin(async move { Ok(integrity_check(conn).await?) })
         })
         .await
   }

   /// SQLCipher version, `None` when the engine is plain SQLite.
   pub async fn cipher_version(&self) -> Result<Option<String>> {
      self
         .with_connection(Access::Write, |conn| {
            Box::pin(async move { Ok(cipher_version(conn).await?) })
         })
         .await
   }

   /// Applies pending sqlx migrations on the primary connection.
   pub async fn run_migrations(&self, migrator: &Migrator) -> Result<()> {
      let result = self.run_migrations_unchecked(migrator).await;
      self.checked(result).await
   }

   async fn run_migrations_unchecked(&self, migrator: &Migrator) -> Result<()> {
      let session = self.session.lock().await;
      if session.writer.is_some() {
         return Err(Error::IllegalState(
            "Cannot run migrations while a transaction is open.".to_string(),
         ));
      }
      let db = Arc::clone(session.database()?);
      drop(session);

      db.run_migrations(migrator).await?;
      db.acquire_writer().await?.clear_cached_statements().await?;
      Ok(())
   }

   /// Begins an `EXCLUSIVE` transaction.
   ///
   /// Transactions nest. End each with [`end_transaction`](Self::end_transaction),
   /// after [`set_transaction_successful`](Self::set_transaction_successful)
   /// to commit. If any nested transaction ends without being marked
   /// successful, the whole transaction rolls back.
   pub async fn begin_transaction(&self) -> Result<()> {
      self.begin(TransactionMode::Exclusive, None).await
   }

   /// Begins an `IMMEDIATE` transaction.
   pub async fn begin_transaction_non_exclusive(&self) -> Result<()> {
      self.begin(TransactionMode::Immediate, None).await
   }

   /// Begins a `DEFERRED` transaction.
   pub async fn begin_transaction_deferred(&self) -> Result<()> {
      self.begin(TransactionMode::Deferred, None).await
   }

   /// Begins an `EXCLUSIVE` transaction whose lifecycle is reported to
   /// `listener`.
   pub async fn begin_transaction_with_listener(&self, listener: Arc<dyn TransactionListener>) -> Result<()> {
      self.begin(TransactionMode::Exclusive, Some(listener)).await
   }

   async fn begin(&self, mode: TransactionMode, listener: Option<Arc<dyn TransactionListener>>) -> Result<()> {
      let result = self.begin_unchecked(mode, listener).await;
      self.checked(result).await
   }

   async fn begin_unchecked(
      &self,
      mode: TransactionMode,
      listener: Option<Arc<dyn TransactionListener>>,
   ) -> Result<()> {
      let mut session = self.session.lock().await;
      session.transactions.check_can_begin()?;
      session.database()?;

      let outermost = session.transactions.is_empty();
      if outermost {
         let writer = session.pin_writer().await?;
         if let Err(e) = sqlx::query(mode.begin_sql()).execute(&mut **writer).await {
            session.writer = None;
            return Err(e.into());
         }
         debug!("Began {:?} transaction on {}", mode, self.path);
      }

      session.transactions.push(listener.clone());

      if let Some(listener) = listener
         && let Err(e) = listener.on_begin()
      {
         session.transactions.discard_top();
         if outermost && let Some(mut writer) = session.writer.take() {
            rollback_quietly(&mut writer).await;
         }
         return Err(e);
      }
      Ok(())
   }

   /// Marks the current transaction as successful.
   ///
   /// Do no more database work before [`end_transaction`](Self::end_transaction);
   /// beginning another nested transaction now is an error.
   pub async fn set_transaction_successful(&self) -> Result<()> {
      self.session.lock().await.transactions.mark_successful()
   }

   /// Ends the current transaction.
   ///
   /// The outermost end commits when every frame was marked successful and
   /// rolls back otherwise, then releases the primary connection. A failed
   /// `COMMIT` is rolled back and its error returned.
   pub async fn end_transaction(&self) -> Result<()> {
      let result = self.end_unchecked().await;
      self.checked(result).await
   }

   async fn end_unchecked(&self) -> Result<()> {
      let mut session = self.session.lock().await;
      let frame = session.transactions.end()?;

      let mut successful = frame.successful;
      let mut listener_error = None;
      if let Some(listener) = &frame.listener {
         let outcome = if successful {
            listener.on_commit()
         } else {
            listener.on_rollback()
         };
         if let Err(e) = outcome {
            listener_error = Some(e);
            successful = false;
         }
      }

      if !frame.outermost {
         session.transactions.child_finished(successful);
      } else {
         let mut writer = session
            .writer
            .take()
            .ok_or_else(|| Error::IllegalState(NO_TRANSACTION.to_string()))?;

         if successful {
            if let Err(e) = sqlx::query("COMMIT;").execute(&mut *writer).await {
               rollback_quietly(&mut writer).await;
               return Err(e.into());
            }
            debug!("Committed transaction on {}", self.path);
         } else {
            sqlx::query("ROLLBACK;").execute(&mut *writer).await?;
            debug!("Rolled back transaction on {}", self.path);
         }
      }

      match listener_error {
         Some(e) => Err(e),
         None => Ok(()),
      }
   }

   pub async fn in_transaction(&self) -> bool {
      !self.session.lock().await.transactions.is_empty()
   }

   /// Number of nested transactions currently open on the handle.
   pub async fn transaction_depth(&self) -> usize {
      self.session.lock().await.transactions.depth()
   }

   /// Whether the handle holds the primary connection for a transaction.
   pub async fn is_db_locked(&self) -> bool {
      self.session.lock().await.writer.is_some()
   }
}

impl std::fmt::Debug for SqlCipherDatabase {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("SqlCipherDatabase")
         .field("path", &self.path)
         .field("open", &self.is_open())
         .field("functions", &self.functions.len())
         .finish_non_exhaustive()
   }
}
