//! RAII guards over pooled connections

use sqlx::Sqlite;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqliteConnection;
use std::ops::{Deref, DerefMut};

/// Exclusive access to the primary connection
///
/// The primary pool holds exactly one connection, so only one `WriteGuard`
/// exists at a time and every holder sees the same attached databases, temp
/// tables and open transaction. The connection returns to the pool on drop.
///
/// # Example
///
/// ```no_run
/// use sqlx_sqlcipher_conn_mgr::{ConnectionHooks, SqliteDatabase};
///
/// # async fn example() -> Result<(), sqlx_sqlcipher_conn_mgr::Error> {
/// let db = SqliteDatabase::connect("test.db", None, None, ConnectionHooks::default()).await?;
/// let mut writer = db.acquire_writer().await?;
/// sqlx::query("INSERT INTO users (name) VALUES (?)")
///     .bind("Alice")
///     .execute(&mut *writer)
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct WriteGuard {
   conn: PoolConnection<Sqlite>,
}

impl WriteGuard {
   pub(crate) fn new(conn: PoolConnection<Sqlite>) -> Self {
      Self { conn }
   }
}

impl Deref for WriteGuard {
   type Target = SqliteConnection;

   fn deref(&self) -> &Self::Target {
      &self.conn
   }
}

impl DerefMut for WriteGuard {
   fn deref_mut(&mut self) -> &mut Self::Target {
      &mut self.conn
   }
}

/// A connection for statements that do not modify the database
///
/// Comes from the reader pool when write-ahead logging is enabled, and is
/// the primary connection otherwise.
#[derive(Debug)]
pub struct ReadGuard {
   conn: PoolConnection<Sqlite>,
}

impl ReadGuard {
   pub(crate) fn new(conn: PoolConnection<Sqlite>) -> Self {
      Self { conn }
   }
}

impl Deref for ReadGuard {
   type Target = SqliteConnection;

   fn deref(&self) -> &Self::Target {
      &self.conn
   }
}

impl DerefMut for ReadGuard {
   fn deref_mut(&mut self) -> &mut Self::Target {
      &mut self.conn
   }
}
