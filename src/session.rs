//! Connection ownership for one database handle

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use sqlx::sqlite::SqliteConnection;
use sqlx_sqlcipher_conn_mgr::{ReadGuard, SqliteDatabase, WriteGuard};
use sqlx_sqlcipher_functions::FunctionRegistry;

use crate::transactions::TransactionStack;
use crate::{Error, Result};

/// What a statement needs from its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
   Read,
   Write,
}

/// The connection a statement runs on
pub(crate) enum ConnectionLease<'a> {
   /// The primary connection held by an open transaction
   Pinned(&'a mut WriteGuard),
   Writer(WriteGuard),
   Reader(ReadGuard),
}

impl Deref for ConnectionLease<'_> {
   type Target = SqliteConnection;

   fn deref(&self) -> &Self::Target {
      match self {
         Self::Pinned(w) => w,
         Self::Writer(w) => w,
         Self::Reader(r) => r,
      }
   }
}

impl DerefMut for ConnectionLease<'_> {
   fn deref_mut(&mut self) -> &mut Self::Target {
      match self {
         Self::Pinned(w) => w,
         Self::Writer(w) => w,
         Self::Reader(r) => r,
      }
   }
}

/// State guarded by a handle's session lock.
///
/// While a transaction is open the primary connection stays in `writer`, so
/// every statement of the handle joins the transaction and other handles on
/// the same database wait for it to finish.
pub(crate) struct Session {
   pub(crate) db: Option<Arc<SqliteDatabase>>,
   pub(crate) writer: Option<WriteGuard>,
   pub(crate) transactions: TransactionStack,
   path: String,
   functions: FunctionRegistry,
}

impl Session {
   pub(crate) fn new(db: Arc<SqliteDatabase>, path: String, functions: FunctionRegistry) -> Self {
      Self {
         db: Some(db),
         writer: None,
         transactions: TransactionStack::default(),
         path,
         functions,
      }
   }

   pub(crate) fn database(&self) -> Result<&Arc<SqliteDatabase>> {
      self.db.as_ref().ok_or_else(|| Error::DatabaseClosed(self.path.clone()))
   }

   /// The connection for the next statement.
   ///
   /// Inside a transaction this is always the pinned primary connection.
   pub(crate) async fn lease(&mut self, access: Access) -> Result<ConnectionLease<'_>> {
      if let Some(writer) = self.writer.as_mut() {
         return Ok(ConnectionLease::Pinned(writer));
      }

      let db = self.db.as_ref().ok_or_else(|| Error::DatabaseClosed(self.path.clone()))?;
      match access {
         Access::Write => Ok(ConnectionLease::Writer(db.acquire_writer().await?)),
         Access::Read => {
            let mut reader = db.acquire_reader().await?;
            // Readers may come from a pool opened by another handle
            if db.reads_from_pool() {
               self.functions.install(&mut reader).await?;
            }
            Ok(ConnectionLease::Reader(reader))
         }
      }
   }

   /// Takes the primary connection for a new outermost transaction.
   pub(crate) async fn pin_writer(&mut self) -> Result<&mut WriteGuard> {
      let writer = self.database()?.acquire_writer().await?;
      Ok(self.writer.insert(writer))
   }
}
