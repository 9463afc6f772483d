//! Per-connection setup run by the pools

use futures::future::BoxFuture;
use sqlx::sqlite::SqliteConnection;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Runs on every freshly opened connection, and again each time a reader is
/// taken from the reader pool.
///
/// Used to install application-defined SQL functions, which SQLite scopes to
/// a single connection.
pub type ConnectionInit =
   Arc<dyn for<'c> Fn(&'c mut SqliteConnection) -> BoxFuture<'c, Result<(), sqlx::Error>> + Send + Sync>;

/// A text comparison registered as a named collating sequence.
pub type Collation = Arc<dyn Fn(&str, &str) -> Ordering + Send + Sync>;

/// Connection setup shared by the primary and reader pools
#[derive(Clone, Default)]
pub struct ConnectionHooks {
   pub(crate) collations: Vec<(String, Collation)>,
   pub(crate) init: Option<ConnectionInit>,
}

impl ConnectionHooks {
   pub fn new() -> Self {
      Self::default()
   }

   /// Registers `compare` as collation `name` on every connection.
   pub fn with_collation<F>(mut self, name: impl Into<String>, compare: F) -> Self
   where
      F: Fn(&str, &str) -> Ordering + Send + Sync + 'static,
   {
      self.collations.push((name.into(), Arc::new(compare)));
      self
   }

   /// Sets the connection initialiser.
   pub fn with_init<F>(mut self, init: F) -> Self
   where
      F: for<'c> Fn(&'c mut SqliteConnection) -> BoxFuture<'c, Result<(), sqlx::Error>>
         + Send
         + Sync
         + 'static,
   {
      self.init = Some(Arc::new(init));
      self
   }
}

impl fmt::Debug for ConnectionHooks {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("ConnectionHooks")
         .field(
            "collations",
            &self.collations.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>(),
         )
         .field("init", &self.init.is_some())
         .finish()
   }
}
