//! Shared set of functions installed on every connection of a database.

use std::sync::Arc;

use libsqlite3_sys::sqlite3;
use parking_lot::RwLock;
use sqlx::sqlite::SqliteConnection;
use tracing::trace;

use crate::function::{CustomFunction, register_function};

/// Functions to install on each connection of a database.
///
/// Cloning is cheap and clones share state, so a registry can be captured by
/// pool connection callbacks and still see functions added later.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
   functions: Arc<RwLock<Vec<CustomFunction>>>,
}

impl FunctionRegistry {
   pub fn new() -> Self {
      Self::default()
   }

   /// Adds `function`, replacing one with the same name and argument count.
   pub fn add(&self, function: CustomFunction) {
      let mut functions = self.functions.write();
      if let Some(existing) = functions.iter_mut().find(|f| f.same_signature(&function)) {
         *existing = function;
      } else {
         functions.push(function);
      }
   }

   /// Snapshot of the registered functions, in registration order.
   pub fn functions(&self) -> Vec<CustomFunction> {
      self.functions.read().clone()
   }

   pub fn len(&self) -> usize {
      self.functions.read().len()
   }

   pub fn is_empty(&self) -> bool {
      self.functions.read().is_empty()
   }

   /// Registers every function on `conn`.
   ///
   /// Safe to call repeatedly: re-registering a function replaces the
   /// previous definition on that connection.
   pub async fn install(&self, conn: &mut SqliteConnection) -> crate::Result<()> {
      // Snapshot before awaiting; the lock guard is not Send.
      let functions = self.functions();
      if functions.is_empty() {
         return Ok(());
      }

      let mut handle = conn.lock_handle().await?;
      let db: *mut sqlite3 = handle.as_raw_handle().as_ptr();

      for function in &functions {
         // SAFETY: db comes from the locked handle, which we hold exclusively
         // until the end of this scope.
         unsafe { register_function(db, function)? };
      }

      trace!("Installed {} SQL function(s)", functions.len());
      Ok(())
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::SqliteValue;

   fn constant(v: i64) -> impl Fn(&[SqliteValue]) -> Result<Option<SqliteValue>, String> {
      move |_| Ok(Some(SqliteValue::Integer(v)))
   }

   #[test]
   fn test_add_replaces_same_signature() {
      let registry = FunctionRegistry::new();
      registry.add(CustomFunction::new("answer", 0, constant(1)).unwrap());
      registry.add(CustomFunction::new("answer", 1, constant(2)).unwrap());
      registry.add(CustomFunction::new("ANSWER", 0, constant(3)).unwrap());

      let functions = registry.functions();
      assert_eq!(functions.len(), 2);
      assert_eq!(functions[0].call(&[]), Ok(Some(SqliteValue::Integer(3))));
   }

   #[test]
   fn test_clones_share_functions() {
      let registry = FunctionRegistry::new();
      let captured = registry.clone();
      registry.add(CustomFunction::new("later", 0, constant(0)).unwrap());
      assert_eq!(captured.len(), 1);
      assert!(!captured.is_empty());
   }
}
