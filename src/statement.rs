//! Precompiled statements with positional bindings

use crate::database::SqlCipherDatabase;
use crate::value::SqlValue;
use crate::{Error, Result};

/// A statement compiled once and executed any number of times.
///
/// Bindings are 1-based, like SQLite's, and stay in place across executions
/// until replaced or cleared. Unbound parameters execute as NULL.
pub struct CompiledStatement<'a> {
   db: &'a SqlCipherDatabase,
   sql: String,
   bind_args: Vec<SqlValue>,
}

impl<'a> CompiledStatement<'a> {
   pub(crate) fn new(db: &'a SqlCipherDatabase, sql: String, parameters: usize) -> Self {
      Self {
         db,
         sql,
         bind_args: vec![SqlValue::Null; parameters],
      }
   }

   pub fn sql(&self) -> &str {
      &self.sql
   }

   pub fn parameter_count(&self) -> usize {
      self.bind_args.len()
   }

   fn bind(&mut self, index: usize, value: SqlValue) -> Result<()> {
      let count = self.bind_args.len();
      if index == 0 || index > count {
         return Err(Error::IllegalArgument(format!(
            "Cannot bind argument at index {} because the index is out of range.  The statement has {} parameters.",
            index, count
         )));
      }
      self.bind_args[index - 1] = value;
      Ok(())
   }

   pub fn bind_null(&mut self, index: usize) -> Result<()> {
      self.bind(index, SqlValue::Null)
   }

   pub fn bind_long(&mut self, index: usize, value: i64) -> Result<()> {
      self.bind(index, SqlValue::Integer(value))
   }

   pub fn bind_double(&mut self, index: usize, value: f64) -> Result<()> {
      self.bind(index, SqlValue::Real(value))
   }

   pub fn bind_string(&mut self, index: usize, value: &str) -> Result<()> {
      self.bind(index, SqlValue::Text(value.to_string()))
   }

   pub fn bind_blob(&mut self, index: usize, value: &[u8]) -> Result<()> {
      self.bind(index, SqlValue::Blob(value.to_vec()))
   }

   /// Binds `args[i]` to parameter `i + 1`.
   pub fn bind_all_args_as_strings(&mut self, args: &[&str]) -> Result<()> {
      for (i, arg) in args.iter().enumerate() {
         self.bind_string(i + 1, arg)?;
      }
      Ok(())
   }

   /// Resets every binding to NULL.
   pub fn clear_bindings(&mut self) {
      self.bind_args.fill(SqlValue::Null);
   }

   /// Executes a statement that returns no rows.
   pub async fn execute(&self) -> Result<()> {
      self.db.execute_sql(self.sql.clone(), self.bind_args.clone()).await?;
      Ok(())
   }

   /// Executes an `INSERT` and returns the new row id, or -1 when no row was
   /// inserted.
   pub async fn execute_insert(&self) -> Result<i64> {
      let result = self.db.execute_sql(self.sql.clone(), self.bind_args.clone()).await?;
      Ok(if result.rows_affected() > 0 {
         result.last_insert_rowid()
      } else {
         -1
      })
   }

   /// Executes an `UPDATE` or `DELETE` and returns the number of rows changed.
   pub async fn execute_update_delete(&self) -> Result<u64> {
      let result = self.db.execute_sql(self.sql.clone(), self.bind_args.clone()).await?;
      Ok(result.rows_affected())
   }

   async fn first_value(&self) -> Result<SqlValue> {
      let mut cursor = self.db.query_sql(self.sql.clone(), self.bind_args.clone()).await?;
      if !cursor.move_to_first() || cursor.column_count() == 0 {
         return Err(Error::NoRows);
      }
      Ok(cursor.get_value(0)?.clone())
   }

   /// The first column of the first row as an integer.
   pub async fn simple_query_for_long(&self) -> Result<i64> {
      self.first_value().await?.as_long()
   }

   /// The first column of the first row as text; `None` for NULL.
   pub async fn simple_query_for_string(&self) -> Result<Option<String>> {
      self.first_value().await?.as_string()
   }

   pub async fn simple_query_for_blob(&self) -> Result<Option<Vec<u8>>> {
      self.first_value().await?.as_blob()
   }
}

impl std::fmt::Debug for CompiledStatement<'_> {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("CompiledStatement")
         .field("sql", &self.sql)
         .field("bind_args", &self.bind_args)
         .finish_non_exhaustive()
   }
}
