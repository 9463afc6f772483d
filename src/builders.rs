//! Builders for table queries, inserts, updates and deletes

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::LazyLock;

use regex::Regex;

use crate::content_values::ContentValues;
use crate::cursor::Cursor;
use crate::database::SqlCipherDatabase;
use crate::value::SqlValue;
use crate::{Error, Result};

static LIMIT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
   Regex::new(r"^\s*\d+\s*(,\s*\d+\s*)?$").unwrap_or_else(|e| panic!("invalid LIMIT pattern: {e}"))
});

/// How `INSERT` and `UPDATE` resolve a constraint violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictAlgorithm {
   /// Use the conflict clause of the table definition, `ABORT` by default.
   #[default]
   None,
   Rollback,
   Abort,
   Fail,
   Ignore,
   Replace,
}

impl ConflictAlgorithm {
   fn clause(self) -> &'static str {
      match self {
         ConflictAlgorithm::None => "",
         ConflictAlgorithm::Rollback => " OR ROLLBACK",
         ConflictAlgorithm::Abort => " OR ABORT",
         ConflictAlgorithm::Fail => " OR FAIL",
         ConflictAlgorithm::Ignore => " OR IGNORE",
         ConflictAlgorithm::Replace => " OR REPLACE",
      }
   }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
   value.filter(|v| !v.is_empty())
}

fn string_args(args: &[&str]) -> Vec<SqlValue> {
   args.iter().map(|&a| SqlValue::from(a)).collect()
}

/// Builds a `SELECT` statement.
///
/// Empty clauses are left out. `HAVING` requires `GROUP BY`, and `LIMIT`
/// must be `n` or `offset, n`.
#[allow(clippy::too_many_arguments)]
pub fn build_query_string(
   distinct: bool,
   tables: &str,
   columns: &[String],
   selection: Option<&str>,
   group_by: Option<&str>,
   having: Option<&str>,
   order_by: Option<&str>,
   limit: Option<&str>,
) -> Result<String> {
   let (selection, group_by, having, order_by, limit) = (
      non_empty(selection),
      non_empty(group_by),
      non_empty(having),
      non_empty(order_by),
      non_empty(limit),
   );

   if group_by.is_none() && having.is_some() {
      return Err(Error::IllegalArgument(
         "HAVING clauses are only permitted when using a groupBy clause".to_string(),
      ));
   }
   if let Some(limit) = limit
      && !LIMIT_PATTERN.is_match(limit)
   {
      return Err(Error::IllegalArgument(format!("invalid LIMIT clauses:{}", limit)));
   }

   let mut query = String::with_capacity(120);
   query.push_str("SELECT ");
   if distinct {
      query.push_str("DISTINCT ");
   }
   if columns.is_empty() {
      query.push_str("* ");
   } else {
      query.push_str(&columns.join(", "));
      query.push(' ');
   }
   query.push_str("FROM ");
   query.push_str(tables);

   for (keyword, clause) in [
      (" WHERE ", selection),
      (" GROUP BY ", group_by),
      (" HAVING ", having),
      (" ORDER BY ", order_by),
      (" LIMIT ", limit),
   ] {
      if let Some(clause) = clause {
         query.push_str(keyword);
         query.push_str(clause);
      }
   }

   Ok(query)
}

/// Builds an `INSERT` statement and its arguments.
///
/// With no values, `null_column_hack` names a nullable column to insert
/// NULL into, since SQLite cannot insert a completely empty row.
pub fn build_insert(
   table: &str,
   values: ContentValues,
   null_column_hack: Option<&str>,
   conflict: ConflictAlgorithm,
) -> Result<(String, Vec<SqlValue>)> {
   let mut sql = format!("INSERT{} INTO {}(", conflict.clause(), table);

   if values.is_empty() {
      let Some(column) = non_empty(null_column_hack) else {
         return Err(Error::IllegalArgument(
            "Empty values without a null column hack".to_string(),
         ));
      };
      sql.push_str(column);
      sql.push_str(") VALUES (NULL)");
      return Ok((sql, Vec::new()));
   }

   let mut args = Vec::with_capacity(values.len());
   let mut columns = Vec::with_capacity(values.len());
   for (column, value) in values {
      columns.push(column);
      args.push(value);
   }
   sql.push_str(&columns.join(","));
   sql.push_str(") VALUES (");
   sql.push_str(&vec!["?"; args.len()].join(","));
   sql.push(')');
   Ok((sql, args))
}

/// Builds an `UPDATE` statement; the `SET` values bind before the
/// selection arguments.
pub fn build_update(
   table: &str,
   values: ContentValues,
   selection: Option<&str>,
   selection_args: Vec<SqlValue>,
   conflict: ConflictAlgorithm,
) -> Result<(String, Vec<SqlValue>)> {
   if values.is_empty() {
      return Err(Error::IllegalArgument("Empty values".to_string()));
   }

   let mut sql = format!("UPDATE{} {} SET ", conflict.clause(), table);
   let mut args = Vec::with_capacity(values.len() + selection_args.len());
   let mut assignments = Vec::with_capacity(values.len());
   for (column, value) in values {
      assignments.push(format!("{}=?", column));
      args.push(value);
   }
   sql.push_str(&assignments.join(","));

   if let Some(selection) = non_empty(selection) {
      sql.push_str(" WHERE ");
      sql.push_str(selection);
   }
   args.extend(selection_args);
   Ok((sql, args))
}

pub fn build_delete(table: &str, selection: Option<&str>) -> String {
   match non_empty(selection) {
      Some(selection) => format!("DELETE FROM {} WHERE {}", table, selection),
      None => format!("DELETE FROM {}", table),
   }
}

/// Builder for `SELECT` queries on one table
pub struct QueryBuilder<'a> {
   db: &'a SqlCipherDatabase,
   table: String,
   distinct: bool,
   columns: Vec<String>,
   selection: Option<String>,
   selection_args: Vec<SqlValue>,
   group_by: Option<String>,
   having: Option<String>,
   order_by: Option<String>,
   limit: Option<String>,
}

impl<'a> QueryBuilder<'a> {
   pub(crate) fn new(db: &'a SqlCipherDatabase, table: &str) -> Self {
      Self {
         db,
         table: table.to_string(),
         distinct: false,
         columns: Vec::new(),
         selection: None,
         selection_args: Vec::new(),
         group_by: None,
         having: None,
         order_by: None,
         limit: None,
      }
   }

   /// Return only distinct rows
   pub fn distinct(mut self) -> Self {
      self.distinct = true;
      self
   }

   /// Columns or expressions to return; all columns when never called
   pub fn columns(mut self, columns: &[&str]) -> Self {
      self.columns = columns.iter().map(|c| c.to_string()).collect();
      self
   }

   /// `WHERE` clause with string arguments for its `?` placeholders
   pub fn selection(mut self, selection: &str, args: &[&str]) -> Self {
      self.selection = Some(selection.to_string());
      self.selection_args = string_args(args);
      self
   }

   pub fn group_by(mut self, group_by: &str) -> Self {
      self.group_by = Some(group_by.to_string());
      self
   }

   pub fn having(mut self, having: &str) -> Self {
      self.having = Some(having.to_string());
      self
   }

   pub fn order_by(mut self, order_by: &str) -> Self {
      self.order_by = Some(order_by.to_string());
      self
   }

   /// `n` or `offset, n`
   pub fn limit(mut self, limit: &str) -> Self {
      self.limit = Some(limit.to_string());
      self
   }

   /// The SQL this builder runs
   pub fn to_sql(&self) -> Result<String> {
      build_query_string(
         self.distinct,
         &self.table,
         &self.columns,
         self.selection.as_deref(),
         self.group_by.as_deref(),
         self.having.as_deref(),
         self.order_by.as_deref(),
         self.limit.as_deref(),
      )
   }

   /// Execute the query and collect the matching rows
   pub async fn execute(self) -> Result<Cursor> {
      let sql = self.to_sql()?;
      self.db.query_sql(sql, self.selection_args).await
   }
}

impl<'a> IntoFuture for QueryBuilder<'a> {
   type Output = Result<Cursor>;
   type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send + 'a>>;

   fn into_future(self) -> Self::IntoFuture {
      Box::pin(self.execute())
   }
}

/// Builder for `INSERT` and `REPLACE`
pub struct ContentValuesBuilder<'a> {
   db: &'a SqlCipherDatabase,
   table: String,
   values: ContentValues,
   null_column_hack: Option<String>,
   conflict: ConflictAlgorithm,
}

impl<'a> ContentValuesBuilder<'a> {
   pub(crate) fn insert(db: &'a SqlCipherDatabase, table: &str, values: ContentValues) -> Self {
      Self {
         db,
         table: table.to_string(),
         values,
         null_column_hack: None,
         conflict: ConflictAlgorithm::None,
      }
   }

   pub(crate) fn replace(db: &'a SqlCipherDatabase, table: &str, values: ContentValues) -> Self {
      Self::insert(db, table, values).on_conflict(ConflictAlgorithm::Replace)
   }

   /// Nullable column to set to NULL when `values` is empty
   pub fn null_column_hack(mut self, column: &str) -> Self {
      self.null_column_hack = Some(column.to_string());
      self
   }

   pub fn on_conflict(mut self, conflict: ConflictAlgorithm) -> Self {
      self.conflict = conflict;
      self
   }

   /// Execute the insert and return the new row id, or -1 when the row was
   /// skipped (e.g. by `OR IGNORE`)
   pub async fn execute(self) -> Result<i64> {
      let (sql, args) = build_insert(
         &self.table,
         self.values,
         self.null_column_hack.as_deref(),
         self.conflict,
      )?;
      let result = self.db.execute_sql(sql, args).await?;
      if result.rows_affected() > 0 {
         Ok(result.last_insert_rowid())
      } else {
         Ok(-1)
      }
   }
}

impl<'a> IntoFuture for ContentValuesBuilder<'a> {
   type Output = Result<i64>;
   type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send + 'a>>;

   fn into_future(self) -> Self::IntoFuture {
      Box::pin(self.execute())
   }
}

/// Builder for `UPDATE`
pub struct UpdateBuilder<'a> {
   db: &'a SqlCipherDatabase,
   table: String,
   values: ContentValues,
   selection: Option<String>,
   selection_args: Vec<SqlValue>,
   conflict: ConflictAlgorithm,
}

impl<'a> UpdateBuilder<'a> {
   pub(crate) fn new(db: &'a SqlCipherDatabase, table: &str, values: ContentValues) -> Self {
      Self {
         db,
         table: table.to_string(),
         values,
         selection: None,
         selection_args: Vec::new(),
         conflict: ConflictAlgorithm::None,
      }
   }

   /// `WHERE` clause; every row is updated when never called
   pub fn selection(mut self, selection: &str, args: &[&str]) -> Self {
      self.selection = Some(selection.to_string());
      self.selection_args = string_args(args);
      self
   }

   pub fn on_conflict(mut self, conflict: ConflictAlgorithm) -> Self {
      self.conflict = conflict;
      self
   }

   /// Execute the update and return the number of rows changed
   pub async fn execute(self) -> Result<u64> {
      let (sql, args) = build_update(
         &self.table,
         self.values,
         self.selection.as_deref(),
         self.selection_args,
         self.conflict,
      )?;
      Ok(self.db.execute_sql(sql, args).await?.rows_affected())
   }
}

impl<'a> IntoFuture for UpdateBuilder<'a> {
   type Output = Result<u64>;
   type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send + 'a>>;

   fn into_future(self) -> Self::IntoFuture {
      Box::pin(self.execute())
   }
}

/// Builder for `DELETE`
pub struct DeleteBuilder<'a> {
   db: &'a SqlCipherDatabase,
   table: String,
   selection: Option<String>,
   selection_args: Vec<SqlValue>,
}

impl<'a> DeleteBuilder<'a> {
   pub(crate) fn new(db: &'a SqlCipherDatabase, table: &str) -> Self {
      Self {
         db,
         table: table.to_string(),
         selection: None,
         selection_args: Vec::new(),
      }
   }

   /// `WHERE` clause; every row is deleted when never called
   pub fn selection(mut self, selection: &str, args: &[&str]) -> Self {
      self.selection = Some(selection.to_string());
      self.selection_args = string_args(args);
      self
   }

   /// Execute the delete and return the number of rows removed
   pub async fn execute(self) -> Result<u64> {
      let sql = build_delete(&self.table, self.selection.as_deref());
      Ok(self.db.execute_sql(sql, self.selection_args).await?.rows_affected())
   }
}

impl<'a> IntoFuture for DeleteBuilder<'a> {
   type Output = Result<u64>;
   type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send + 'a>>;

   fn into_future(self) -> Self::IntoFuture {
      Box::pin(self.execute())
   }
}
