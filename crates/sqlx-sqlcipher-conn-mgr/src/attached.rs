//! Attaching additional database files to a connection
//!
//! Attachments live on a single connection. Use them on the primary
//! connection (see [`SqliteDatabase::acquire_writer`]) so they stay visible for
//! as long as the database is open.
//!
//! [`SqliteDatabase::acquire_writer`]: crate::SqliteDatabase::acquire_writer

use crate::Result;
use crate::cipher::CipherKey;
use crate::error::Error;
use sqlx::sqlite::SqliteConnection;

/// One row of `PRAGMA database_list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedDatabase {
   pub seq: i64,
   /// Schema name (`main`, `temp`, or the name given to `ATTACH`)
   pub name: String,
   /// Absolute file path; empty for in-memory and temp databases
   pub file: String,
}

/// Validates that a schema name is a plain SQLite identifier
///
/// A valid schema name is non-empty, contains only ASCII alphanumerics and
/// underscores, and does not start with a digit. Such a name cannot end a
/// statement, open a comment or break out of a string literal, so it is safe
/// to splice into `ATTACH`/`DETACH` text.
pub fn is_valid_schema_name(name: &str) -> bool {
   match name.chars().next() {
      Some(first) => {
         !first.is_ascii_digit() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
      }
      None => false,
   }
}

fn check_schema_name(schema: &str) -> Result<()> {
   if !is_valid_schema_name(schema) {
      return Err(Error::InvalidSchemaName(schema.to_string()));
   }
   if schema.eq_ignore_ascii_case("main") || schema.eq_ignore_ascii_case("temp") {
      return Err(Error::ReservedSchemaName(schema.to_string()));
   }
   Ok(())
}

/// Attaches the database at `path` under `schema`.
///
/// Without a `key` an encrypted main database shares its key with the
/// attachment. Pass an explicit key to open a file keyed differently; an empty
/// passphrase attaches a plaintext database.
pub async fn attach(
   conn: &mut SqliteConnection,
   path: &str,
   schema: &str,
   key: Option<&CipherKey>,
) -> Result<()> {
   check_schema_name(schema)?;

   let escaped_path = path.replace('\'', "''");
   let sql = match key {
      Some(key) => format!(
         "ATTACH DATABASE '{}' AS {} KEY {}",
         escaped_path,
         schema,
         key.pragma_value().as_str()
      ),
      None => format!("ATTACH DATABASE '{}' AS {}", escaped_path, schema),
   };
   sqlx::query(&sql).execute(&mut *conn).await?;
   Ok(())
}

/// Detaches the database attached under `schema`.
pub async fn detach(conn: &mut SqliteConnection, schema: &str) -> Result<()> {
   check_schema_name(schema)?;
   sqlx::query(&format!("DETACH DATABASE {}", schema))
      .execute(&mut *conn)
      .await?;
   Ok(())
}

/// Lists every database visible on `conn`, `main` first.
pub async fn list_attached(conn: &mut SqliteConnection) -> Result<Vec<AttachedDatabase>> {
   let rows: Vec<(i64, String, Option<String>)> = sqlx::query_as("PRAGMA database_list")
      .fetch_all(&mut *conn)
      .await?;

   Ok(rows
      .into_iter()
      .map(|(seq, name, file)| AttachedDatabase {
         seq,
         name,
         file: file.unwrap_or_default(),
      })
      .collect())
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_valid_schema_names() {
      assert!(is_valid_schema_name("other"));
      assert!(is_valid_schema_name("_logs2"));
      assert!(is_valid_schema_name("A_b_C"));
   }

   #[test]
   fn test_invalid_schema_names() {
      assert!(!is_valid_schema_name(""));
      assert!(!is_valid_schema_name("2fast"));
      assert!(!is_valid_schema_name("x; DROP TABLE t"));
      assert!(!is_valid_schema_name("a-b"));
      assert!(!is_valid_schema_name("x'--"));
      assert!(!is_valid_schema_name("naïve"));
   }

   #[test]
   fn test_reserved_schema_names() {
      assert!(matches!(check_schema_name("main"), Err(Error::ReservedSchemaName(_))));
      assert!(matches!(check_schema_name("TEMP"), Err(Error::ReservedSchemaName(_))));
      assert!(check_schema_name("aux1").is_ok());
   }
}
