//! SQLCipher keying and codec introspection.
//!
//! # Keying flow
//!
//! SQLCipher encrypts every page of the main database (and, by default, every
//! attached database) transparently. Once a connection is keyed, SQL sees
//! plaintext and the pager layer does the rest.
//!
//! 1. **Open** -- the connection opens the file. The header is opaque until
//!    a key is supplied.
//! 2. **Key** -- `PRAGMA key` is the first statement run on every new
//!    connection. sqlx keeps the `key` pragma at the front of its pragma list
//!    for exactly this reason.
//! 3. **Verify** -- the first page read fails with `SQLITE_NOTADB` when the
//!    key is wrong. The connection manager touches `sqlite_master` right
//!    after connecting so the failure surfaces at open time.
//!
//! Without the `sqlcipher` cargo feature the linked engine is plain SQLite,
//! which ignores `PRAGMA key`; [`has_codec`] reports which engine is linked.

use std::fmt;

use libsqlite3_sys::sqlite3_compileoption_used;
use sqlx::sqlite::SqliteConnection;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::Result;

/// Key material used to unlock an encrypted database.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub enum CipherKey {
   /// A passphrase, run through SQLCipher's KDF.
   Passphrase(String),
   /// A raw 256-bit key, used as-is (no KDF).
   Raw([u8; 32]),
}

impl CipherKey {
   /// Renders the right-hand side of `PRAGMA key = ...`.
   ///
   /// Passphrases become quoted string literals. Raw keys use SQLCipher's
   /// blob-literal syntax `"x'<64 hex chars>'"`, which skips key derivation.
   pub fn pragma_value(&self) -> Zeroizing<String> {
      match self {
         CipherKey::Passphrase(passphrase) => {
            Zeroizing::new(format!("'{}'", passphrase.replace('\'', "''")))
         }
         CipherKey::Raw(bytes) => {
            let key_hex = Zeroizing::new(hex::encode(bytes));
            Zeroizing::new(format!("\"x'{}'\"", key_hex.as_str()))
         }
      }
   }
}

impl fmt::Debug for CipherKey {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         CipherKey::Passphrase(_) => f.write_str("CipherKey::Passphrase(<redacted>)"),
         CipherKey::Raw(_) => f.write_str("CipherKey::Raw(<redacted>)"),
      }
   }
}

impl From<&str> for CipherKey {
   fn from(passphrase: &str) -> Self {
      CipherKey::Passphrase(passphrase.to_string())
   }
}

impl From<[u8; 32]> for CipherKey {
   fn from(bytes: [u8; 32]) -> Self {
      CipherKey::Raw(bytes)
   }
}

/// Returns whether the linked engine was built with a page codec.
///
/// SQLCipher builds define `SQLITE_HAS_CODEC`. When this is `true`, a
/// corruption report may just mean the wrong key was supplied, so callers
/// should not treat the database files as disposable.
pub fn has_codec() -> bool {
   // SAFETY: the option name is a valid NUL-terminated string and
   // sqlite3_compileoption_used only reads it.
   unsafe { sqlite3_compileoption_used(c"HAS_CODEC".as_ptr()) == 1 }
}

/// Returns the SQLCipher version reported by the connection, or `None` when
/// the linked engine is plain SQLite.
pub async fn cipher_version(conn: &mut SqliteConnection) -> Result<Option<String>> {
   let version: Option<String> = sqlx::query_scalar("PRAGMA cipher_version")
      .fetch_optional(&mut *conn)
      .await?;
   Ok(version.filter(|v| !v.is_empty()))
}

/// Runs `PRAGMA integrity_check` and returns whether every attached database
/// reported `ok`.
pub async fn integrity_check(conn: &mut SqliteConnection) -> Result<bool> {
   let results: Vec<String> = sqlx::query_scalar("PRAGMA integrity_check")
      .fetch_all(&mut *conn)
      .await?;
   Ok(!results.is_empty() && results.iter().all(|r| r.trim() == "ok"))
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_passphrase_pragma_is_quoted() {
      let key = CipherKey::from("it's secret");
      assert_eq!(key.pragma_value().as_str(), "'it''s secret'");
   }

   #[test]
   fn test_raw_key_pragma_is_blob_literal() {
      let key = CipherKey::from([0xab; 32]);
      let value = key.pragma_value();
      assert!(value.starts_with("\"x'abab"));
      assert!(value.ends_with("'\""));
      assert_eq!(value.len(), 64 + 5);
   }

   #[test]
   fn test_debug_redacts_key_material() {
      let key = CipherKey::from("hunter2");
      assert!(!format!("{:?}", key).contains("hunter2"));
   }

   #[cfg(not(feature = "sqlcipher"))]
   #[test]
   fn test_plain_sqlite_has_no_codec() {
      assert!(!has_codec());
   }
}
