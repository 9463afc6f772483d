//! # sqlx-sqlcipher-conn-mgr
//!
//! A thin wrapper around SQLx that owns the connections of an encrypted (or
//! plain) SQLite database for a mobile or desktop application.
//!
//! ## Core Types
//!
//! - **[`SqliteDatabase`]**: An open database with its primary connection and optional readers
//! - **[`SqliteDatabaseConfig`]**: Pool and open-mode settings
//! - **[`CipherKey`]**: Passphrase or raw key for SQLCipher, zeroized on drop
//! - **[`ConnectionHooks`]**: Collations and an initialiser run on every connection
//! - **[`WriteGuard`]** / **[`ReadGuard`]**: RAII guards over pooled connections
//! - **[`Migrator`]**: Re-exported from sqlx for running database migrations
//! - **[`Error`]**: Error type for database operations
//!
//! ## Architecture
//!
//! - **Primary connection**: A single read-write connection that never idles out
//! - **Keying**: `PRAGMA key` is the first statement on every connection
//! - **Optional readers**: With WAL enabled, read-only connections serve reads
//!   until the primary connection gains attachments or temp tables
//! - **Handles**: `connect` counts handles per instance; `release` closes the
//!   database with the last one
//! - **File lifecycle**: [`delete_database_files`] removes a database and its sidecars
//!
//! ## Usage
//!
//! ```no_run
//! use sqlx_sqlcipher_conn_mgr::{ConnectionHooks, SqliteDatabase, attach, list_attached};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> sqlx_sqlcipher_conn_mgr::Result<()> {
//!     let db = SqliteDatabase::connect("example.db", None, None, ConnectionHooks::default()).await?;
//!
//!     // Multiple connects to the same path return the same instance
//!     let db2 = SqliteDatabase::connect("example.db", None, None, ConnectionHooks::default()).await?;
//!     assert!(Arc::ptr_eq(&db, &db2));
//!
//!     let mut writer = db.acquire_writer().await?;
//!     attach(&mut writer, "archive.db", "archive", None).await?;
//!     for attached in list_attached(&mut writer).await? {
//!         println!("{} -> {}", attached.name, attached.file);
//!     }
//!     drop(writer);
//!
//!     db.close().await?;
//!     Ok(())
//! }
//! ```
//!
mod attached;
mod cipher;
mod config;
mod database;
mod error;
mod files;
mod hooks;
mod registry;
mod write_guard;

// Re-export public types
pub use attached::{AttachedDatabase, attach, detach, is_valid_schema_name, list_attached};
pub use cipher::{CipherKey, cipher_version, has_codec, integrity_check};
pub use config::SqliteDatabaseConfig;
pub use database::SqliteDatabase;
pub use error::{Error, sqlite_code};
pub use files::delete_database_files;
pub use hooks::{Collation, ConnectionHooks, ConnectionInit};
pub use write_guard::{ReadGuard, WriteGuard};

// Re-export sqlx migrate types for convenience
pub use sqlx::migrate::Migrator;

/// A type alias for Results with our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
