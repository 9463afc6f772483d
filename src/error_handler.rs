//! Recovery policy for corrupted databases

use futures::future::BoxFuture;
use sqlx_sqlcipher_conn_mgr::{delete_database_files, has_codec};
use tracing::{debug, error, warn};

use crate::Error;
use crate::database::SqlCipherDatabase;

/// Receives the corruption reports of a database.
///
/// Invoked after an operation fails with `SQLITE_CORRUPT` or `SQLITE_NOTADB`,
/// once the handle's internal locks have been released, so the handler may
/// query or close the database. The failed operation still returns its error.
pub trait DatabaseErrorHandler: Send + Sync {
   fn on_corruption<'a>(&'a self, db: &'a SqlCipherDatabase, error: &'a Error) -> BoxFuture<'a, ()>;
}

/// Deletes the files of a corrupted database.
///
/// The main file and every attached database file are removed so that the
/// next open starts from an empty database. In-memory databases are skipped.
/// When the linked engine has a codec nothing is deleted: an encrypted file
/// opened with the wrong key looks corrupt, and the data may still be
/// recoverable with the right one.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDatabaseErrorHandler;

impl DefaultDatabaseErrorHandler {
   pub fn new() -> Self {
      Self
   }
}

impl DatabaseErrorHandler for DefaultDatabaseErrorHandler {
   fn on_corruption<'a>(&'a self, db: &'a SqlCipherDatabase, error: &'a Error) -> BoxFuture<'a, ()> {
      Box::pin(async move {
         error!("Corruption reported by sqlite on database: {}: {}", db.path(), error);

         if has_codec() {
            warn!("Linked engine has a codec, not deleting {}", db.path());
            return;
         }

         if !db.is_open() {
            delete_database_file(db.path());
            return;
         }

         let attached = match db.attached_dbs().await {
            Ok(attached) => attached,
            Err(e) => {
               debug!("Could not list attached databases of {}: {}", db.path(), e);
               None
            }
         };

         if let Err(e) = db.close().await {
            debug!("Closing corrupt database {} failed: {}", db.path(), e);
         }

         match attached {
            Some(attached) => {
               for (_, file) in attached {
                  delete_database_file(&file);
               }
            }
            None => delete_database_file(db.path()),
         }
      })
   }
}

fn delete_database_file(path: &str) {
   if path.trim().is_empty() || path.eq_ignore_ascii_case(":memory:") {
      return;
   }
   error!("deleting the database file: {}", path);
   delete_database_files(path);
}
